//! Host function registration via Wasmtime linker.
//!
//! Intrinsics are registered under [`INTRINSICS_MODULE`] with `func_wrap`;
//! each one builds a [`WasmGuest`] over the caller and forwards to
//! [`crate::intrinsics`]. User host operations are registered under the
//! configured host module with `func_new`, using the type derived from their
//! [`Signature`](crate::Signature).
//!
//! Errors returned here become traps in the calling guest; the original
//! `BridgeError` is recovered from the trap by `BridgeError::from_trap`.

use wasmtime::{AsContextMut, Caller, Engine, Linker};

use crate::error::BridgeError;
use crate::guest::{Guest, WasmGuest};
use crate::imports::{self, HostImports};
use crate::intrinsics;
use crate::state::BridgeState;

/// Import module name for the bridge intrinsics.
pub const INTRINSICS_MODULE: &str = "bridge";

/// Run `f` over a guest view of the caller.
fn with_guest<R>(
    caller: &mut Caller<'_, BridgeState>,
    f: impl FnOnce(&mut dyn Guest) -> Result<R, BridgeError>,
) -> anyhow::Result<R> {
    let mut guest = WasmGuest::new(caller.as_context_mut())?;
    Ok(f(&mut guest)?)
}

/// Register every intrinsic with the linker.
pub fn register_intrinsics(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    register_handles(linker)?;
    register_text(linker)?;
    register_numbers(linker)?;
    register_errors(linker)?;
    register_callbacks(linker)?;
    Ok(())
}

// ── Handles ──

fn register_handles(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    linker.func_wrap(
        INTRINSICS_MODULE,
        "object_drop_ref",
        |mut caller: Caller<'_, BridgeState>, h: i32| -> anyhow::Result<()> {
            with_guest(&mut caller, |g| intrinsics::object_drop_ref(g, h))
        },
    )?;
    linker.func_wrap(
        INTRINSICS_MODULE,
        "object_clone_ref",
        |mut caller: Caller<'_, BridgeState>, h: i32| -> anyhow::Result<i32> {
            with_guest(&mut caller, |g| intrinsics::object_clone_ref(g, h))
        },
    )?;
    linker.func_wrap(
        INTRINSICS_MODULE,
        "global_get",
        |mut caller: Caller<'_, BridgeState>, ptr: i32, len: i32| -> anyhow::Result<i32> {
            with_guest(&mut caller, |g| intrinsics::global_get(g, ptr, len))
        },
    )?;
    Ok(())
}

// ── Text ──

fn register_text(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    linker.func_wrap(
        INTRINSICS_MODULE,
        "string_new",
        |mut caller: Caller<'_, BridgeState>, ptr: i32, len: i32| -> anyhow::Result<i32> {
            with_guest(&mut caller, |g| intrinsics::string_new(g, ptr, len))
        },
    )?;
    linker.func_wrap(
        INTRINSICS_MODULE,
        "string_get",
        |mut caller: Caller<'_, BridgeState>, h: i32, len_ptr: i32| -> anyhow::Result<i32> {
            with_guest(&mut caller, |g| intrinsics::string_get(g, h, len_ptr))
        },
    )?;
    linker.func_wrap(
        INTRINSICS_MODULE,
        "debug_string",
        |mut caller: Caller<'_, BridgeState>, h: i32, len_ptr: i32| -> anyhow::Result<i32> {
            with_guest(&mut caller, |g| intrinsics::debug_string(g, h, len_ptr))
        },
    )?;
    Ok(())
}

// ── Numbers and booleans ──

fn register_numbers(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    linker.func_wrap(
        INTRINSICS_MODULE,
        "number_new",
        |mut caller: Caller<'_, BridgeState>, n: f64| -> anyhow::Result<i32> {
            with_guest(&mut caller, |g| intrinsics::number_new(g, n))
        },
    )?;
    linker.func_wrap(
        INTRINSICS_MODULE,
        "number_get",
        |mut caller: Caller<'_, BridgeState>, h: i32, invalid_ptr: i32| -> anyhow::Result<f64> {
            with_guest(&mut caller, |g| intrinsics::number_get(g, h, invalid_ptr))
        },
    )?;
    linker.func_wrap(
        INTRINSICS_MODULE,
        "boolean_get",
        |mut caller: Caller<'_, BridgeState>, h: i32| -> anyhow::Result<i32> {
            with_guest(&mut caller, |g| intrinsics::boolean_get(g, h))
        },
    )?;
    linker.func_wrap(
        INTRINSICS_MODULE,
        "is_null",
        |mut caller: Caller<'_, BridgeState>, h: i32| -> anyhow::Result<i32> {
            with_guest(&mut caller, |g| intrinsics::is_null(g, h))
        },
    )?;
    linker.func_wrap(
        INTRINSICS_MODULE,
        "is_undefined",
        |mut caller: Caller<'_, BridgeState>, h: i32| -> anyhow::Result<i32> {
            with_guest(&mut caller, |g| intrinsics::is_undefined(g, h))
        },
    )?;
    Ok(())
}

// ── Errors ──

fn register_errors(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    linker.func_wrap(
        INTRINSICS_MODULE,
        "error_new",
        |mut caller: Caller<'_, BridgeState>, ptr: i32, len: i32| -> anyhow::Result<i32> {
            with_guest(&mut caller, |g| intrinsics::error_new(g, ptr, len))
        },
    )?;
    linker.func_wrap(
        INTRINSICS_MODULE,
        "throw",
        |mut caller: Caller<'_, BridgeState>, ptr: i32, len: i32| -> anyhow::Result<()> {
            with_guest(&mut caller, |g| intrinsics::throw(g, ptr, len))
        },
    )?;
    linker.func_wrap(
        INTRINSICS_MODULE,
        "rethrow",
        |mut caller: Caller<'_, BridgeState>, h: i32| -> anyhow::Result<()> {
            with_guest(&mut caller, |g| intrinsics::rethrow(g, h))
        },
    )?;
    Ok(())
}

// ── Callbacks ──

fn register_callbacks(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    linker.func_wrap(
        INTRINSICS_MODULE,
        "closure_new",
        |mut caller: Caller<'_, BridgeState>,
         payload: i32,
         env: i32,
         invoke_slot: i32,
         finalize_slot: i32|
         -> anyhow::Result<i32> {
            with_guest(&mut caller, |g| {
                intrinsics::closure_new(g, payload, env, invoke_slot, finalize_slot)
            })
        },
    )?;
    linker.func_wrap(
        INTRINSICS_MODULE,
        "cb_drop",
        |mut caller: Caller<'_, BridgeState>, h: i32| -> anyhow::Result<i32> {
            with_guest(&mut caller, |g| intrinsics::cb_drop(g, h))
        },
    )?;
    linker.func_wrap(
        INTRINSICS_MODULE,
        "call0",
        |mut caller: Caller<'_, BridgeState>, f: i32, exn_ptr: i32| -> anyhow::Result<i32> {
            with_guest(&mut caller, |g| intrinsics::call0(g, f, exn_ptr))
        },
    )?;
    linker.func_wrap(
        INTRINSICS_MODULE,
        "call1",
        |mut caller: Caller<'_, BridgeState>, f: i32, arg: i32, exn_ptr: i32| -> anyhow::Result<i32> {
            with_guest(&mut caller, |g| intrinsics::call1(g, f, arg, exn_ptr))
        },
    )?;
    Ok(())
}

// ── Host imports ──

/// Register every user host operation under `module`.
pub fn register_host_imports(
    linker: &mut Linker<BridgeState>,
    engine: &Engine,
    module: &str,
    host_imports: &HostImports,
) -> Result<(), BridgeError> {
    for import in host_imports.iter() {
        let ty = import.signature().func_type(engine);
        let import = import.clone();
        let name = import.name().to_string();
        linker.func_new(module, &name, ty, move |mut caller, params, results| {
            let mut guest = WasmGuest::new(caller.as_context_mut())?;
            imports::call_import(&mut guest, &import, params, results)?;
            Ok(())
        })?;
        tracing::trace!(target: "heapbridge::runtime", module, name = %name, "linked host import");
    }
    Ok(())
}
