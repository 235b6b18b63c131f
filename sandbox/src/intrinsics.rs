//! Bridge intrinsics: the fixed operations every guest may import from the
//! `"bridge"` module.
//!
//! Each intrinsic is a plain function over `&mut dyn Guest` taking and
//! returning raw ABI words; [`crate::linker`] wraps them for wasmtime. An
//! `Err` return traps the calling guest.

use heapbridge_hostapi::{
    CallbackRecord, Handle, HostError, HostFunction, HostValue, ReleaseOutcome,
};

use crate::callback::call_function;
use crate::error::BridgeError;
use crate::exception::{self, ExceptionSlot};
use crate::guest::Guest;
use crate::strings;

/// Names of every intrinsic, as imported by the guest.
pub const INTRINSIC_NAMES: &[&str] = &[
    "object_drop_ref",
    "object_clone_ref",
    "string_new",
    "string_get",
    "number_new",
    "number_get",
    "boolean_get",
    "is_null",
    "is_undefined",
    "debug_string",
    "error_new",
    "throw",
    "rethrow",
    "global_get",
    "closure_new",
    "cb_drop",
    "call0",
    "call1",
];

fn handle(raw: i32) -> Handle {
    Handle::from_abi(raw)
}

fn get(guest: &dyn Guest, raw: i32) -> Result<HostValue, BridgeError> {
    Ok(guest.state().heap.get(handle(raw))?)
}

fn write_word(guest: &mut dyn Guest, ptr: i32, value: u32) -> Result<(), BridgeError> {
    let words = guest.word_view();
    words.set(guest, ptr as u32, value)
}

// ── Handles ──

pub fn object_drop_ref(guest: &mut dyn Guest, h: i32) -> Result<(), BridgeError> {
    guest.state_mut().heap.release(handle(h))?;
    Ok(())
}

pub fn object_clone_ref(guest: &mut dyn Guest, h: i32) -> Result<i32, BridgeError> {
    Ok(guest.state_mut().heap.clone_ref(handle(h))?.to_abi())
}

// ── Text ──

pub fn string_new(guest: &mut dyn Guest, ptr: i32, len: i32) -> Result<i32, BridgeError> {
    let text = strings::decode(guest, ptr as u32, len as u32)?;
    Ok(guest.state_mut().heap.allocate(HostValue::from(text)).to_abi())
}

/// Copy a string value into guest memory; `(0, 0)` when `h` is not text.
pub fn string_get(guest: &mut dyn Guest, h: i32, len_ptr: i32) -> Result<i32, BridgeError> {
    let value = get(guest, h)?;
    let (ptr, len) = match value.as_str() {
        Some(text) => strings::encode_with_len(guest, text)?,
        None => (0, 0),
    };
    write_word(guest, len_ptr, len)?;
    Ok(ptr as i32)
}

/// Render any value with the debug formatter into guest memory.
pub fn debug_string(guest: &mut dyn Guest, h: i32, len_ptr: i32) -> Result<i32, BridgeError> {
    let value = get(guest, h)?;
    let text = value.debug_string(guest.state().debug_max_depth());
    let (ptr, len) = strings::encode_with_len(guest, &text)?;
    write_word(guest, len_ptr, len)?;
    Ok(ptr as i32)
}

// ── Numbers and booleans ──

pub fn number_new(guest: &mut dyn Guest, n: f64) -> Result<i32, BridgeError> {
    Ok(guest.state_mut().heap.allocate(HostValue::from(n)).to_abi())
}

/// The number behind `h`; writes 1 to `invalid_ptr` (and returns 0) when it
/// is not a number, 0 otherwise.
pub fn number_get(guest: &mut dyn Guest, h: i32, invalid_ptr: i32) -> Result<f64, BridgeError> {
    match get(guest, h)?.as_number() {
        Some(n) => {
            write_word(guest, invalid_ptr, 0)?;
            Ok(n)
        }
        None => {
            write_word(guest, invalid_ptr, 1)?;
            Ok(0.0)
        }
    }
}

/// 1 for true, 0 for false, 2 for anything that is not a boolean.
pub fn boolean_get(guest: &mut dyn Guest, h: i32) -> Result<i32, BridgeError> {
    Ok(match get(guest, h)?.as_bool() {
        Some(true) => 1,
        Some(false) => 0,
        None => 2,
    })
}

pub fn is_null(guest: &mut dyn Guest, h: i32) -> Result<i32, BridgeError> {
    Ok(matches!(get(guest, h)?, HostValue::Null) as i32)
}

pub fn is_undefined(guest: &mut dyn Guest, h: i32) -> Result<i32, BridgeError> {
    Ok(matches!(get(guest, h)?, HostValue::Undefined) as i32)
}

// ── Errors ──

pub fn error_new(guest: &mut dyn Guest, ptr: i32, len: i32) -> Result<i32, BridgeError> {
    let message = strings::decode(guest, ptr as u32, len as u32)?;
    let error = HostValue::error("Error", &message);
    Ok(guest.state_mut().heap.allocate(error).to_abi())
}

/// Throw a new `Error` with the given message. Always traps.
pub fn throw(guest: &mut dyn Guest, ptr: i32, len: i32) -> Result<(), BridgeError> {
    let message = strings::decode(guest, ptr as u32, len as u32)?;
    Err(exception::uncaught(guest, HostValue::error("Error", &message)))
}

/// Throw the value behind `h`, consuming the handle. Always traps.
pub fn rethrow(guest: &mut dyn Guest, h: i32) -> Result<(), BridgeError> {
    let value = guest.state_mut().heap.take(handle(h))?;
    Err(exception::uncaught(guest, value))
}

// ── Globals and callbacks ──

/// Look up a named host global; `undefined` when there is none.
pub fn global_get(guest: &mut dyn Guest, ptr: i32, len: i32) -> Result<i32, BridgeError> {
    let name = strings::decode(guest, ptr as u32, len as u32)?;
    let value = guest.state().global(&name).unwrap_or(HostValue::Undefined);
    Ok(guest.state_mut().heap.intern(value).to_abi())
}

/// Wrap a guest invoke/finalize pair as a host function and return its handle.
pub fn closure_new(
    guest: &mut dyn Guest,
    payload: i32,
    env: i32,
    invoke_slot: i32,
    finalize_slot: i32,
) -> Result<i32, BridgeError> {
    let record = CallbackRecord::new(
        invoke_slot as u32,
        finalize_slot as u32,
        payload as u32,
        env as u32,
    );
    let h = guest.state_mut().heap.allocate(HostValue::callback(record));
    tracing::trace!(target: "heapbridge::callback", handle = %h, invoke_slot, finalize_slot, "new callback");
    Ok(h.to_abi())
}

/// Drop the guest's reference to a callback, consuming its handle.
///
/// Returns 1 when this was the last reference and no invocation is running,
/// so the guest must free the closure state itself; 0 when a running
/// invocation will call the finalizer instead.
pub fn cb_drop(guest: &mut dyn Guest, h: i32) -> Result<i32, BridgeError> {
    let value = guest.state_mut().heap.take(handle(h))?;
    let outcome = match value.as_function().map(|f| f.as_ref()) {
        Some(HostFunction::Callback(record)) => record.release()?,
        _ => return Err(HostError::type_mismatch("callback", value.kind()).into()),
    };
    tracing::trace!(target: "heapbridge::callback", handle = h, ?outcome, "dropped callback");
    Ok((outcome == ReleaseOutcome::Dropped) as i32)
}

/// Call `f()`; a throw lands in the exception slot at `exn_ptr`.
pub fn call0(guest: &mut dyn Guest, f: i32, exn_ptr: i32) -> Result<i32, BridgeError> {
    let func = get(guest, f)?;
    exception::catch(guest, ExceptionSlot::new(exn_ptr as u32), 0, |g| {
        let out = call_function(g, &func, &[])?;
        Ok(g.state_mut().heap.intern(out).to_abi())
    })
}

/// Call `f(arg)`; a throw lands in the exception slot at `exn_ptr`.
pub fn call1(guest: &mut dyn Guest, f: i32, arg: i32, exn_ptr: i32) -> Result<i32, BridgeError> {
    let func = get(guest, f)?;
    let arg = get(guest, arg)?;
    exception::catch(guest, ExceptionSlot::new(exn_ptr as u32), 0, |g| {
        let out = call_function(g, &func, &[arg])?;
        Ok(g.state_mut().heap.intern(out).to_abi())
    })
}
