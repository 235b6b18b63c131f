//! Calling host functions and guest callbacks from the host side.
//!
//! A guest callback is a [`CallbackRecord`] naming two function-table
//! slots. Invoking it passes `(payload, env, args...)` to the invoke slot,
//! with each argument interned as a handle the guest then owns, and takes
//! the returned handle (if any) as the result. A failed body leaves its
//! argument handles to the host, which releases any still live. When the
//! invocation was the last reference, the finalize slot runs with `(payload, env)` after the
//! body has returned, whether or not the body failed.

use heapbridge_hostapi::{CallbackRecord, Completion, Handle, HostFunction, HostValue};

use crate::exception::{self, HostException, HostResult};
use crate::guest::Guest;

/// Call any host function value with `args`.
///
/// A value that is not a function throws a `TypeError`.
pub fn call_function(guest: &mut dyn Guest, f: &HostValue, args: &[HostValue]) -> HostResult {
    let func = match f {
        HostValue::Function(func) => func.clone(),
        other => {
            let shown = other.debug_string(guest.state().debug_max_depth());
            return Err(HostException::type_error(&format!("{} is not a function", shown)));
        }
    };
    match func.as_ref() {
        HostFunction::Native { f, .. } => f(args).map_err(HostException::Thrown),
        HostFunction::Callback(record) => invoke_callback(guest, record, args),
    }
}

/// Run one invocation of a guest callback.
pub fn invoke_callback(
    guest: &mut dyn Guest,
    record: &CallbackRecord,
    args: &[HostValue],
) -> HostResult {
    let invocation = record.enter()?;

    let interned: Vec<Handle> = args
        .iter()
        .map(|arg| guest.state_mut().heap.intern(arg.clone()))
        .collect();
    let mut words = Vec::with_capacity(args.len() + 2);
    words.push(invocation.payload() as i32);
    words.push(invocation.env() as i32);
    words.extend(interned.iter().map(|h| h.to_abi()));
    let outcome = guest.call_table(invocation.invoke_slot(), &words);

    let finalized = match invocation.finish() {
        Completion::Finalize { payload, env, slot } => {
            tracing::debug!(target: "heapbridge::callback", payload, slot, "finalizing callback");
            guest
                .call_table(slot, &[payload as i32, env as i32])
                .map(drop)
        }
        Completion::Restored => Ok(()),
    };

    let returned = match (outcome, finalized) {
        (Ok(returned), Ok(())) => returned,
        (Err(err), finalized) => {
            if let Err(fin) = finalized {
                tracing::warn!(target: "heapbridge::callback", error = %fin, "finalizer failed after callback failure");
            }
            // The thrown value comes out first: it may sit in a slot an
            // argument vacated.
            let exception = exception::recover(guest, err);
            release_arguments(guest, &interned);
            return Err(exception);
        }
        (Ok(_), Err(fin)) => return Err(exception::recover(guest, fin)),
    };

    match returned {
        Some(raw) => Ok(guest.state_mut().heap.take(Handle::from_abi(raw))?),
        None => Ok(HostValue::Undefined),
    }
}

fn release_arguments(guest: &mut dyn Guest, handles: &[Handle]) {
    let heap = &mut guest.state_mut().heap;
    for &handle in handles.iter().filter(|h| !h.is_reserved()) {
        if heap.is_live(handle) {
            let _ = heap.release(handle);
        }
    }
}
