//! Host exceptions across the call boundary.
//!
//! A fallible bridged call receives the address of a two-word exception
//! slot. When the host operation throws, the thrown value is stored as a new
//! handle, `{flag = 1, handle}` is written to the slot, and the call returns
//! a default. On success the slot is not touched.
//!
//! A throw with no slot to land in becomes a `BridgeError::Thrown` trap. The
//! thrown value stays in the handle table, so a host frame further out can
//! turn the trap back into an exception with [`recover`].

use heapbridge_hostapi::{Handle, HostError, HostValue};

use crate::error::BridgeError;
use crate::guest::Guest;

/// Failure of a host operation.
#[derive(Debug)]
pub enum HostException {
    /// A host-side exception; capturable by the exception slot convention.
    Thrown(HostValue),
    /// A defect in bridge usage; never captured, always traps.
    Fatal(BridgeError),
}

impl HostException {
    /// A thrown `TypeError` with `message`.
    pub fn type_error(message: &str) -> Self {
        Self::Thrown(HostValue::error("TypeError", message))
    }
}

impl From<BridgeError> for HostException {
    fn from(err: BridgeError) -> Self {
        Self::Fatal(err)
    }
}

impl From<HostError> for HostException {
    fn from(err: HostError) -> Self {
        Self::Fatal(BridgeError::Host(err))
    }
}

/// Result of a host operation.
pub type HostResult<T = HostValue> = Result<T, HostException>;

/// Two-word `{flag, handle}` output location in guest memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionSlot {
    ptr: u32,
}

impl ExceptionSlot {
    pub fn new(ptr: u32) -> Self {
        Self { ptr }
    }

    pub fn ptr(&self) -> u32 {
        self.ptr
    }

    /// Write `flag = 1` and `handle`.
    pub fn write(&self, guest: &mut dyn Guest, handle: Handle) -> Result<(), BridgeError> {
        let words = guest.word_view();
        words.set(guest, self.ptr, 1)?;
        words.set(guest, self.ptr + 4, handle.as_raw())
    }

    /// Read back `(flag, handle)`.
    pub fn read(&self, guest: &mut dyn Guest) -> Result<(u32, Handle), BridgeError> {
        let words = guest.word_view();
        let flag = words.get(&*guest, self.ptr)?;
        let handle = words.get(&*guest, self.ptr + 4)?;
        Ok((flag, Handle::from_raw(handle)))
    }
}

/// Run `op`, capturing a thrown exception into `slot` and returning `default`.
///
/// `Fatal` errors propagate unchanged.
pub fn catch<T>(
    guest: &mut dyn Guest,
    slot: ExceptionSlot,
    default: T,
    op: impl FnOnce(&mut dyn Guest) -> HostResult<T>,
) -> Result<T, BridgeError> {
    match op(guest) {
        Ok(value) => Ok(value),
        Err(HostException::Thrown(value)) => {
            let handle = guest.state_mut().heap.allocate(value);
            tracing::debug!(target: "heapbridge::exception", %handle, slot = slot.ptr, "captured host exception");
            slot.write(guest, handle)?;
            Ok(default)
        }
        Err(HostException::Fatal(err)) => Err(err),
    }
}

/// Turn a thrown value with nowhere to land into a trap.
pub fn uncaught(guest: &mut dyn Guest, value: HostValue) -> BridgeError {
    let message = value.debug_string(guest.state().debug_max_depth());
    let handle = guest.state_mut().heap.allocate(value);
    tracing::debug!(target: "heapbridge::exception", %handle, %message, "uncaught host exception");
    BridgeError::Thrown {
        handle: handle.as_raw(),
        message,
    }
}

/// Turn a trap raised by [`uncaught`] back into the exception it carried.
pub fn recover(guest: &mut dyn Guest, err: BridgeError) -> HostException {
    match err {
        BridgeError::Thrown { handle, message } => {
            match guest.state_mut().heap.take(Handle::from_raw(handle)) {
                Ok(value) => HostException::Thrown(value),
                Err(_) => HostException::Fatal(BridgeError::Thrown { handle, message }),
            }
        }
        other => HostException::Fatal(other),
    }
}
