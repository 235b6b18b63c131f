//! Reference-counted guest callback records.
//!
//! A record pairs two guest function-table slots (invoke and finalize) with
//! the guest words they operate on. The host holds it behind a
//! [`HostValue::Function`](crate::HostValue); the guest holds it through a
//! handle and drops it with `release`.
//!
//! The count starts at 1 for the guest's reference. Each invocation adds one
//! for its duration and takes the payload out of the record, so a nested
//! invocation of the same record observes payload 0. When the count drops
//! to zero at the end of an invocation the finalizer is due; when it drops
//! to zero in `release` there is no invocation in flight and the guest frees
//! its own state. Exactly one of the two ever happens.

use std::cell::Cell;

use crate::error::HostError;

/// State shared between the host closure and the guest's reference.
#[derive(Debug)]
pub struct CallbackRecord {
    invoke_slot: u32,
    finalize_slot: u32,
    payload: Cell<u32>,
    env: u32,
    refcount: Cell<u32>,
}

impl CallbackRecord {
    pub fn new(invoke_slot: u32, finalize_slot: u32, payload: u32, env: u32) -> Self {
        Self {
            invoke_slot,
            finalize_slot,
            payload: Cell::new(payload),
            env,
            refcount: Cell::new(1),
        }
    }

    /// Begin an invocation.
    ///
    /// Fails with [`HostError::CallbackReleased`] once the count has reached
    /// zero.
    pub fn enter(&self) -> Result<Invocation<'_>, HostError> {
        let count = self.refcount.get();
        if count == 0 {
            return Err(HostError::CallbackReleased);
        }
        self.refcount.set(count + 1);
        let payload = self.payload.replace(0);
        tracing::trace!(target: "heapbridge::callback", depth = count, payload, "enter callback");
        Ok(Invocation {
            record: self,
            payload,
            done: false,
        })
    }

    /// Drop the guest's reference.
    pub fn release(&self) -> Result<ReleaseOutcome, HostError> {
        let count = self.refcount.get();
        if count == 0 {
            return Err(HostError::CallbackReleased);
        }
        self.refcount.set(count - 1);
        if count == 1 {
            self.payload.set(0);
            Ok(ReleaseOutcome::Dropped)
        } else {
            Ok(ReleaseOutcome::Deferred)
        }
    }

    pub fn invoke_slot(&self) -> u32 {
        self.invoke_slot
    }

    pub fn finalize_slot(&self) -> u32 {
        self.finalize_slot
    }

    pub fn env(&self) -> u32 {
        self.env
    }

    /// Current payload word; 0 while an invocation holds it.
    pub fn payload(&self) -> u32 {
        self.payload.get()
    }

    pub fn refcount(&self) -> u32 {
        self.refcount.get()
    }

    pub fn is_released(&self) -> bool {
        self.refcount.get() == 0
    }

    fn complete(&self, payload: u32) -> Completion {
        let count = self.refcount.get() - 1;
        self.refcount.set(count);
        if count == 0 {
            Completion::Finalize {
                payload,
                env: self.env,
                slot: self.finalize_slot,
            }
        } else {
            self.payload.set(payload);
            Completion::Restored
        }
    }
}

/// Result of [`CallbackRecord::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The count reached zero with no invocation in flight.
    Dropped,
    /// An invocation is running and will call the finalizer when it ends.
    Deferred,
}

/// What the caller must do once an invocation's body has returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The last reference is gone: call the finalize slot with these words.
    Finalize { payload: u32, env: u32, slot: u32 },
    /// The payload was put back for the next invocation.
    Restored,
}

/// An in-flight invocation of a [`CallbackRecord`].
///
/// Finishing the guard restores the payload or reports that the finalizer
/// is due. Dropping it unfinished performs the same bookkeeping.
#[must_use = "an invocation must be finished to run the finalizer"]
#[derive(Debug)]
pub struct Invocation<'a> {
    record: &'a CallbackRecord,
    payload: u32,
    done: bool,
}

impl Invocation<'_> {
    /// The payload taken from the record for this invocation.
    pub fn payload(&self) -> u32 {
        self.payload
    }

    pub fn env(&self) -> u32 {
        self.record.env
    }

    pub fn invoke_slot(&self) -> u32 {
        self.record.invoke_slot
    }

    pub fn finish(mut self) -> Completion {
        self.done = true;
        self.record.complete(self.payload)
    }
}

impl Drop for Invocation<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Completion::Finalize { payload, slot, .. } = self.record.complete(self.payload) {
            tracing::warn!(
                target: "heapbridge::callback",
                payload,
                slot,
                "invocation abandoned; finalizer not called"
            );
        }
    }
}
