//! Host-side error types for heapbridge.
//!
//! `HostError` covers misuse of the host object model: dereferencing a handle
//! that is not live, asking a value for a kind it does not have, or touching a
//! callback record after its last reference is gone. These are defects in the
//! caller's usage, not host exceptions; host exceptions travel as values.

use crate::value::ValueKind;

/// Errors raised by the handle table and the host value model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// The handle is out of range, was never allocated, or was already released.
    #[error("invalid handle {0}")]
    InvalidHandle(u32),

    /// A value of one kind was used where another kind was required.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: ValueKind,
    },

    /// The value is not callable.
    #[error("{0} is not a function")]
    NotCallable(ValueKind),

    /// The callback's reference count already reached zero.
    #[error("callback invoked or released after its last reference was dropped")]
    CallbackReleased,
}

impl HostError {
    /// Create a type-mismatch error for `found` where `expected` was required.
    pub fn type_mismatch(expected: &'static str, found: ValueKind) -> Self {
        Self::TypeMismatch { expected, found }
    }
}
