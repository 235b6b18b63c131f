//! Bridge error types.

use heapbridge_hostapi::HostError;
use wasmtime::Trap;

/// Top-level error type for the sandbox crate.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Wasmtime engine, compilation, or instantiation error.
    #[error("wasmtime error: {0}")]
    Wasmtime(#[from] anyhow::Error),

    /// Module validation failed (missing exports, bad imports, etc.).
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Misuse of the host object model (invalid handle, wrong kind, ...).
    #[error("host error: {0}")]
    Host(#[from] HostError),

    /// Memory operation failed (grow failure, missing memory).
    #[error("memory error: {0}")]
    MemoryError(String),

    /// The range `[ptr, ptr+len)` lies outside guest memory.
    #[error("out of bounds access at {ptr} (len {len})")]
    OutOfBounds { ptr: u32, len: u32 },

    /// A word access at an address that is not 4-byte aligned.
    #[error("misaligned word access at {0}")]
    Misaligned(u32),

    /// A memory view was used after the guest buffer was replaced.
    #[error("stale memory view: guest buffer was replaced")]
    StaleView,

    /// A required guest export is missing at runtime.
    #[error("missing export: {0}")]
    MissingExport(String),

    /// A function table index with no function in it.
    #[error("empty function table slot {0}")]
    EmptyTableSlot(u32),

    /// Fuel exhausted during execution.
    #[error("fuel exhausted (instruction limit)")]
    FuelExhausted,

    /// WASM guest trapped.
    #[error("guest trapped: {0}")]
    GuestTrapped(String),

    /// A host exception escaped to the guest with no exception slot to catch it.
    #[error("uncaught host exception: {message}")]
    Thrown { handle: u32, message: String },
}

impl BridgeError {
    /// Classify an error leaving a guest call.
    ///
    /// Fuel exhaustion → `FuelExhausted`; a `BridgeError` raised by a host
    /// function is recovered as is; any other trap → `GuestTrapped`.
    pub fn from_trap(err: anyhow::Error) -> Self {
        if matches!(err.downcast_ref::<Trap>(), Some(Trap::OutOfFuel)) {
            return Self::FuelExhausted;
        }
        match err.downcast::<BridgeError>() {
            Ok(bridge) => bridge,
            Err(other) => Self::GuestTrapped(format!("{:#}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_trap_recovers_bridge_error() {
        let err = anyhow::Error::new(BridgeError::Thrown {
            handle: 9,
            message: "\"boom\"".into(),
        });
        match BridgeError::from_trap(err) {
            BridgeError::Thrown { handle, .. } => assert_eq!(handle, 9),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_from_trap_fuel() {
        let err = anyhow::Error::new(Trap::OutOfFuel);
        assert!(matches!(BridgeError::from_trap(err), BridgeError::FuelExhausted));
    }

    #[test]
    fn test_from_trap_other() {
        let err = anyhow::anyhow!("unreachable executed");
        assert!(matches!(BridgeError::from_trap(err), BridgeError::GuestTrapped(_)));
    }
}
