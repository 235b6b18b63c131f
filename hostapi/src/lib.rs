//! `heapbridge-hostapi`: the host object model behind the heapbridge sandbox.
//!
//! This crate has no dependency on the wasm runtime. It provides:
//!
//! - `HostValue`: tagged host values (primitives plus shared references)
//! - `Handle` / `HandleTable`: integer handles with a LIFO free list
//! - `CallbackRecord`: the refcounted state behind guest callbacks
//! - `debug_string`: depth-limited diagnostic rendering
//! - `HostError`: misuse of the object model

pub mod callback;
pub mod debug;
pub mod error;
pub mod handle;
pub mod table;
pub mod value;

// Re-export commonly used types at the crate root.
pub use callback::{CallbackRecord, Completion, Invocation, ReleaseOutcome};
pub use debug::{debug_string, DEFAULT_MAX_DEPTH};
pub use error::HostError;
pub use handle::Handle;
pub use table::HandleTable;
pub use value::{ErrorValue, HostFunction, HostObject, HostValue, NativeFn, SymbolValue, ValueKind};
