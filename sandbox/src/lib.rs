//! `heapbridge-sandbox`: Wasmtime-based bridge between a linear-memory
//! guest and a heap of host objects.
//!
//! The guest never sees host objects directly. It holds 32-bit handles into a
//! per-instance [`HandleTable`](heapbridge_hostapi::HandleTable) and exchanges
//! text, numbers and callbacks through a fixed set of imported intrinsics.
//! The bridge enforces:
//!
//! - **ABI validation:** memory, allocator and table exports checked before
//!   instantiation
//! - **Import whitelisting:** only `"bridge"` intrinsics and the configured
//!   host module, no WASI
//! - **Fuel metering:** instruction-level metering against runaway guests
//! - **Memory limits:** bounded linear memory growth
//! - **Exception capture:** host errors either land in a guest-provided slot
//!   or surface as [`BridgeError::Thrown`]
//!
//! The primary entry points are [`Bridge::instantiate`] and the
//! [`BridgeInstance`] it returns.

pub mod error;
pub mod config;
pub mod memory;
pub mod state;
pub mod guest;
pub mod mem_guest;
pub mod strings;
pub mod exception;
pub mod callback;
pub mod intrinsics;
pub mod imports;
pub mod validation;
pub mod linker;
pub mod runtime;

pub use callback::call_function;
pub use config::{BridgeConfig, ExportNames};
pub use error::BridgeError;
pub use exception::{ExceptionSlot, HostException, HostResult};
pub use guest::{Guest, WasmGuest};
pub use imports::{HostImports, Param, Ret, Signature};
pub use mem_guest::MemGuest;
pub use runtime::{Bridge, BridgeInstance};
pub use state::BridgeState;
