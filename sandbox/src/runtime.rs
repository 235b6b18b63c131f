//! Bridge runtime: Wasmtime engine, module loading, and instances.
//!
//! A [`Bridge`] holds a compiled, validated guest module. Each call to
//! [`Bridge::instantiate`] creates a fresh store whose `BridgeState` (and so
//! whose handle table) lives exactly as long as the returned
//! [`BridgeInstance`].

use std::path::Path;

use heapbridge_hostapi::HostValue;
use wasmtime::{AsContextMut, Config, Engine, Instance, Linker, Module, Store, WasmParams, WasmResults};

use crate::callback::call_function;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::exception::{HostException, HostResult};
use crate::guest::{GuestExports, WasmGuest};
use crate::imports::HostImports;
use crate::linker::{register_host_imports, register_intrinsics};
use crate::state::BridgeState;
use crate::strings;
use crate::validation::validate_module;

/// A compiled guest module ready to be instantiated.
pub struct Bridge {
    engine: Engine,
    module: Module,
    config: BridgeConfig,
}

impl Bridge {
    /// Compile and validate a guest from WASM bytecode (or WAT text).
    pub fn new(wasm_bytes: &[u8], config: BridgeConfig) -> Result<Self, BridgeError> {
        let engine = create_engine()?;
        let module = Module::new(&engine, wasm_bytes)?;
        validate_module(&module, &config)?;
        Ok(Self {
            engine,
            module,
            config,
        })
    }

    /// Load from a `.wasm` file path.
    pub fn from_file(path: &Path, config: BridgeConfig) -> Result<Self, BridgeError> {
        let engine = create_engine()?;
        let module = Module::from_file(&engine, path)?;
        validate_module(&module, &config)?;
        Ok(Self {
            engine,
            module,
            config,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Create a fresh instance with its own store, heap and limits.
    pub fn instantiate(&self, host_imports: &HostImports) -> Result<BridgeInstance, BridgeError> {
        let mut store = Store::new(&self.engine, BridgeState::new(&self.config));
        store.limiter(|state| &mut state.limits);
        store.set_fuel(self.config.fuel_limit)?;

        let mut linker = Linker::new(&self.engine);
        register_intrinsics(&mut linker)?;
        register_host_imports(&mut linker, &self.engine, &self.config.host_module, host_imports)?;

        let instance = linker.instantiate(&mut store, &self.module)?;
        let exports = GuestExports::resolve(&mut store, &instance, &self.config.exports)?;
        store.data_mut().exports = Some(exports);

        tracing::debug!(
            target: "heapbridge::runtime",
            host_imports = host_imports.len(),
            fuel = self.config.fuel_limit,
            "instantiated guest"
        );
        Ok(BridgeInstance {
            store,
            instance,
            config: self.config.clone(),
        })
    }
}

/// Create a Wasmtime engine: fuel metering on, threads off.
fn create_engine() -> Result<Engine, BridgeError> {
    let mut wasm_config = Config::new();
    wasm_config.consume_fuel(true);
    wasm_config.wasm_threads(false);
    wasm_config.wasm_multi_memory(false);
    Ok(Engine::new(&wasm_config)?)
}

/// A running guest with its bridge state.
pub struct BridgeInstance {
    store: Store<BridgeState>,
    instance: Instance,
    config: BridgeConfig,
}

impl BridgeInstance {
    /// Run the guest's start export, if it has one.
    pub fn start(&mut self) -> Result<(), BridgeError> {
        let name = self.config.exports.start.clone();
        match self.instance.get_func(&mut self.store, &name) {
            Some(func) => {
                let start = func.typed::<(), ()>(&self.store)?;
                start.call(&mut self.store, ()).map_err(BridgeError::from_trap)
            }
            None => Ok(()),
        }
    }

    /// Call an exported guest function.
    pub fn call<P, R>(&mut self, name: &str, params: P) -> Result<R, BridgeError>
    where
        P: WasmParams,
        R: WasmResults,
    {
        let func = self
            .instance
            .get_typed_func::<P, R>(&mut self.store, name)
            .map_err(|_| BridgeError::MissingExport(name.to_string()))?;
        func.call(&mut self.store, params).map_err(BridgeError::from_trap)
    }

    /// A guest view for driving bridge components directly.
    pub fn guest(&mut self) -> Result<WasmGuest<'_>, BridgeError> {
        WasmGuest::new(self.store.as_context_mut())
    }

    /// Copy text into guest memory; returns `(ptr, len)`.
    pub fn pass_string(&mut self, text: &str) -> Result<(u32, u32), BridgeError> {
        let mut guest = self.guest()?;
        strings::encode_with_len(&mut guest, text)
    }

    pub fn read_string(&mut self, ptr: u32, len: u32) -> Result<String, BridgeError> {
        let mut guest = self.guest()?;
        strings::decode(&mut guest, ptr, len)
    }

    /// Call a host function value (native or guest callback).
    pub fn invoke(&mut self, f: &HostValue, args: &[HostValue]) -> HostResult {
        let mut guest = self.guest()?;
        call_function(&mut guest, f, args)
    }

    /// Queue `f` to be called once by [`run_tasks`](Self::run_tasks).
    pub fn schedule(&mut self, f: HostValue) {
        self.store.data_mut().schedule(f);
    }

    /// Drain the task queue in FIFO order, including tasks scheduled while
    /// draining. A task that throws is logged and skipped; a fatal error
    /// stops the drain. Returns the number of tasks run.
    pub fn run_tasks(&mut self) -> Result<usize, BridgeError> {
        let mut ran = 0;
        while let Some(task) = self.store.data_mut().next_task() {
            ran += 1;
            match self.invoke(&task, &[]) {
                Ok(_) => {}
                Err(HostException::Thrown(value)) => {
                    let depth = self.store.data().debug_max_depth();
                    tracing::warn!(
                        target: "heapbridge::runtime",
                        exception = %value.debug_string(depth),
                        "scheduled task threw"
                    );
                }
                Err(HostException::Fatal(err)) => return Err(err),
            }
        }
        Ok(ran)
    }

    /// Fuel left in the store.
    pub fn fuel_remaining(&self) -> Result<u64, BridgeError> {
        Ok(self.store.get_fuel()?)
    }

    pub fn state(&self) -> &BridgeState {
        self.store.data()
    }

    pub fn state_mut(&mut self) -> &mut BridgeState {
        self.store.data_mut()
    }

    /// Tear down the instance, keeping its state.
    pub fn into_state(self) -> BridgeState {
        self.store.into_data()
    }
}
