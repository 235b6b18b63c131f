//! The guest seam: everything the bridge needs from a running guest.
//!
//! Bridge components are written against `&mut dyn Guest` so the same code
//! runs inside a wasmtime host function (over a `Caller`), from the embedder
//! (over a `Store`), and in unit tests over [`MemGuest`](crate::MemGuest).

use wasmtime::{AsContextMut, Instance, Memory, StoreContextMut, Table, TypedFunc, Val};

use crate::config::ExportNames;
use crate::error::BridgeError;
use crate::memory::{BufferId, ByteView, WordView};
use crate::state::BridgeState;

/// A running guest: its linear memory, its allocator and its function table.
pub trait Guest {
    fn state(&self) -> &BridgeState;
    fn state_mut(&mut self) -> &mut BridgeState;

    /// Identity of the current backing buffer.
    fn buffer_id(&self) -> BufferId;
    fn memory(&self) -> &[u8];
    fn memory_mut(&mut self) -> &mut [u8];

    /// Allocate `size` bytes. May grow (and so replace) the buffer.
    fn malloc(&mut self, size: u32) -> Result<u32, BridgeError>;
    /// Resize an allocation. May grow (and so replace) the buffer.
    fn realloc(&mut self, ptr: u32, old_size: u32, new_size: u32) -> Result<u32, BridgeError>;
    fn free(&mut self, ptr: u32, size: u32) -> Result<(), BridgeError>;

    /// Call the function in table slot `slot` with i32 arguments.
    fn call_table(&mut self, slot: u32, args: &[i32]) -> Result<Option<i32>, BridgeError>;

    /// Byte view over the current buffer, from the cache when still valid.
    fn byte_view(&mut self) -> ByteView {
        let id = self.buffer_id();
        self.state_mut().views.byte_view(id)
    }

    /// Word view over the current buffer, from the cache when still valid.
    fn word_view(&mut self) -> WordView {
        let id = self.buffer_id();
        self.state_mut().views.word_view(id)
    }
}

/// Guest exports resolved once at instantiation.
#[derive(Clone)]
pub struct GuestExports {
    pub memory: Memory,
    pub malloc: TypedFunc<i32, i32>,
    pub realloc: TypedFunc<(i32, i32, i32), i32>,
    pub free: Option<TypedFunc<(i32, i32), ()>>,
    pub table: Option<Table>,
}

impl GuestExports {
    pub fn resolve(
        mut store: impl AsContextMut,
        instance: &Instance,
        names: &ExportNames,
    ) -> Result<Self, BridgeError> {
        let memory = instance
            .get_memory(&mut store, &names.memory)
            .ok_or_else(|| BridgeError::MissingExport(names.memory.clone()))?;
        let malloc = instance
            .get_typed_func::<i32, i32>(&mut store, &names.malloc)
            .map_err(|_| BridgeError::MissingExport(names.malloc.clone()))?;
        let realloc = instance
            .get_typed_func::<(i32, i32, i32), i32>(&mut store, &names.realloc)
            .map_err(|_| BridgeError::MissingExport(names.realloc.clone()))?;
        let free = instance
            .get_typed_func::<(i32, i32), ()>(&mut store, &names.free)
            .ok();
        let table = instance.get_table(&mut store, &names.table);
        Ok(Self {
            memory,
            malloc,
            realloc,
            free,
            table,
        })
    }
}

/// A wasmtime-backed guest over a store context.
///
/// Build one from `store.as_context_mut()` or `caller.as_context_mut()`.
pub struct WasmGuest<'a> {
    ctx: StoreContextMut<'a, BridgeState>,
    exports: GuestExports,
}

impl<'a> WasmGuest<'a> {
    pub fn new(ctx: StoreContextMut<'a, BridgeState>) -> Result<Self, BridgeError> {
        let exports = ctx
            .data()
            .exports
            .clone()
            .ok_or_else(|| BridgeError::MissingExport("guest exports not resolved".into()))?;
        Ok(Self { ctx, exports })
    }
}

impl Guest for WasmGuest<'_> {
    fn state(&self) -> &BridgeState {
        self.ctx.data()
    }

    fn state_mut(&mut self) -> &mut BridgeState {
        self.ctx.data_mut()
    }

    fn buffer_id(&self) -> BufferId {
        let memory = &self.exports.memory;
        BufferId::new(
            memory.data_ptr(&self.ctx) as usize,
            memory.data_size(&self.ctx),
        )
    }

    fn memory(&self) -> &[u8] {
        self.exports.memory.data(&self.ctx)
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        self.exports.memory.data_mut(&mut self.ctx)
    }

    fn malloc(&mut self, size: u32) -> Result<u32, BridgeError> {
        let ptr = self
            .exports
            .malloc
            .call(&mut self.ctx, size as i32)
            .map_err(BridgeError::from_trap)?;
        Ok(ptr as u32)
    }

    fn realloc(&mut self, ptr: u32, old_size: u32, new_size: u32) -> Result<u32, BridgeError> {
        let ptr = self
            .exports
            .realloc
            .call(&mut self.ctx, (ptr as i32, old_size as i32, new_size as i32))
            .map_err(BridgeError::from_trap)?;
        Ok(ptr as u32)
    }

    fn free(&mut self, ptr: u32, size: u32) -> Result<(), BridgeError> {
        match &self.exports.free {
            Some(free) => free
                .call(&mut self.ctx, (ptr as i32, size as i32))
                .map_err(BridgeError::from_trap),
            None => Ok(()),
        }
    }

    fn call_table(&mut self, slot: u32, args: &[i32]) -> Result<Option<i32>, BridgeError> {
        let table = self
            .exports
            .table
            .ok_or_else(|| BridgeError::MissingExport("function table".into()))?;
        let func = table
            .get(&mut self.ctx, u64::from(slot))
            .and_then(|r| r.as_func().flatten().cloned())
            .ok_or(BridgeError::EmptyTableSlot(slot))?;

        let params: Vec<Val> = args.iter().map(|&a| Val::I32(a)).collect();
        let result_count = func.ty(&self.ctx).results().len();
        let mut results = vec![Val::I32(0); result_count];
        func.call(&mut self.ctx, &params, &mut results)
            .map_err(BridgeError::from_trap)?;
        Ok(results.first().and_then(Val::i32))
    }
}
