//! In-memory `Guest` for testing.
//!
//! A `Vec<u8>` stands in for linear memory and Rust closures for the
//! function table. Growth always moves the buffer to a fresh allocation and
//! bumps a generation counter, which serves as the base of its
//! [`BufferId`], so stale views are caught even when the length repeats.

use std::rc::Rc;

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::guest::Guest;
use crate::memory::BufferId;
use crate::state::BridgeState;

/// A function table entry.
pub type TableFn = Rc<dyn Fn(&mut MemGuest, &[i32]) -> Result<Option<i32>, BridgeError>>;

/// First address handed out by the bump allocator; keeps 0 free as a null.
const HEAP_START: u32 = 8;

/// Vec-backed guest with a bump allocator.
pub struct MemGuest {
    state: BridgeState,
    memory: Vec<u8>,
    generation: usize,
    bump: u32,
    grows: usize,
    table: Vec<TableFn>,
    freed: Vec<(u32, u32)>,
}

impl MemGuest {
    /// A guest with one wasm page of memory.
    pub fn new() -> Self {
        Self::with_size(crate::memory::WASM_PAGE_SIZE)
    }

    /// A guest with `size` bytes of memory and default configuration.
    pub fn with_size(size: usize) -> Self {
        Self::with_config(size, &BridgeConfig::default())
    }

    pub fn with_config(size: usize, config: &BridgeConfig) -> Self {
        Self {
            state: BridgeState::new(config),
            memory: vec![0; size],
            generation: 0,
            bump: HEAP_START,
            grows: 0,
            table: Vec::new(),
            freed: Vec::new(),
        }
    }

    /// Replace the buffer with one `additional` bytes larger.
    pub fn grow(&mut self, additional: usize) {
        let mut fresh = vec![0; self.memory.len() + additional];
        fresh[..self.memory.len()].copy_from_slice(&self.memory);
        self.memory = fresh;
        self.generation += 1;
        self.grows += 1;
        tracing::trace!(target: "heapbridge::memory", len = self.memory.len(), "grew in-memory guest");
    }

    /// Number of times the buffer has been replaced.
    pub fn grow_count(&self) -> usize {
        self.grows
    }

    /// Append a table entry and return its slot.
    pub fn push_table_fn<F>(&mut self, f: F) -> u32
    where
        F: Fn(&mut MemGuest, &[i32]) -> Result<Option<i32>, BridgeError> + 'static,
    {
        self.table.push(Rc::new(f));
        (self.table.len() - 1) as u32
    }

    /// `(ptr, size)` of every `free`, in call order. The bump allocator
    /// never reuses them.
    pub fn freed(&self) -> &[(u32, u32)] {
        &self.freed
    }

    /// Bytes handed out by the allocator so far.
    pub fn allocated(&self) -> u32 {
        self.bump - HEAP_START
    }
}

impl Default for MemGuest {
    fn default() -> Self {
        Self::new()
    }
}

impl Guest for MemGuest {
    fn state(&self) -> &BridgeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut BridgeState {
        &mut self.state
    }

    fn buffer_id(&self) -> BufferId {
        BufferId::new(self.generation, self.memory.len())
    }

    fn memory(&self) -> &[u8] {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    fn malloc(&mut self, size: u32) -> Result<u32, BridgeError> {
        let ptr = self.bump;
        let end = ptr
            .checked_add(size.max(1))
            .and_then(|end| end.checked_add(7))
            .map(|end| end & !7)
            .ok_or_else(|| BridgeError::MemoryError(format!("allocation of {} bytes", size)))?;
        if end as usize > self.memory.len() {
            let needed = end as usize - self.memory.len();
            self.grow(needed.max(self.memory.len()));
        }
        self.bump = end;
        Ok(ptr)
    }

    fn realloc(&mut self, ptr: u32, old_size: u32, new_size: u32) -> Result<u32, BridgeError> {
        let fresh = self.malloc(new_size)?;
        let keep = old_size.min(new_size) as usize;
        let (src, dst) = (ptr as usize, fresh as usize);
        self.memory.copy_within(src..src + keep, dst);
        Ok(fresh)
    }

    fn free(&mut self, ptr: u32, size: u32) -> Result<(), BridgeError> {
        self.freed.push((ptr, size));
        Ok(())
    }

    fn call_table(&mut self, slot: u32, args: &[i32]) -> Result<Option<i32>, BridgeError> {
        let f = self
            .table
            .get(slot as usize)
            .cloned()
            .ok_or(BridgeError::EmptyTableSlot(slot))?;
        f(self, args)
    }
}
