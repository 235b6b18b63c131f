//! The handle table: host values addressed by small integers.
//!
//! Slots either hold a live value or link to the next free slot, forming an
//! intrusive singly linked free list. Allocation pops the head of the free
//! list (so the most recently released slot is reused first) and only
//! appends a new slot when the list is empty. The table never shrinks.

use crate::error::HostError;
use crate::handle::Handle;
use crate::value::HostValue;

enum Slot {
    Live(HostValue),
    /// Index of the next free slot, or `None` at the end of the chain.
    Free(Option<u32>),
}

/// Bidirectional mapping between handles and host values.
///
/// Owned by exactly one bridge instance; created with it and dropped with it.
/// Every non-reserved handle below `slot_count() + RESERVED` is either live
/// or on the free chain exactly once.
pub struct HandleTable {
    slots: Vec<Slot>,
    free_head: Option<u32>,
    live: usize,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_head: None,
            live: 0,
        }
    }

    /// Store `value` and return its new handle. Never fails.
    pub fn allocate(&mut self, value: HostValue) -> Handle {
        self.live += 1;
        match self.free_head {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                if let Slot::Free(next) = *slot {
                    self.free_head = next;
                }
                *slot = Slot::Live(value);
                Handle::from_raw(index + Handle::RESERVED)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot::Live(value));
                tracing::trace!(target: "heapbridge::heap", slots = self.slots.len(), "grew handle table");
                Handle::from_raw(index + Handle::RESERVED)
            }
        }
    }

    /// Return the reserved handle for constants, allocating otherwise.
    pub fn intern(&mut self, value: HostValue) -> Handle {
        match Handle::for_constant(&value) {
            Some(handle) => handle,
            None => self.allocate(value),
        }
    }

    /// Dereference a handle. Reserved handles yield their constants.
    pub fn get(&self, handle: Handle) -> Result<HostValue, HostError> {
        if let Some(constant) = handle.constant() {
            return Ok(constant);
        }
        match self.slot(handle) {
            Some(Slot::Live(value)) => Ok(value.clone()),
            _ => Err(HostError::InvalidHandle(handle.as_raw())),
        }
    }

    /// Release a handle, pushing its slot onto the head of the free chain.
    ///
    /// A no-op for reserved handles.
    pub fn release(&mut self, handle: Handle) -> Result<(), HostError> {
        self.take(handle).map(drop)
    }

    /// Dereference and release in one step, for values consumed exactly once.
    pub fn take(&mut self, handle: Handle) -> Result<HostValue, HostError> {
        if let Some(constant) = handle.constant() {
            return Ok(constant);
        }
        let index = handle.as_raw() - Handle::RESERVED;
        let slot = self
            .slots
            .get_mut(index as usize)
            .filter(|slot| matches!(slot, Slot::Live(_)))
            .ok_or(HostError::InvalidHandle(handle.as_raw()))?;
        let Slot::Live(value) = std::mem::replace(slot, Slot::Free(self.free_head)) else {
            return Err(HostError::InvalidHandle(handle.as_raw()));
        };
        self.free_head = Some(index);
        self.live -= 1;
        Ok(value)
    }

    /// Allocate an independent handle to the same referent.
    ///
    /// Releasing either handle leaves the other valid. Reserved handles are
    /// returned unchanged.
    pub fn clone_ref(&mut self, handle: Handle) -> Result<Handle, HostError> {
        if handle.is_reserved() {
            return Ok(handle);
        }
        let value = self.get(handle)?;
        Ok(self.allocate(value))
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        handle.is_reserved() || matches!(self.slot(handle), Some(Slot::Live(_)))
    }

    /// Number of live, non-reserved handles.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Number of slots ever appended, live or free.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, handle: Handle) -> Option<&Slot> {
        let index = handle.as_raw().checked_sub(Handle::RESERVED)?;
        self.slots.get(index as usize)
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
