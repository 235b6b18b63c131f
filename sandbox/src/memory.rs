//! Guest linear memory access: bounds-checked helpers and the view cache.
//!
//! The raw helpers validate pointer and length arguments against the slice
//! they are given. Views add a second check: each one is tagged with the
//! identity of the buffer it was built over, and every access compares that
//! tag against the guest's current buffer. Growth replaces the buffer (or at
//! least changes its length), so a view taken before an allocation that grew
//! memory fails with `StaleView` instead of reading the old bytes.

use crate::error::BridgeError;
use crate::guest::Guest;

/// Size of one wasm page.
pub const WASM_PAGE_SIZE: usize = 65536;

// ── Bounds-checked helpers ──

/// Validate that a pointer range `[ptr, ptr+len)` is within memory bounds.
pub fn validate_range(mem_size: usize, ptr: u32, len: u32) -> Result<(), BridgeError> {
    let end = (ptr as usize)
        .checked_add(len as usize)
        .ok_or(BridgeError::OutOfBounds { ptr, len })?;
    if end > mem_size {
        return Err(BridgeError::OutOfBounds { ptr, len });
    }
    Ok(())
}

/// Borrow `len` bytes of guest memory at `ptr`.
pub fn read_bytes(mem: &[u8], ptr: u32, len: u32) -> Result<&[u8], BridgeError> {
    validate_range(mem.len(), ptr, len)?;
    let start = ptr as usize;
    Ok(&mem[start..start + len as usize])
}

/// Write `data` bytes to guest memory at `ptr`.
pub fn write_bytes(mem: &mut [u8], ptr: u32, data: &[u8]) -> Result<(), BridgeError> {
    validate_range(mem.len(), ptr, data.len() as u32)?;
    let start = ptr as usize;
    mem[start..start + data.len()].copy_from_slice(data);
    Ok(())
}

/// Read a little-endian u32 at `ptr`.
pub fn read_u32(mem: &[u8], ptr: u32) -> Result<u32, BridgeError> {
    let bytes = read_bytes(mem, ptr, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Write a little-endian u32 at `ptr`.
pub fn write_u32(mem: &mut [u8], ptr: u32, value: u32) -> Result<(), BridgeError> {
    write_bytes(mem, ptr, &value.to_le_bytes())
}

// ── Views ──

/// Identity of a guest backing buffer.
///
/// Any growth changes it: wasmtime memories report a new size (and possibly
/// a new base), the in-memory guest allocates a fresh buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId {
    base: usize,
    len: usize,
}

impl BufferId {
    pub const fn new(base: usize, len: usize) -> Self {
        Self { base, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn check_current<G: Guest + ?Sized>(id: BufferId, guest: &G) -> Result<(), BridgeError> {
    if guest.buffer_id() != id {
        tracing::trace!(target: "heapbridge::memory", ?id, "rejected stale view");
        return Err(BridgeError::StaleView);
    }
    Ok(())
}

/// Byte-granular view over one guest buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteView {
    id: BufferId,
}

impl ByteView {
    pub fn buffer(&self) -> BufferId {
        self.id
    }

    pub fn read<'g, G: Guest + ?Sized>(
        &self,
        guest: &'g G,
        ptr: u32,
        len: u32,
    ) -> Result<&'g [u8], BridgeError> {
        check_current(self.id, guest)?;
        read_bytes(guest.memory(), ptr, len)
    }

    pub fn write<G: Guest + ?Sized>(
        &self,
        guest: &mut G,
        ptr: u32,
        data: &[u8],
    ) -> Result<(), BridgeError> {
        check_current(self.id, guest)?;
        write_bytes(guest.memory_mut(), ptr, data)
    }

    /// Mutable window `[ptr, ptr+len)` for in-place encoding.
    pub fn slice_mut<'g, G: Guest + ?Sized>(
        &self,
        guest: &'g mut G,
        ptr: u32,
        len: u32,
    ) -> Result<&'g mut [u8], BridgeError> {
        check_current(self.id, guest)?;
        let mem = guest.memory_mut();
        validate_range(mem.len(), ptr, len)?;
        let start = ptr as usize;
        Ok(&mut mem[start..start + len as usize])
    }
}

/// 32-bit word view over one guest buffer. Addresses are byte addresses and
/// must be 4-byte aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordView {
    id: BufferId,
}

impl WordView {
    pub fn buffer(&self) -> BufferId {
        self.id
    }

    pub fn get<G: Guest + ?Sized>(&self, guest: &G, ptr: u32) -> Result<u32, BridgeError> {
        check_current(self.id, guest)?;
        if ptr % 4 != 0 {
            return Err(BridgeError::Misaligned(ptr));
        }
        read_u32(guest.memory(), ptr)
    }

    pub fn set<G: Guest + ?Sized>(
        &self,
        guest: &mut G,
        ptr: u32,
        value: u32,
    ) -> Result<(), BridgeError> {
        check_current(self.id, guest)?;
        if ptr % 4 != 0 {
            return Err(BridgeError::Misaligned(ptr));
        }
        write_u32(guest.memory_mut(), ptr, value)
    }
}

/// One cached view per granularity, rebuilt when the buffer changes.
#[derive(Debug, Default)]
pub struct ViewCache {
    bytes: Option<ByteView>,
    words: Option<WordView>,
    rebuilds: u64,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Byte view over `current`, reusing the cached one when still valid.
    pub fn byte_view(&mut self, current: BufferId) -> ByteView {
        match self.bytes {
            Some(view) if view.id == current => view,
            _ => {
                self.rebuilds += 1;
                tracing::trace!(target: "heapbridge::memory", len = current.len(), "rebuilt byte view");
                let view = ByteView { id: current };
                self.bytes = Some(view);
                view
            }
        }
    }

    /// Word view over `current`, reusing the cached one when still valid.
    pub fn word_view(&mut self, current: BufferId) -> WordView {
        match self.words {
            Some(view) if view.id == current => view,
            _ => {
                self.rebuilds += 1;
                tracing::trace!(target: "heapbridge::memory", len = current.len(), "rebuilt word view");
                let view = WordView { id: current };
                self.words = Some(view);
                view
            }
        }
    }

    /// Total number of views built so far.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }
}
