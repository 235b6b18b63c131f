//! UTF-8 text across the memory boundary.
//!
//! Encoding allocates one byte per UTF-16 code unit of the input, which is
//! exact for ASCII. When the text does not fit, the buffer is resized to the
//! bytes written so far plus three bytes per remaining code unit. Three bytes
//! cover any single unit and a surrogate pair's four bytes fit in its six, so
//! at most one resize is ever needed. The allocator may grow guest memory at
//! either step, so every write takes a fresh view.

use crate::error::BridgeError;
use crate::guest::Guest;

/// Decode `[ptr, ptr+len)` as UTF-8, replacing malformed sequences.
pub fn decode(guest: &mut dyn Guest, ptr: u32, len: u32) -> Result<String, BridgeError> {
    let view = guest.byte_view();
    let bytes = view.read(&*guest, ptr, len)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Copy `text` into a fresh guest allocation and return its address.
///
/// The byte length is left in `BridgeState::last_encode_len`.
pub fn encode(guest: &mut dyn Guest, text: &str) -> Result<u32, BridgeError> {
    let mut size = utf16_len(text);
    let mut ptr = guest.malloc(size)?;
    let mut offset = 0u32;
    let mut rest = text;

    loop {
        let room = (size - offset) as usize;
        let mut fit = rest.len().min(room);
        while !rest.is_char_boundary(fit) {
            fit -= 1;
        }
        let at = ptr.checked_add(offset).ok_or(BridgeError::OutOfBounds {
            ptr,
            len: fit as u32,
        })?;
        let view = guest.byte_view();
        view.write(guest, at, &rest.as_bytes()[..fit])?;
        offset += fit as u32;
        rest = &rest[fit..];
        if rest.is_empty() {
            break;
        }

        let new_size = utf16_len(rest)
            .checked_mul(3)
            .and_then(|n| n.checked_add(offset))
            .ok_or_else(|| BridgeError::MemoryError("string too large for guest memory".into()))?;
        tracing::trace!(
            target: "heapbridge::strings",
            written = offset,
            old_size = size,
            new_size,
            "growing string buffer"
        );
        ptr = guest.realloc(ptr, size, new_size)?;
        size = new_size;
    }

    guest.state_mut().last_encode_len = offset;
    Ok(ptr)
}

/// [`encode`], then read the length back from the side channel.
pub fn encode_with_len(guest: &mut dyn Guest, text: &str) -> Result<(u32, u32), BridgeError> {
    let ptr = encode(guest, text)?;
    Ok((ptr, guest.state().last_encode_len))
}

fn utf16_len(text: &str) -> u32 {
    text.encode_utf16().count() as u32
}
