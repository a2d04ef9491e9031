//! WebSocket frame masking
//!
//! XORs payload bytes with a repeating 4-byte key. Masking is its own
//! inverse, so the same routine masks client frames and unmasks them on
//! the server side.

/// Apply a WebSocket mask in place
///
/// Processes eight bytes per step with a doubled mask word and finishes
/// the tail byte by byte.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    if data.is_empty() {
        return;
    }

    let mask_u64 = u64::from_ne_bytes([
        mask[0], mask[1], mask[2], mask[3], mask[0], mask[1], mask[2], mask[3],
    ]);

    let mut chunks = data.chunks_exact_mut(8);
    for chunk in &mut chunks {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        let masked = u64::from_ne_bytes(word) ^ mask_u64;
        chunk.copy_from_slice(&masked.to_ne_bytes());
    }

    // Chunks are multiples of 4, so the tail starts at mask index 0
    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= mask[i & 3];
    }
}
