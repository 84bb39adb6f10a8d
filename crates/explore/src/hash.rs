//! Stable id hashing.
//!
//! Unique keys are hashed independently by the producer and by any consumer
//! that re-validates recorded decisions, so the digest must not depend on the
//! platform or on process state. `std::hash` offers neither guarantee.

const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;

/// Hashes an identifier into a 64-bit seed component.
///
/// Purely numeric ids (after trimming) map to their integer value; anything
/// else goes through MurmurHash3 x86_32 with seed 0.
#[must_use]
pub fn compute_id_hash(id: &str) -> u64 {
    let trimmed = id.trim();
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(value) = trimmed.parse::<u64>() {
            return value;
        }
    }
    u64::from(murmur3_32(trimmed.as_bytes(), 0))
}

/// Combines the per-decision key hash with the cached application hash.
#[inline]
#[must_use]
pub fn salted_seed(key_hash: u64, app_hash: u64) -> u64 {
    key_hash.wrapping_add(app_hash)
}

fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let mut h = seed;
    let mut blocks = data.chunks_exact(4);
    for block in &mut blocks {
        let k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        h ^= scramble(k);
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = blocks.remainder();
    let mut k = 0u32;
    if tail.len() >= 3 {
        k ^= u32::from(tail[2]) << 16;
    }
    if tail.len() >= 2 {
        k ^= u32::from(tail[1]) << 8;
    }
    if !tail.is_empty() {
        k ^= u32::from(tail[0]);
        h ^= scramble(k);
    }

    h ^= data.len() as u32;
    fmix32(h)
}

#[inline]
fn scramble(k: u32) -> u32 {
    k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
}

#[inline]
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}
