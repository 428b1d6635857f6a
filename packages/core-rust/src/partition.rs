//! Key-to-partition routing for order records.
//!
//! Records are keyed by order id. The partition is `fnv1a_hash(key) % count`,
//! so every delivery of the same order lands on the same partition and keeps
//! its per-partition ordering.

/// FNV-1a offset basis (32-bit).
const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;

/// FNV-1a prime (32-bit).
const FNV_PRIME: u32 = 0x0100_0193;

/// Default number of partitions for the orders topic.
pub const DEFAULT_PARTITION_COUNT: u32 = 4;

/// Computes a 32-bit FNV-1a hash over the UTF-8 bytes of `s`.
///
/// # Examples
///
/// ```
/// use orderflow_core::partition::fnv1a_hash;
///
/// assert_eq!(fnv1a_hash(""), 2_166_136_261); // FNV offset basis
/// assert_eq!(fnv1a_hash("a"), 0xe40c_292c);
/// ```
#[must_use]
pub fn fnv1a_hash(s: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in s.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Maps a record key to a partition in `[0, partition_count)`.
///
/// # Panics
///
/// Panics if `partition_count` is zero. Topic construction rejects a zero
/// partition count, so this is a programmer error.
#[must_use]
pub fn partition_for(key: &str, partition_count: u32) -> u32 {
    assert!(partition_count > 0, "partition_count must be > 0");
    fnv1a_hash(key) % partition_count
}
