use std::hash::Hasher;

use twox_hash::XxHash64;

/// Reduce `key` to the well-distributed 64-bit hash a filter expects.
pub fn key_hash(key: u64) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(&key.to_le_bytes());
    hasher.finish()
}
