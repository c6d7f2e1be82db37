use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Structural hash of a pool key. Zero marks a free slot in the pools, so it is never returned.
pub(crate) fn pool_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    match hasher.finish() {
        0 => 1,
        h => h,
    }
}
