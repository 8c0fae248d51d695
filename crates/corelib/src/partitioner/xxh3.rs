//! XXH3 partitioner implementation.

use crate::partitioner::traits::Partitioner;
use xxhash_rust::xxh3::xxh3_64;

/// Canonical routing hash: XXH3 64-bit, seed 0, over the raw key bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct Xxh3Partitioner;

impl Partitioner for Xxh3Partitioner {
    fn hash(&self, key: &[u8]) -> u64 {
        xxh3_64(key)
    }

    fn name(&self) -> &'static str {
        "xxh3-64/v1"
    }
}
