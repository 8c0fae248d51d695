//! Core partitioner trait definitions.

/// A partitioner turns a key into a shard index.
///
/// Implementations must be fixed, documented functions of the key bytes so
/// that every client and server, in any process and on any platform, agrees
/// on which shard owns a key. Partitioners are stateless and thread-safe.
pub trait Partitioner: Send + Sync + 'static {
    /// Hashes a key to a 64-bit value.
    fn hash(&self, key: &[u8]) -> u64;

    /// Returns the versioned name of the hash function.
    fn name(&self) -> &'static str;

    /// Index of the shard owning `key` in a topology of `shard_count` nodes.
    ///
    /// # Panics
    ///
    /// Panics if `shard_count` is zero. Topologies are never empty once built.
    fn shard_index(&self, key: &[u8], shard_count: usize) -> usize {
        assert!(shard_count > 0, "shard count must be positive");
        (self.hash(key) % shard_count as u64) as usize
    }
}
