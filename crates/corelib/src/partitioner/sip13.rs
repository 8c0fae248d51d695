//! SipHash-1-3 partitioner implementation.

use crate::partitioner::traits::Partitioner;
use siphasher::sip::SipHasher13;
use std::hash::Hasher;

/// SipHash-1-3 with both keys zero, written over the raw key bytes.
///
/// The bytes go through `Hasher::write` directly, so no length prefix or
/// platform-dependent `Hash` impl ends up in the digest.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sip13Partitioner;

impl Partitioner for Sip13Partitioner {
    fn hash(&self, key: &[u8]) -> u64 {
        let mut hasher = SipHasher13::new_with_keys(0, 0);
        hasher.write(key);
        hasher.finish()
    }

    fn name(&self) -> &'static str {
        "sip13-64/v1"
    }
}
