//! Partitioner abstraction for key routing.
//!
//! Partitioners are responsible for converting keys into the index of the
//! shard that owns them.

pub mod sip13;
pub mod traits;
pub mod xxh3;

pub use sip13::Sip13Partitioner;
pub use traits::Partitioner;
pub use xxh3::Xxh3Partitioner;
