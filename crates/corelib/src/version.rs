//! Versioned value envelope and the request/result types that carry it.
//!
//! The core never interprets versions beyond equality: it stamps the version
//! a primary assigned onto forwarded copies so that every holder of a key
//! ends up with the same `Version`, and it reports `conflict_exists` when the
//! store kept concurrent siblings. Merge policy belongs to the caller.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Keys starting with this prefix are reserved for internal bookkeeping.
pub const RESERVED_KEY_PREFIX: &str = "__ringkv:";

/// Identifies the store instance that minted a version.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct InstanceId(pub u128);

impl InstanceId {
    /// Derives a stable instance id from a node name.
    pub fn from_name(name: &str) -> Self {
        InstanceId(xxhash_rust::xxh3::xxh3_128(name.as_bytes()))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// A version stamp. Unique per (instance, number).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Version {
    pub instance_id: InstanceId,
    pub number: u64,
}

impl Version {
    pub fn new(instance_id: InstanceId, number: u64) -> Self {
        Self {
            instance_id,
            number,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.instance_id, self.number)
    }
}

/// A write of one key.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct PutRequest {
    pub key: String,
    pub bytes: Vec<u8>,
    /// Versions this write supersedes. `None` is rejected; an empty list
    /// means the writer knows of no prior version.
    pub parent_versions: Option<Vec<Version>>,
    /// Unix milliseconds after which the value is no longer returned.
    pub expires_at: Option<u64>,
    /// Refuse the write instead of creating a sibling when it would conflict.
    pub optimistic_concurrency: bool,
    /// Version assigned by the primary. Set only on forwarded copies.
    pub replication_version: Option<Version>,
}

impl PutRequest {
    pub fn new(key: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            bytes: bytes.into(),
            parent_versions: Some(Vec::new()),
            expires_at: None,
            optimistic_concurrency: false,
            replication_version: None,
        }
    }

    pub fn with_parents(mut self, parents: impl IntoIterator<Item = Version>) -> Self {
        self.parent_versions = Some(parents.into_iter().collect());
        self
    }

    pub fn expiring_at(mut self, unix_millis: u64) -> Self {
        self.expires_at = Some(unix_millis);
        self
    }

    pub fn optimistic(mut self) -> Self {
        self.optimistic_concurrency = true;
        self
    }
}

/// A read of one key.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct GetRequest {
    pub key: String,
    /// Restrict the answer to this exact version.
    pub specified_version: Option<Version>,
}

impl GetRequest {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            specified_version: None,
        }
    }

    pub fn at_version(mut self, version: Version) -> Self {
        self.specified_version = Some(version);
        self
    }
}

/// A removal of specific versions of one key.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub key: String,
    pub parent_versions: Option<Vec<Version>>,
}

impl RemoveRequest {
    pub fn new(key: impl Into<String>, parents: impl IntoIterator<Item = Version>) -> Self {
        Self {
            key: key.into(),
            parent_versions: Some(parents.into_iter().collect()),
        }
    }
}

/// Outcome of one write.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct PutResult {
    /// `None` only when an optimistic write was refused.
    pub version: Option<Version>,
    pub conflict_exists: bool,
}

/// One stored version of a key.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Value {
    pub key: String,
    pub version: Version,
    pub data: Vec<u8>,
    pub parent_versions: Vec<Version>,
    /// Unix milliseconds at which this holder stored the value.
    pub timestamp: u64,
    pub expires_at: Option<u64>,
    /// BLAKE3 digest of `data`.
    pub hash: [u8; 32],
}

impl Value {
    pub fn content_hash(data: &[u8]) -> [u8; 32] {
        *blake3::hash(data).as_bytes()
    }

    pub fn is_expired(&self, now_millis: u64) -> bool {
        self.expires_at.map_or(false, |at| at <= now_millis)
    }
}

/// Checks the invariants every write request must satisfy before it
/// reaches storage.
pub fn validate_key(key: &str) -> crate::Result<()> {
    if key.starts_with(RESERVED_KEY_PREFIX) {
        return Err(crate::Error::InvalidArgument(format!(
            "key '{key}' uses the reserved prefix '{RESERVED_KEY_PREFIX}'"
        )));
    }
    Ok(())
}

pub fn validate_parents<'a>(
    key: &str,
    parents: &'a Option<Vec<Version>>,
) -> crate::Result<&'a [Version]> {
    parents.as_deref().ok_or_else(|| {
        crate::Error::InvalidArgument(format!("parent versions missing for key '{key}'"))
    })
}
