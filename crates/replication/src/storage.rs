//! Storage engine contract and an in-memory ordered implementation.
//!
//! The replication server only needs a transactional batch: open it, apply
//! puts/gets/removes, then commit. Dropping a batch without committing
//! discards everything it did.

use corelib::{
    Error, GetRequest, InstanceId, PutRequest, PutResult, RemoveRequest, Result, Value, Version,
};
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A per-node store that hands out transactional batches.
pub trait StorageEngine: Send + Sync + 'static {
    type Batch: StorageBatch;

    /// Opens a batch. Batches on one store are serialized: a second call
    /// waits until the open batch commits or is dropped.
    fn begin_batch(&self) -> Result<Self::Batch>;

    /// Identity stamped on versions this store mints.
    fn instance_id(&self) -> InstanceId;
}

/// One transactional scope.
///
/// Requests reaching a batch have already been validated by the caller, so
/// `parent_versions` is always present.
pub trait StorageBatch: Send {
    fn put(&mut self, request: &PutRequest) -> Result<PutResult>;

    fn get(&mut self, request: &GetRequest) -> Result<Vec<Value>>;

    fn remove(&mut self, request: &RemoveRequest) -> Result<bool>;

    fn commit(self) -> Result<()>;
}

pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    })
}

/// Everything one holder knows about a key.
#[derive(Clone, Debug, Default)]
struct Entry {
    /// Live sibling versions.
    values: Vec<Value>,
    /// Versions superseded or removed here. A forwarded copy of one of these
    /// arriving late, or twice, is dropped instead of coming back as a sibling.
    retired: BTreeSet<Version>,
}

impl Entry {
    fn is_vacant(&self) -> bool {
        self.values.is_empty() && self.retired.is_empty()
    }
}

type Table = BTreeMap<String, Entry>;

/// Ordered in-memory store.
///
/// Each key holds a list of sibling versions. A write supersedes the
/// versions it names as parents; any other version left in place is a
/// concurrent sibling and makes the write report a conflict.
///
/// Superseded and removed versions are remembered per key for as long as the
/// store lives.
pub struct MemoryStorage {
    instance_id: InstanceId,
    table: Arc<Mutex<Table>>,
    next_version: Arc<AtomicU64>,
    clock: Clock,
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("instance_id", &self.instance_id)
            .field("keys", &self.len())
            .finish_non_exhaustive()
    }
}

impl MemoryStorage {
    pub fn new(instance_id: InstanceId) -> Self {
        Self::with_clock(instance_id, system_clock())
    }

    pub fn with_clock(instance_id: InstanceId, clock: Clock) -> Self {
        Self {
            instance_id,
            table: Arc::new(Mutex::new(BTreeMap::new())),
            next_version: Arc::new(AtomicU64::new(1)),
            clock,
        }
    }

    /// Number of keys holding at least one version.
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .values()
            .filter(|entry| !entry.values.is_empty())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageEngine for MemoryStorage {
    type Batch = MemoryBatch;

    fn begin_batch(&self) -> Result<MemoryBatch> {
        Ok(MemoryBatch {
            instance_id: self.instance_id,
            table: self.table.lock_arc(),
            next_version: Arc::clone(&self.next_version),
            clock: Arc::clone(&self.clock),
            touched: HashMap::new(),
        })
    }

    fn instance_id(&self) -> InstanceId {
        self.instance_id
    }
}

/// Copy-on-touch batch holding the table lock until it commits or drops.
///
/// The first access to a key copies its entry out of the table; commit
/// writes every touched key back.
pub struct MemoryBatch {
    instance_id: InstanceId,
    table: ArcMutexGuard<RawMutex, Table>,
    next_version: Arc<AtomicU64>,
    clock: Clock,
    touched: HashMap<String, Entry>,
}

impl MemoryBatch {
    fn entry(&mut self, key: &str) -> &mut Entry {
        let table = &self.table;
        self.touched
            .entry(key.to_owned())
            .or_insert_with(|| table.get(key).cloned().unwrap_or_default())
    }

    fn mint(&self) -> Version {
        Version::new(
            self.instance_id,
            self.next_version.fetch_add(1, Ordering::Relaxed),
        )
    }
}

fn parents_of<'a>(key: &str, parents: &'a Option<Vec<Version>>) -> Result<&'a [Version]> {
    parents
        .as_deref()
        .ok_or_else(|| Error::Storage(format!("unvalidated request for key '{key}'")))
}

impl StorageBatch for MemoryBatch {
    fn put(&mut self, request: &PutRequest) -> Result<PutResult> {
        let parents = parents_of(&request.key, &request.parent_versions)?.to_vec();
        let now = (self.clock)();
        let version = match request.replication_version {
            Some(version) => version,
            None => self.mint(),
        };

        let entry = self.entry(&request.key);
        // A forwarded copy of something already superseded or removed here.
        if entry.retired.contains(&version) {
            return Ok(PutResult {
                version: Some(version),
                conflict_exists: false,
            });
        }
        entry.values.retain(|v| !v.is_expired(now));

        // A forwarded copy we already hold: apply again without a conflict.
        let replay = entry.values.iter().any(|v| v.version == version);
        let conflict_exists = !replay
            && entry
                .values
                .iter()
                .any(|v| !parents.contains(&v.version));

        if conflict_exists && request.optimistic_concurrency {
            return Ok(PutResult {
                version: None,
                conflict_exists: true,
            });
        }

        entry
            .values
            .retain(|v| v.version != version && !parents.contains(&v.version));
        entry.retired.extend(parents.iter().copied());
        entry.values.push(Value {
            key: request.key.clone(),
            version,
            data: request.bytes.clone(),
            parent_versions: parents,
            timestamp: now,
            expires_at: request.expires_at,
            hash: Value::content_hash(&request.bytes),
        });

        Ok(PutResult {
            version: Some(version),
            conflict_exists,
        })
    }

    fn get(&mut self, request: &GetRequest) -> Result<Vec<Value>> {
        let now = (self.clock)();
        let values = self
            .entry(&request.key)
            .values
            .iter()
            .filter(|v| !v.is_expired(now))
            .filter(|v| request.specified_version.map_or(true, |s| s == v.version))
            .cloned()
            .collect();
        Ok(values)
    }

    fn remove(&mut self, request: &RemoveRequest) -> Result<bool> {
        let parents = parents_of(&request.key, &request.parent_versions)?.to_vec();
        let entry = self.entry(&request.key);
        let before = entry.values.len();
        entry.values.retain(|v| !parents.contains(&v.version));
        // Retired even when not held yet, so a put that arrives after its
        // remove stays removed.
        entry.retired.extend(parents);
        Ok(entry.values.len() < before)
    }

    fn commit(self) -> Result<()> {
        let MemoryBatch {
            mut table, touched, ..
        } = self;
        for (key, entry) in touched {
            if entry.is_vacant() {
                table.remove(&key);
            } else {
                table.insert(key, entry);
            }
        }
        Ok(())
    }
}
