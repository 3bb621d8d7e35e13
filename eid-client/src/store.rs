//! Record persistence: the port flows write beacon records and the
//! cached credential through.
//!
//! Two implementations:
//! - [`MemoryStore`]: in-process only, loses state on restart
//! - [`FileStore`]: JSON snapshot on disk, survives restarts
//!
//! `update` carries the set of changed fields. Stores apply only those
//! fields; identity key, rotation exponent and tag never change after
//! insert.

use std::collections::BTreeMap;
use std::ops::BitOr;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::beacon::BeaconRecord;
use crate::credential::Credential;

/// Local record id. Credential records always use id 0.
pub type RecordId = u64;

/// Opaque kind tag distinguishing record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Beacon,
    Credential,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Beacon => f.write_str("beacon"),
            RecordKind::Credential => f.write_str("credential"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Beacon(BeaconRecord),
    Credential(Credential),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Beacon(_) => RecordKind::Beacon,
            Record::Credential(_) => RecordKind::Credential,
        }
    }
}

/// Set of beacon fields an update touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldSet(u8);

impl FieldSet {
    pub const NONE: FieldSet = FieldSet(0);
    /// state, epoch, server id
    pub const REGISTRATION: FieldSet = FieldSet(1);
    /// issued short URL and its deadline
    pub const LEASE_URL: FieldSet = FieldSet(1 << 1);
    /// whole lease: url id, url token, ttl, issued URL
    pub const LEASE: FieldSet = FieldSet(1 << 2);
    pub const STATUS: FieldSet = FieldSet(1 << 3);

    pub fn contains(self, other: FieldSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for FieldSet {
    type Output = FieldSet;

    fn bitor(self, rhs: FieldSet) -> FieldSet {
        FieldSet(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} record {id} not found")]
    NotFound { kind: RecordKind, id: RecordId },

    #[error("io: {0}")]
    Io(String),

    #[error("corrupt store: {0}")]
    Corrupt(String),
}

/// Key/value record store keyed by kind tag.
///
/// Implementations must be safe to share across tasks. Writes to one
/// beacon are serialized by the caller; different beacons never conflict.
pub trait RecordStore: Send + Sync {
    /// Insert a new record and return its id. Beacon ids are assigned by
    /// the store; inserting a credential replaces the previous one.
    ///
    /// # Errors
    /// `StoreError::Io` if the record cannot be written.
    fn insert(&self, record: &Record) -> Result<RecordId, StoreError>;

    /// Write the `changed` fields of an existing record.
    ///
    /// # Errors
    /// `StoreError::NotFound` for an unknown beacon id.
    fn update(&self, record: &Record, changed: FieldSet) -> Result<(), StoreError>;

    /// Remove a record. Removing an absent record is not an error.
    ///
    /// # Errors
    /// `StoreError::Io` if the removal cannot be written.
    fn delete(&self, kind: RecordKind, id: RecordId) -> Result<(), StoreError>;

    /// All records of one kind, beacons in id order.
    ///
    /// # Errors
    /// `StoreError::Io` / `StoreError::Corrupt` if the store cannot be read.
    fn query(&self, kind: RecordKind) -> Result<Vec<Record>, StoreError>;
}

/// Serializable store contents shared by both implementations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    next_id: RecordId,
    beacons: BTreeMap<RecordId, BeaconRecord>,
    credential: Option<Credential>,
}

impl Snapshot {
    fn insert(&mut self, record: &Record) -> RecordId {
        match record {
            Record::Beacon(beacon) => {
                self.next_id += 1;
                let id = self.next_id;
                let mut stored = beacon.clone();
                stored.id = id;
                self.beacons.insert(id, stored);
                id
            }
            Record::Credential(credential) => {
                self.credential = Some(credential.clone());
                0
            }
        }
    }

    fn update(&mut self, record: &Record, changed: FieldSet) -> Result<(), StoreError> {
        match record {
            Record::Beacon(beacon) => {
                let stored = self
                    .beacons
                    .get_mut(&beacon.id)
                    .ok_or(StoreError::NotFound {
                        kind: RecordKind::Beacon,
                        id: beacon.id,
                    })?;
                apply_fields(stored, beacon, changed);
                Ok(())
            }
            Record::Credential(credential) => {
                self.credential = Some(credential.clone());
                Ok(())
            }
        }
    }

    fn delete(&mut self, kind: RecordKind, id: RecordId) {
        match kind {
            RecordKind::Beacon => {
                self.beacons.remove(&id);
            }
            RecordKind::Credential => self.credential = None,
        }
    }

    fn query(&self, kind: RecordKind) -> Vec<Record> {
        match kind {
            RecordKind::Beacon => self.beacons.values().cloned().map(Record::Beacon).collect(),
            RecordKind::Credential => self.credential.iter().cloned().map(Record::Credential).collect(),
        }
    }
}

fn apply_fields(stored: &mut BeaconRecord, from: &BeaconRecord, changed: FieldSet) {
    if changed.contains(FieldSet::REGISTRATION) {
        stored.state = from.state;
        stored.epoch = from.epoch;
        stored.server_id = from.server_id.clone();
    }
    if changed.contains(FieldSet::LEASE) {
        stored.lease = from.lease.clone();
    } else if changed.contains(FieldSet::LEASE_URL) {
        if let (Some(target), Some(source)) = (stored.lease.as_mut(), from.lease.as_ref()) {
            target.short_url = source.short_url.clone();
            target.expire_at = source.expire_at;
        }
    }
    if changed.contains(FieldSet::STATUS) {
        stored.status = from.status;
    }
}

fn lock_snapshot(mutex: &Mutex<Snapshot>) -> MutexGuard<'_, Snapshot> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("record store mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn insert(&self, record: &Record) -> Result<RecordId, StoreError> {
        Ok(lock_snapshot(&self.inner).insert(record))
    }

    fn update(&self, record: &Record, changed: FieldSet) -> Result<(), StoreError> {
        lock_snapshot(&self.inner).update(record, changed)
    }

    fn delete(&self, kind: RecordKind, id: RecordId) -> Result<(), StoreError> {
        lock_snapshot(&self.inner).delete(kind, id);
        Ok(())
    }

    fn query(&self, kind: RecordKind) -> Result<Vec<Record>, StoreError> {
        Ok(lock_snapshot(&self.inner).query(kind))
    }
}

/// Store persisted as one JSON document.
///
/// Every mutation rewrites the document through a temporary file and a
/// rename, so a crash leaves either the old or the new snapshot.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: Mutex<Snapshot>,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    /// `StoreError::Io` if the file cannot be read, `StoreError::Corrupt`
    /// if it does not parse.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = match std::fs::read_to_string(&path) {
            Ok(json) => {
                serde_json::from_str(&json).map_err(|e| StoreError::Corrupt(e.to_string()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };
        tracing::debug!(path = %path.display(), beacons = snapshot.beacons.len(), "record store opened");
        Ok(Self {
            path,
            inner: Mutex::new(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let json =
            serde_json::to_string_pretty(snapshot).map_err(|e| StoreError::Io(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(|e| StoreError::Io(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| StoreError::Io(e.to_string()))
    }

    /// Apply `mutate` to a copy and commit it only if the write succeeds.
    fn mutate<T>(
        &self,
        mutate: impl FnOnce(&mut Snapshot) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = lock_snapshot(&self.inner);
        let mut next = guard.clone();
        let out = mutate(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(out)
    }
}

impl RecordStore for FileStore {
    fn insert(&self, record: &Record) -> Result<RecordId, StoreError> {
        self.mutate(|s| Ok(s.insert(record)))
    }

    fn update(&self, record: &Record, changed: FieldSet) -> Result<(), StoreError> {
        self.mutate(|s| s.update(record, changed))
    }

    fn delete(&self, kind: RecordKind, id: RecordId) -> Result<(), StoreError> {
        self.mutate(|s| {
            s.delete(kind, id);
            Ok(())
        })
    }

    fn query(&self, kind: RecordKind) -> Result<Vec<Record>, StoreError> {
        Ok(lock_snapshot(&self.inner).query(kind))
    }
}
