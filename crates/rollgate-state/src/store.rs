//! StateStore — redb-backed object persistence for rollgate.
//!
//! Provides typed operations over releases, rollout blocks, and events.
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use rollgate_core::names::validate_label;
use rollgate_core::{
    Event, EventRecorder, EventType, ListError, ObjectReference, Release, RolloutBlock,
    RolloutBlockLister, SubjectWriter, UpdateError,
};
use tracing::{debug, error};

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Events kept per involved object unless configured otherwise.
pub const DEFAULT_EVENT_RETENTION: u64 = 100;

/// Thread-safe object store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    event_retention: u64,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            event_retention: DEFAULT_EVENT_RETENTION,
        };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            event_retention: DEFAULT_EVENT_RETENTION,
        };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Keep at most `limit` distinct events per involved object (minimum 1).
    pub fn with_event_retention(mut self, limit: u64) -> Self {
        self.event_retention = limit.max(1);
        self
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(RELEASES).map_err(map_err!(Table))?;
        txn.open_table(ROLLOUT_BLOCKS).map_err(map_err!(Table))?;
        txn.open_table(EVENTS).map_err(map_err!(Table))?;
        txn.open_table(EVENT_SEQUENCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Releases ───────────────────────────────────────────────────

    /// Store a new release. Fails if one with the same key exists.
    ///
    /// The release's resource version is set to the stored version.
    pub fn create_release(&self, release: &mut Release) -> StateResult<()> {
        validate_label("namespace", &release.metadata.namespace)?;
        validate_label("name", &release.metadata.name)?;
        let key = release.metadata.key();

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RELEASES).map_err(map_err!(Table))?;
            if table.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists(key));
            }
            let mut stored = release.clone();
            stored.metadata.resource_version = 1;
            let value = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        release.metadata.resource_version = 1;
        debug!(%key, "release created");
        Ok(())
    }

    /// Replace a stored release.
    ///
    /// The write only succeeds if the stored resource version equals the
    /// one carried by `release`; otherwise someone else wrote in between
    /// and [`StateError::Conflict`] is returned.
    pub fn update_release(&self, release: &mut Release) -> StateResult<()> {
        let key = release.metadata.key();
        let attempted = release.metadata.resource_version;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let next_version;
        {
            let mut table = txn.open_table(RELEASES).map_err(map_err!(Table))?;
            let current = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    let stored: Release =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    stored.metadata.resource_version
                }
                None => return Err(StateError::NotFound(key)),
            };
            if current != attempted {
                return Err(StateError::Conflict {
                    key,
                    current,
                    attempted,
                });
            }

            next_version = current + 1;
            let mut stored = release.clone();
            stored.metadata.resource_version = next_version;
            let value = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        release.metadata.resource_version = next_version;
        debug!(%key, version = next_version, "release updated");
        Ok(())
    }

    /// Get a release by namespace/name key.
    pub fn get_release(&self, key: &str) -> StateResult<Option<Release>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RELEASES).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let release: Release =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(release))
            }
            None => Ok(None),
        }
    }

    /// List all releases, ordered by key.
    pub fn list_releases(&self) -> StateResult<Vec<Release>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RELEASES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let release: Release =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(release);
        }
        Ok(results)
    }

    /// Delete a release by key. Returns true if it existed.
    pub fn delete_release(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(RELEASES).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "release deleted");
        Ok(existed)
    }

    // ── Rollout blocks ─────────────────────────────────────────────

    /// Insert or replace a rollout block, bumping its resource version.
    pub fn put_rollout_block(&self, block: &mut RolloutBlock) -> StateResult<()> {
        validate_label("namespace", &block.metadata.namespace)?;
        validate_label("name", &block.metadata.name)?;
        let key = block.metadata.key();

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let next_version;
        {
            let mut table = txn.open_table(ROLLOUT_BLOCKS).map_err(map_err!(Table))?;
            let current = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    let stored: RolloutBlock =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    stored.metadata.resource_version
                }
                None => 0,
            };
            next_version = current + 1;
            let mut stored = block.clone();
            stored.metadata.resource_version = next_version;
            let value = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        block.metadata.resource_version = next_version;
        debug!(%key, "rollout block stored");
        Ok(())
    }

    /// Get a rollout block by namespace/name key.
    pub fn get_rollout_block(&self, key: &str) -> StateResult<Option<RolloutBlock>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ROLLOUT_BLOCKS).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let block: RolloutBlock =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    /// List the rollout blocks in one namespace (by key prefix scan).
    pub fn list_rollout_blocks(&self, namespace: &str) -> StateResult<Vec<RolloutBlock>> {
        let prefix = format!("{namespace}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ROLLOUT_BLOCKS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(prefix.as_str()..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let block: RolloutBlock =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(block);
        }
        Ok(results)
    }

    /// List rollout blocks across all namespaces.
    pub fn list_all_rollout_blocks(&self) -> StateResult<Vec<RolloutBlock>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ROLLOUT_BLOCKS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let block: RolloutBlock =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(block);
        }
        Ok(results)
    }

    /// Delete a rollout block by key. Returns true if it existed.
    pub fn delete_rollout_block(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(ROLLOUT_BLOCKS).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "rollout block deleted");
        Ok(existed)
    }

    // ── Events ─────────────────────────────────────────────────────

    /// Record an event about `object`.
    ///
    /// An event that repeats the object's latest one (same type, reason and
    /// message) is folded into it: its `count` and `timestamp` advance and no
    /// new row is written. Otherwise the event gets the next sequence number
    /// and the object's events older than the retention limit are removed.
    pub fn record_event(
        &self,
        object: &ObjectReference,
        type_: EventType,
        reason: &str,
        message: &str,
    ) -> StateResult<Event> {
        let object_key = object.to_string();
        let now = unix_now();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let event;
        {
            let mut sequences = txn.open_table(EVENT_SEQUENCES).map_err(map_err!(Table))?;
            let mut events = txn.open_table(EVENTS).map_err(map_err!(Table))?;
            let last = sequences
                .get(object_key.as_str())
                .map_err(map_err!(Read))?
                .map(|guard| guard.value())
                .unwrap_or(0);

            let last_key = event_key(&object_key, last);
            let previous: Option<Event> =
                match events.get(last_key.as_str()).map_err(map_err!(Read))? {
                    Some(guard) => Some(
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                    ),
                    None => None,
                };

            event = match previous {
                Some(mut previous) if previous.repeats(type_, reason, message) => {
                    previous.count += 1;
                    previous.timestamp = now;
                    let value = serde_json::to_vec(&previous).map_err(map_err!(Serialize))?;
                    events
                        .insert(last_key.as_str(), value.as_slice())
                        .map_err(map_err!(Write))?;
                    previous
                }
                _ => {
                    let sequence = last + 1;
                    sequences
                        .insert(object_key.as_str(), sequence)
                        .map_err(map_err!(Write))?;
                    let next = Event {
                        involved_object: object.clone(),
                        type_,
                        reason: reason.to_string(),
                        message: message.to_string(),
                        sequence,
                        count: 1,
                        first_timestamp: now,
                        timestamp: now,
                    };
                    let value = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;
                    events
                        .insert(event_key(&object_key, sequence).as_str(), value.as_slice())
                        .map_err(map_err!(Write))?;

                    if sequence > self.event_retention {
                        let first = format!("{object_key}#");
                        let keep_from = event_key(&object_key, sequence - self.event_retention + 1);
                        let mut expired = Vec::new();
                        for entry in events
                            .range(first.as_str()..keep_from.as_str())
                            .map_err(map_err!(Read))?
                        {
                            let (key, _) = entry.map_err(map_err!(Read))?;
                            expired.push(key.value().to_string());
                        }
                        for key in &expired {
                            events.remove(key.as_str()).map_err(map_err!(Write))?;
                        }
                        if !expired.is_empty() {
                            debug!(object = %object, removed = expired.len(), "expired old events");
                        }
                    }
                    next
                }
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(event)
    }

    /// Events recorded about `object`, oldest first (by key prefix scan).
    pub fn list_events(&self, object: &ObjectReference) -> StateResult<Vec<Event>> {
        let prefix = format!("{object}#");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(EVENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(prefix.as_str()..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let event: Event =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(event);
        }
        Ok(results)
    }
}

fn event_key(object_key: &str, sequence: u64) -> String {
    format!("{object_key}#{sequence:020}")
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ── Gate contracts ─────────────────────────────────────────────────

impl RolloutBlockLister for StateStore {
    fn list(&self, namespace: &str) -> Result<Vec<RolloutBlock>, ListError> {
        self.list_rollout_blocks(namespace)
            .map_err(|e| e.into_list_error(namespace))
    }
}

impl SubjectWriter<Release> for StateStore {
    fn persist(&self, release: &mut Release) -> Result<(), UpdateError> {
        self.update_release(release).map_err(UpdateError::from)
    }
}

impl EventRecorder for StateStore {
    fn record(&self, object: &ObjectReference, type_: EventType, reason: &str, message: &str) {
        match self.record_event(object, type_, reason, message) {
            Ok(event) => {
                debug!(object = %object, %type_, reason, sequence = event.sequence, "event recorded")
            }
            Err(e) => error!(object = %object, reason, error = %e, "failed to record event"),
        }
    }
}
