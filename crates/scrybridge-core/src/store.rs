// ── Device mirror store ──
//
// Single-writer / many-reader storage for the hub mirror. One `RwLock`
// guards the whole map so every operation is atomic with respect to every
// other; records are copy-on-write `Arc`s, so a copy handed to a reader can
// never change underneath it. Changes and connection state are published
// on `watch` channels.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::model::{ConnectionState, DeviceRecord};

struct Entry {
    record: Arc<DeviceRecord>,
    /// Set when a complete snapshot no longer lists the device.
    stale_since: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Inner {
    devices: HashMap<String, Entry>,
    last_update: Option<DateTime<Utc>>,
}

/// Outcome of applying one full-state snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotSummary {
    /// Devices inserted or replaced.
    pub upserted: usize,
    /// Entries skipped because their value was not an object.
    pub skipped: usize,
    /// Devices newly marked stale because the snapshot omitted them.
    pub newly_stale: usize,
}

/// Consistent point-in-time view for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    pub state: ConnectionState,
    pub device_count: usize,
    pub stale_count: usize,
    pub last_update: Option<DateTime<Utc>>,
}

/// The in-memory hub mirror.
pub struct DeviceStore {
    inner: RwLock<Inner>,
    connection: watch::Sender<ConnectionState>,
    version: watch::Sender<u64>,
}

impl DeviceStore {
    pub fn new() -> Self {
        let (connection, _) = watch::channel(ConnectionState::Disconnected);
        let (version, _) = watch::channel(0u64);

        Self {
            inner: RwLock::new(Inner::default()),
            connection,
            version,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Insert a device or replace its attributes wholesale.
    ///
    /// Clears any stale mark. Returns `true` if the device was new.
    pub fn upsert_full(&self, id: &str, attributes: Map<String, Value>) -> bool {
        let record = DeviceRecord::from_attributes(id, attributes);
        let is_new = {
            let mut inner = self.write();
            let now = Utc::now();
            let is_new = upsert_locked(&mut inner, record);
            inner.last_update = Some(now);
            is_new
        };
        self.bump_version();
        is_new
    }

    /// Apply a complete hub snapshot in one atomic step.
    ///
    /// Object-valued entries are upserted. Known devices the snapshot does
    /// not mention are marked stale (never deleted here).
    pub fn apply_snapshot(&self, devices: Map<String, Value>) -> SnapshotSummary {
        let mut summary = SnapshotSummary::default();
        {
            let mut inner = self.write();
            let now = Utc::now();
            let mut seen = HashSet::with_capacity(devices.len());

            for (id, value) in devices {
                let Value::Object(attributes) = value else {
                    trace!(device_id = %id, "skipping non-object snapshot entry");
                    summary.skipped += 1;
                    continue;
                };
                seen.insert(id.clone());
                upsert_locked(&mut inner, DeviceRecord::from_attributes(id, attributes));
                summary.upserted += 1;
            }

            for (id, entry) in &mut inner.devices {
                if !seen.contains(id) && entry.stale_since.is_none() {
                    debug!(device_id = %id, "device missing from snapshot, marking stale");
                    entry.stale_since = Some(now);
                    summary.newly_stale += 1;
                }
            }

            inner.last_update = Some(now);
        }
        self.bump_version();
        summary
    }

    /// Set one property on a known device.
    ///
    /// Unknown devices are left alone (no partial record is created).
    /// Returns `true` if the change was applied.
    pub fn apply_property(&self, id: &str, property: &str, value: Value) -> bool {
        let applied = {
            let mut inner = self.write();
            let Some(entry) = inner.devices.get_mut(id) else {
                return false;
            };
            let applied = Arc::make_mut(&mut entry.record).set_property(property, value);
            if applied {
                inner.last_update = Some(Utc::now());
            }
            applied
        };
        if applied {
            self.bump_version();
        }
        applied
    }

    /// Drop devices that have been stale for longer than `ttl`.
    ///
    /// Returns how many were removed.
    pub fn expire_stale(&self, ttl: Duration, now: DateTime<Utc>) -> usize {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let removed = {
            let mut inner = self.write();
            let before = inner.devices.len();
            inner.devices.retain(|id, entry| match entry.stale_since {
                Some(since) if now.signed_duration_since(since) >= ttl => {
                    debug!(device_id = %id, "expiring stale device");
                    false
                }
                _ => true,
            });
            before - inner.devices.len()
        };
        if removed > 0 {
            self.bump_version();
        }
        removed
    }

    // ── Connectivity ─────────────────────────────────────────────────

    pub fn set_connection_state(&self, state: ConnectionState) {
        self.connection.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    /// `true` ⇒ connected, `false` ⇒ disconnected.
    pub fn set_connectivity(&self, connected: bool) {
        self.set_connection_state(if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        });
    }

    pub fn connectivity(&self) -> bool {
        self.connection.borrow().is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    pub fn subscribe_connectivity(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Option<Arc<DeviceRecord>> {
        self.read().devices.get(id).map(|e| Arc::clone(&e.record))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().devices.contains_key(id)
    }

    /// Point-in-time copy of every record, sorted by id.
    pub fn list(&self) -> Vec<Arc<DeviceRecord>> {
        let mut records: Vec<_> = self
            .read()
            .devices
            .values()
            .map(|e| Arc::clone(&e.record))
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Point-in-time copy of every camera record, sorted by id.
    pub fn cameras(&self) -> Vec<Arc<DeviceRecord>> {
        let mut records = self.list();
        records.retain(|r| r.is_camera());
        records
    }

    pub fn len(&self) -> usize {
        self.read().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stale_count(&self) -> usize {
        self.read()
            .devices
            .values()
            .filter(|e| e.stale_since.is_some())
            .count()
    }

    pub fn is_stale(&self, id: &str) -> bool {
        self.read()
            .devices
            .get(id)
            .is_some_and(|e| e.stale_since.is_some())
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.read().last_update
    }

    pub fn status(&self) -> StoreStatus {
        let state = self.connection_state();
        let inner = self.read();
        StoreStatus {
            state,
            device_count: inner.devices.len(),
            stale_count: inner
                .devices
                .values()
                .filter(|e| e.stale_since.is_some())
                .count(),
            last_update: inner.last_update,
        }
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Version counter bumped after every applied mutation.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

fn upsert_locked(inner: &mut Inner, record: DeviceRecord) -> bool {
    match inner.devices.get_mut(&record.id) {
        Some(entry) => {
            entry.record = Arc::new(record);
            entry.stale_since = None;
            false
        }
        None => {
            inner.devices.insert(
                record.id.clone(),
                Entry {
                    record: Arc::new(record),
                    stale_since: None,
                },
            );
            true
        }
    }
}
