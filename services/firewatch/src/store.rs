//! Device state store: latest reading per device, mirrored to a snapshot slot

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{NormalizationError, PersistenceError};
use crate::persistence::SnapshotStore;
use crate::reading::{self, Reading};

/// Readings keyed by MAC address
pub type DeviceMap = BTreeMap<String, Reading>;

/// In-memory mapping from device to its latest reading.
///
/// Holds at most one reading per MAC address. Every successful
/// [`upsert`](DeviceStateStore::upsert) rewrites the whole mirror.
#[derive(Debug)]
pub struct DeviceStateStore {
    readings: DeviceMap,
    mirror: Arc<dyn SnapshotStore>,
}

impl DeviceStateStore {
    /// An empty store that mirrors into `mirror`
    pub fn new(mirror: Arc<dyn SnapshotStore>) -> Self {
        Self {
            readings: DeviceMap::new(),
            mirror,
        }
    }

    /// Warm-start from the mirror.
    ///
    /// An absent or unreadable snapshot yields an empty store together with
    /// the warning to surface; startup is never blocked.
    pub fn hydrate(mirror: Arc<dyn SnapshotStore>) -> (Self, Option<PersistenceError>) {
        let loaded = match mirror.load() {
            Ok(Some(contents)) => serde_json::from_str::<DeviceMap>(&contents)
                .map_err(|e| PersistenceError::Malformed(e.to_string())),
            Ok(None) => Err(PersistenceError::NotFound(mirror.location())),
            Err(e) => Err(e),
        };

        match loaded {
            Ok(readings) => {
                tracing::info!(
                    "Hydrated {} device(s) from {}",
                    readings.len(),
                    mirror.location()
                );
                (Self { readings, mirror }, None)
            }
            Err(e) => (Self::new(mirror), Some(e)),
        }
    }

    /// Parse and normalize a raw payload without touching the store.
    ///
    /// `Ok(None)` means the message carried no `mac_address` and was filtered.
    pub fn ingest(payload: &[u8]) -> Result<Option<Reading>, NormalizationError> {
        reading::normalize(payload)
    }

    /// Replace the entry for `reading.mac_address` and rewrite the mirror.
    ///
    /// The in-memory entry is replaced even when the mirror write fails; the
    /// returned error only reports that the snapshot is now stale.
    pub fn upsert(&mut self, reading: Reading) -> Result<(), PersistenceError> {
        self.stage(reading)?.write()
    }

    /// Replace the entry and serialize the mirror contents without writing.
    ///
    /// The returned [`PendingSnapshot`] owns everything needed for the write,
    /// so callers can release their lock on the store before performing it.
    pub fn stage(&mut self, reading: Reading) -> Result<PendingSnapshot, PersistenceError> {
        self.readings.insert(reading.mac_address.clone(), reading);
        let contents = serde_json::to_string(&self.readings)
            .map_err(|e| PersistenceError::Write(e.to_string()))?;
        Ok(PendingSnapshot {
            contents,
            mirror: Arc::clone(&self.mirror),
        })
    }

    pub fn get(&self, mac_address: &str) -> Option<&Reading> {
        self.readings.get(mac_address)
    }

    /// Current readings in iteration order
    pub fn readings(&self) -> impl Iterator<Item = &Reading> {
        self.readings.values()
    }

    pub fn snapshot(&self) -> &DeviceMap {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Serialized store contents waiting to be written to the mirror
#[derive(Debug)]
pub struct PendingSnapshot {
    contents: String,
    mirror: Arc<dyn SnapshotStore>,
}

impl PendingSnapshot {
    /// Blocking write through the mirror
    pub fn write(self) -> Result<(), PersistenceError> {
        self.mirror.save(&self.contents)
    }

    /// Write on the blocking pool and wait for it to finish
    pub async fn write_blocking(self) -> Result<(), PersistenceError> {
        tokio::task::spawn_blocking(move || self.write())
            .await
            .map_err(|e| PersistenceError::Write(e.to_string()))?
    }
}
