//! BDD test world for firewatch service

use std::sync::Arc;

use cucumber::World;
use firewatch::error::{NormalizationError, PersistenceError};
use firewatch::persistence::{FileSnapshotStore, MemorySnapshotStore};
use firewatch::projector::Projector;
use firewatch::reading::Reading;
use firewatch::session::{TelemetryEvent, TelemetrySession};
use firewatch::state::StateHandle;
use firewatch::store::DeviceStateStore;
use tokio::sync::broadcast;

#[derive(Debug, Default, World)]
pub struct FirewatchWorld {
    // Ingestion and store
    pub store: Option<DeviceStateStore>,
    pub memory_mirror: Option<Arc<MemorySnapshotStore>>,
    pub last_ingest: Option<Result<Option<Reading>, NormalizationError>>,
    pub last_upsert: Option<Result<(), PersistenceError>>,
    pub snapshot_before: Option<String>,
    pub mirror_before: Option<String>,

    // File-backed persistence
    pub data_dir: Option<tempfile::TempDir>,
    pub file_mirror: Option<Arc<FileSnapshotStore>>,
    pub hydrate_warning: Option<PersistenceError>,

    // Projection
    pub projector: Option<Projector>,

    // Session lifecycle
    pub session: Option<TelemetrySession>,
    pub events: Option<broadcast::Receiver<TelemetryEvent>>,
    pub received: Vec<TelemetryEvent>,
    pub processed_at_shutdown: Option<u64>,

    // Dashboard
    pub dashboard_state: Option<StateHandle>,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
}

impl FirewatchWorld {
    pub fn store(&self) -> &DeviceStateStore {
        self.store.as_ref().expect("store not set")
    }

    pub fn store_mut(&mut self) -> &mut DeviceStateStore {
        self.store.as_mut().expect("store not set")
    }

    pub fn projector(&self) -> Projector {
        self.projector.clone().unwrap_or_default()
    }
}
