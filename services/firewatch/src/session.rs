//! Telemetry session: wires the transport to the device store
//!
//! The transport task only pushes [`TransportEvent`]s into a bounded channel.
//! A single consumer task drains it, so every message is parsed, normalized,
//! stored, and mirrored before the next one is looked at.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{FirewatchError, NormalizationError, Result};
use crate::persistence::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
use crate::reading::Reading;
use crate::state::{new_state_handle, BannerKind, ConnectionState, StateHandle};
use crate::store::DeviceStateStore;
use crate::transport::{MqttTransport, Transport, TransportEvent};

/// Notification published to session subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Connected,
    TransportFailed(String),
    ReadingStored(Reading),
    MessageFiltered {
        topic: String,
    },
    NormalizationFailed {
        topic: String,
        error: NormalizationError,
    },
    PersistenceFailed(String),
}

/// Builder for [`TelemetrySession`]
pub struct SessionBuilder {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
    snapshot_store: Option<Arc<dyn SnapshotStore>>,
    cancel: Option<CancellationToken>,
}

impl SessionBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transport: None,
            snapshot_store: None,
            cancel: None,
        }
    }

    /// Use this transport instead of connecting to the configured broker
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use this snapshot store instead of the configured data directory
    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshot_store = Some(store);
        self
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub async fn build(self) -> Result<TelemetrySession> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(MqttTransport::new(&self.config.broker)?) as Arc<dyn Transport>,
        };

        let snapshot_store = match self.snapshot_store {
            Some(store) => store,
            None if self.config.persistence.enabled => Arc::new(FileSnapshotStore::new(
                &self.config.persistence.data_dir,
                &self.config.persistence.slot,
            )) as Arc<dyn SnapshotStore>,
            None => {
                tracing::info!("Persistence disabled, device snapshot kept in memory only");
                Arc::new(MemorySnapshotStore::new()) as Arc<dyn SnapshotStore>
            }
        };

        let (events, _) = broadcast::channel(self.config.session.event_capacity);

        tracing::debug!(
            "Built session for {} mirroring to {}",
            transport.describe(),
            snapshot_store.location()
        );

        Ok(TelemetrySession {
            state: new_state_handle(DeviceStateStore::new(Arc::clone(&snapshot_store))),
            transport,
            snapshot_store,
            events,
            channel_capacity: self.config.session.channel_capacity,
            cancel: self.cancel.unwrap_or_default(),
            tasks: Vec::new(),
        })
    }
}

/// A running (or ready to run) telemetry pipeline
#[derive(Debug)]
pub struct TelemetrySession {
    state: StateHandle,
    transport: Arc<dyn Transport>,
    snapshot_store: Arc<dyn SnapshotStore>,
    events: broadcast::Sender<TelemetryEvent>,
    channel_capacity: usize,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl TelemetrySession {
    pub fn state(&self) -> StateHandle {
        Arc::clone(&self.state)
    }

    /// Receive every event published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.events.subscribe()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Hydrate the store from its mirror, then spawn the transport and consumer
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(FirewatchError::InvalidInput(
                "session already started".to_string(),
            ));
        }

        let (store, warning) = DeviceStateStore::hydrate(Arc::clone(&self.snapshot_store));
        {
            let mut state = self.state.write().await;
            state.store = store;
            state.connection = ConnectionState::Connecting;
            if let Some(warning) = &warning {
                tracing::warn!("Starting with an empty device store: {}", warning);
                state.raise(BannerKind::Persistence, warning.to_string(), current_epoch_ms());
            }
        }
        if let Some(warning) = warning {
            publish(&self.events, TelemetryEvent::PersistenceFailed(warning.to_string()));
        }

        let (tx, rx) = mpsc::channel(self.channel_capacity);

        let transport = Arc::clone(&self.transport);
        let cancel = self.cancel.clone();
        self.tasks.push(tokio::spawn(async move {
            transport.run(tx, cancel).await;
        }));

        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let cancel = self.cancel.clone();
        self.tasks.push(tokio::spawn(async move {
            consume(rx, state, events, cancel).await;
        }));

        tracing::info!("Telemetry session started on {}", self.transport.describe());
        Ok(())
    }

    /// Stop both tasks. Once this returns no further message is processed.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!("Session task ended abnormally: {}", e);
            }
        }
        self.state.write().await.connection = ConnectionState::Disconnected;
        tracing::info!("Telemetry session stopped");
    }
}

async fn consume(
    mut rx: mpsc::Receiver<TransportEvent>,
    state: StateHandle,
    events: broadcast::Sender<TelemetryEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Consumer cancelled");
                break;
            }
            received = rx.recv() => match received {
                Some(event) => event,
                None => {
                    tracing::debug!("Transport channel closed");
                    break;
                }
            },
        };

        for outcome in process_event(&state, event, current_epoch_ms()).await {
            publish(&events, outcome);
        }
    }
}

fn publish(events: &broadcast::Sender<TelemetryEvent>, event: TelemetryEvent) {
    // No subscribers is not an error.
    let _ = events.send(event);
}

/// Apply one transport event to the shared state.
///
/// Returns the events to publish, in order.
pub async fn process_event(
    handle: &StateHandle,
    event: TransportEvent,
    now_ms: u64,
) -> Vec<TelemetryEvent> {
    let mut state = handle.write().await;

    match event {
        TransportEvent::Connected => {
            state.connection = ConnectionState::Connected;
            vec![TelemetryEvent::Connected]
        }
        TransportEvent::Error(error) => {
            state.connection = ConnectionState::Reconnecting;
            let message = error.to_string();
            state.raise(BannerKind::Transport, message.clone(), now_ms);
            vec![TelemetryEvent::TransportFailed(message)]
        }
        TransportEvent::Message { topic, payload } => {
            state.record_message(now_ms);

            let reading = match DeviceStateStore::ingest(&payload) {
                Ok(Some(reading)) => reading,
                Ok(None) => {
                    tracing::debug!("Filtered message without mac_address on '{}'", topic);
                    return vec![TelemetryEvent::MessageFiltered { topic }];
                }
                Err(error) => {
                    tracing::warn!("Dropped malformed message on '{}': {}", topic, error);
                    state.raise(
                        BannerKind::Normalization,
                        format!("Malformed message on {}: {}", topic, error),
                        now_ms,
                    );
                    return vec![TelemetryEvent::NormalizationFailed { topic, error }];
                }
            };

            tracing::debug!("Reading from {} on '{}'", reading.mac_address, topic);
            let stored = reading.clone();
            let staged = state.store.stage(reading);
            state.clear_banner();
            drop(state);

            // The consumer waits for the write, so mirror writes stay in
            // message order while dashboard readers are not blocked.
            let persisted = match staged {
                Ok(pending) => pending.write_blocking().await,
                Err(e) => Err(e),
            };

            let mut outcome = vec![TelemetryEvent::ReadingStored(stored)];
            if let Err(e) = persisted {
                tracing::warn!("Device snapshot not mirrored: {}", e);
                handle
                    .write()
                    .await
                    .raise(BannerKind::Persistence, e.to_string(), now_ms);
                outcome.push(TelemetryEvent::PersistenceFailed(e.to_string()));
            }
            outcome
        }
    }
}

pub fn current_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
