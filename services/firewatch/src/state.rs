//! Shared state for the device store, connection status, and error banner

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::store::DeviceStateStore;

/// Broker connection status as seen by the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Reconnecting => write!(f, "Reconnecting"),
            ConnectionState::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// Category of the condition shown in the banner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerKind {
    Transport,
    Normalization,
    Persistence,
}

/// Most recent unresolved condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBanner {
    pub kind: BannerKind,
    pub message: String,
    pub raised_epoch_ms: u64,
}

/// Shared state accessible by the session consumer and the dashboard
#[derive(Debug)]
pub struct SharedState {
    pub store: DeviceStateStore,
    pub connection: ConnectionState,
    pub banner: Option<StatusBanner>,
    pub messages_processed: u64,
    pub last_message_epoch_ms: Option<u64>,
    pub started_at: Instant,
}

impl SharedState {
    pub fn new(store: DeviceStateStore) -> Self {
        Self {
            store,
            connection: ConnectionState::Connecting,
            banner: None,
            messages_processed: 0,
            last_message_epoch_ms: None,
            started_at: Instant::now(),
        }
    }

    /// Replace the banner with a newer condition
    pub fn raise(&mut self, kind: BannerKind, message: impl Into<String>, now_ms: u64) {
        self.banner = Some(StatusBanner {
            kind,
            message: message.into(),
            raised_epoch_ms: now_ms,
        });
    }

    /// Clear the banner, returning true if one was showing
    pub fn clear_banner(&mut self) -> bool {
        self.banner.take().is_some()
    }

    /// Record an inbound message, whatever its outcome
    pub fn record_message(&mut self, now_ms: u64) {
        self.messages_processed += 1;
        self.last_message_epoch_ms = Some(now_ms);
    }
}

/// Thread-safe shared state handle
pub type StateHandle = Arc<RwLock<SharedState>>;

pub fn new_state_handle(store: DeviceStateStore) -> StateHandle {
    Arc::new(RwLock::new(SharedState::new(store)))
}
