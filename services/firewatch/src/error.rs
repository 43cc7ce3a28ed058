//! Error types for the firewatch service

/// Errors that can occur in the firewatch service
#[derive(Debug, thiserror::Error)]
pub enum FirewatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Dashboard error: {0}")]
    Dashboard(String),
}

/// Broker connection failures. Recovered by reconnecting, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid broker URL '{url}': {reason}")]
    InvalidBrokerUrl { url: String, reason: String },

    #[error("Connection to broker failed: {0}")]
    Connection(String),

    #[error("Subscription to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },
}

/// A telemetry payload that could not be turned into a reading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizationError {
    #[error("Payload is not valid JSON: {0}")]
    Json(String),

    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("Field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

/// Failures reading or writing the persisted snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    #[error("No persisted snapshot at {0}")]
    NotFound(String),

    #[error("Failed to read snapshot: {0}")]
    Read(String),

    #[error("Failed to write snapshot: {0}")]
    Write(String),

    #[error("Persisted snapshot is malformed: {0}")]
    Malformed(String),
}

/// Result type alias for firewatch operations
pub type Result<T> = std::result::Result<T, FirewatchError>;
