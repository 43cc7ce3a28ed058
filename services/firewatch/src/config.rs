//! Configuration types for the firewatch service

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// MQTT broker connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_url")]
    pub url: String,
    #[serde(default = "default_broker_username")]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Environment variable holding the password; takes precedence over `password`
    #[serde(default = "default_broker_password_env")]
    pub password_env: Option<String>,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
    #[serde(default = "default_reconnect_interval", with = "humantime_serde")]
    pub reconnect_interval: Duration,
    #[serde(default = "default_keep_alive", with = "humantime_serde")]
    pub keep_alive: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            username: default_broker_username(),
            password: None,
            password_env: default_broker_password_env(),
            topic: default_topic(),
            client_id_prefix: default_client_id_prefix(),
            reconnect_interval: default_reconnect_interval(),
            keep_alive: default_keep_alive(),
        }
    }
}

/// Where the device snapshot is mirrored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_slot")]
    pub slot: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: default_data_dir(),
            slot: default_slot(),
        }
    }
}

/// Channel sizing between transport, consumer, and event subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// A geographic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// What to do with devices that have not reported a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingCoordinates {
    /// Place the marker at the configured fallback coordinate
    #[default]
    Fallback,
    /// Leave the device off the map
    Skip,
}

/// Map projection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    #[serde(default)]
    pub missing_coordinates: MissingCoordinates,
    #[serde(default = "default_fallback_coordinate")]
    pub fallback_coordinate: Coordinate,
    #[serde(default = "default_center")]
    pub default_center: Coordinate,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            missing_coordinates: MissingCoordinates::default(),
            fallback_coordinate: default_fallback_coordinate(),
            default_center: default_center(),
        }
    }
}

/// Presentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Offset from UTC used when formatting timestamps on cards
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: default_utc_offset_minutes(),
        }
    }
}

/// Dashboard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_dashboard_port")]
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_dashboard_port(),
        }
    }
}

/// REST backend used by the management subcommands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    /// Environment variable holding the bearer token; takes precedence over `token`
    #[serde(default = "default_api_token_env")]
    pub token_env: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            token: None,
            token_env: default_api_token_env(),
        }
    }
}

impl Config {
    /// Fill secrets from the environment variables named in the config.
    ///
    /// A named variable that is unset leaves the inline value untouched.
    pub fn resolve_secrets(&mut self) -> crate::Result<()> {
        self.resolve_secrets_with(|name| std::env::var(name).ok())
    }

    pub fn resolve_secrets_with<F>(&mut self, lookup: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(var) = &self.broker.password_env {
            if let Some(value) = lookup(var) {
                tracing::debug!("Broker password taken from ${}", var);
                self.broker.password = Some(value);
            }
        }
        if let Some(var) = &self.api.token_env {
            if let Some(value) = lookup(var) {
                tracing::debug!("API token taken from ${}", var);
                self.api.token = Some(value);
            }
        }
        self.validate()
    }

    /// Reject values that would make the service misbehave at runtime
    pub fn validate(&self) -> crate::Result<()> {
        if self.broker.topic.is_empty() {
            return Err(crate::FirewatchError::Config(
                "broker.topic must not be empty".to_string(),
            ));
        }
        if self.broker.client_id_prefix.starts_with(char::is_whitespace) {
            return Err(crate::FirewatchError::Config(
                "broker.client_id_prefix must not start with whitespace".to_string(),
            ));
        }
        if self.broker.reconnect_interval.is_zero() {
            return Err(crate::FirewatchError::Config(
                "broker.reconnect_interval must be greater than zero".to_string(),
            ));
        }
        if !self.broker.keep_alive.is_zero() && self.broker.keep_alive < Duration::from_secs(1) {
            return Err(crate::FirewatchError::Config(
                "broker.keep_alive must be zero or at least one second".to_string(),
            ));
        }
        if self.session.channel_capacity == 0 || self.session.event_capacity == 0 {
            return Err(crate::FirewatchError::Config(
                "session channel capacities must be greater than zero".to_string(),
            ));
        }
        if self.persistence.enabled && self.persistence.slot.is_empty() {
            return Err(crate::FirewatchError::Config(
                "persistence.slot must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_broker_url() -> String {
    "wss://d7d8ee83.ala.asia-southeast1.emqxsl.com:8084/mqtt".to_string()
}

fn default_broker_username() -> String {
    "firedetect".to_string()
}

fn default_broker_password_env() -> Option<String> {
    Some("FIREWATCH_BROKER_PASSWORD".to_string())
}

fn default_topic() -> String {
    "fire_detector/#".to_string()
}

fn default_client_id_prefix() -> String {
    "firewatch".to_string()
}

fn default_reconnect_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(30)
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_slot() -> String {
    "sensorMapCache".to_string()
}

fn default_channel_capacity() -> usize {
    64
}

fn default_event_capacity() -> usize {
    256
}

fn default_fallback_coordinate() -> Coordinate {
    Coordinate::new(0.0, 0.0)
}

fn default_center() -> Coordinate {
    Coordinate::new(-5.434, 105.158)
}

fn default_utc_offset_minutes() -> i32 {
    7 * 60
}

fn default_true() -> bool {
    true
}

fn default_dashboard_port() -> u16 {
    11120
}

fn default_api_base_url() -> String {
    "https://api-damkar.psti-ubl.id".to_string()
}

fn default_api_token_env() -> Option<String> {
    Some("FIREWATCH_API_TOKEN".to_string())
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::FirewatchError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
