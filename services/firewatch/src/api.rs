//! Client for the device/user management REST backend

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use crate::config::ApiConfig;
use crate::error::{FirewatchError, Result};
use crate::io::{HttpClient, HttpResponse};
use crate::reading::FLAME_DETECTED;

/// A registered detector as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub mac_address: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub email_damkar: Option<String>,
    #[serde(default)]
    pub email_user: Option<String>,
}

/// Fields for registering a new detector
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRegistration {
    pub mac_address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub email_damkar: String,
    pub email_user: String,
}

/// Fields for updating a detector; `email_user` is left untouched when `None`
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceUpdate {
    pub latitude: f64,
    pub longitude: f64,
    pub email_damkar: String,
    pub email_user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub email: String,
    pub lokasi: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub mac_address: Vec<String>,
}

/// One stored telemetry row from the history endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub humidity: Option<f64>,
    #[serde(default, rename = "MQ")]
    pub mq: Option<String>,
    #[serde(default, rename = "Flame")]
    pub flame: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryEnvelope {
    #[serde(default)]
    data: Option<Vec<HistoryRecord>>,
}

/// Time window accepted by the history endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum HistoryRange {
    Today,
    Yesterday,
    LastWeek,
    LastMonth,
}

impl HistoryRange {
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryRange::Today => "today",
            HistoryRange::Yesterday => "yesterday",
            HistoryRange::LastWeek => "last_week",
            HistoryRange::LastMonth => "last_month",
        }
    }
}

impl fmt::Display for HistoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numbers sometimes arrive as strings; accept both
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => Ok(n.as_f64()),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a number, got {}",
            other
        ))),
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(FirewatchError::InvalidInput(format!(
            "{} must not be empty",
            field
        )));
    }
    Ok(())
}

fn require_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !latitude.is_finite() || !longitude.is_finite() {
        return Err(FirewatchError::InvalidInput(
            "latitude and longitude must be numbers".to_string(),
        ));
    }
    Ok(())
}

fn check(response: HttpResponse) -> Result<HttpResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(FirewatchError::Api {
            status: response.status,
            body: response.body,
        })
    }
}

/// Keep only rows where a flame was detected
pub fn flame_detections(records: &[HistoryRecord]) -> Vec<HistoryRecord> {
    records
        .iter()
        .filter(|r| r.flame.as_deref() == Some(FLAME_DETECTED))
        .cloned()
        .collect()
}

/// REST backend client
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl ApiClient {
    pub fn new(config: &ApiConfig, http: Arc<dyn HttpClient>) -> Self {
        tracing::debug!("Created ApiClient for {}", config.base_url);
        Self {
            base_url: config.base_url.clone(),
            token: config.token.clone(),
            http,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.base_url).map_err(|e| {
            FirewatchError::Config(format!("Invalid API base URL '{}': {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                FirewatchError::Config(format!("API base URL '{}' cannot take a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn bearer(&self) -> Result<String> {
        match &self.token {
            Some(token) if !token.is_empty() => Ok(format!("Bearer {}", token)),
            _ => Err(FirewatchError::Config(
                "No API token configured; log in first or set api.token".to_string(),
            )),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: url::Url) -> Result<T> {
        let bearer = self.bearer()?;
        let response = check(
            self.http
                .get(url.as_str(), &[("Authorization", bearer.as_str())])
                .await?,
        )?;
        Ok(serde_json::from_str(&response.body)?)
    }

    /// Exchange credentials for a bearer token
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        require("email", email)?;
        require("password", password)?;

        let url = self.endpoint(&["users", "login"])?;
        let body = serde_json::json!({ "email": email, "password": password }).to_string();
        let response = check(self.http.post_json(url.as_str(), &[], &body).await?)?;

        let login: LoginResponse = serde_json::from_str(&response.body)?;
        if login.token.is_empty() {
            return Err(FirewatchError::Api {
                status: response.status,
                body: "login response carried no token".to_string(),
            });
        }
        tracing::info!("Logged in as {} (role '{}')", email, login.role);
        Ok(login)
    }

    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        let devices: Option<Vec<Device>> = self.get_json(self.endpoint(&["devices"])?).await?;
        Ok(devices.unwrap_or_default())
    }

    /// Devices assigned to one fire brigade account
    pub async fn devices_for_damkar(&self, email: &str) -> Result<Vec<Device>> {
        require("email", email)?;
        let devices: Option<Vec<Device>> = self
            .get_json(self.endpoint(&["damkar", email.trim(), "devices"])?)
            .await?;
        Ok(devices.unwrap_or_default())
    }

    pub async fn register_device(&self, registration: &DeviceRegistration) -> Result<()> {
        require("mac_address", &registration.mac_address)?;
        require("email_damkar", &registration.email_damkar)?;
        require("email_user", &registration.email_user)?;
        require_coordinates(registration.latitude, registration.longitude)?;

        let bearer = self.bearer()?;
        let url = self.endpoint(&["devices", "register"])?;
        let latitude = registration.latitude.to_string();
        let longitude = registration.longitude.to_string();
        let params = [
            ("latitude", latitude.as_str()),
            ("longitude", longitude.as_str()),
            ("email_damkar", registration.email_damkar.trim()),
            ("email_user", registration.email_user.trim()),
            ("mac_address", registration.mac_address.trim()),
        ];

        check(
            self.http
                .post_form(url.as_str(), &[("Authorization", bearer.as_str())], &params)
                .await?,
        )?;
        tracing::info!("Registered device {}", registration.mac_address.trim());
        Ok(())
    }

    pub async fn update_device(&self, mac_address: &str, update: &DeviceUpdate) -> Result<()> {
        require("mac_address", mac_address)?;
        require("email_damkar", &update.email_damkar)?;
        require_coordinates(update.latitude, update.longitude)?;

        let bearer = self.bearer()?;
        let url = self.endpoint(&["devices", mac_address.trim()])?;
        let latitude = update.latitude.to_string();
        let longitude = update.longitude.to_string();
        let mut params = vec![
            ("latitude", latitude.as_str()),
            ("longitude", longitude.as_str()),
            ("email_damkar", update.email_damkar.trim()),
        ];
        if let Some(email_user) = &update.email_user {
            params.push(("email_user", email_user.trim()));
        }

        check(
            self.http
                .put_form(url.as_str(), &[("Authorization", bearer.as_str())], &params)
                .await?,
        )?;
        tracing::info!("Updated device {}", mac_address.trim());
        Ok(())
    }

    pub async fn delete_device(&self, mac_address: &str) -> Result<()> {
        require("mac_address", mac_address)?;
        let bearer = self.bearer()?;
        let url = self.endpoint(&["devices", mac_address.trim()])?;
        check(
            self.http
                .delete(url.as_str(), &[("Authorization", bearer.as_str())])
                .await?,
        )?;
        tracing::info!("Deleted device {}", mac_address.trim());
        Ok(())
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let users: Option<Vec<User>> = self.get_json(self.endpoint(&["users"])?).await?;
        Ok(users.unwrap_or_default())
    }

    fn validate_user(user: &User) -> Result<()> {
        require("username", &user.username)?;
        require("email", &user.email)?;
        require("lokasi", &user.lokasi)
    }

    pub async fn register_user(&self, user: &User) -> Result<()> {
        Self::validate_user(user)?;
        let bearer = self.bearer()?;
        let url = self.endpoint(&["users", "register"])?;
        let body = serde_json::to_string(user)?;
        check(
            self.http
                .post_json(url.as_str(), &[("Authorization", bearer.as_str())], &body)
                .await?,
        )?;
        tracing::info!("Registered user {}", user.email);
        Ok(())
    }

    /// Update the user currently known as `email`
    pub async fn update_user(&self, email: &str, user: &User) -> Result<()> {
        require("email", email)?;
        Self::validate_user(user)?;
        let bearer = self.bearer()?;
        let url = self.endpoint(&["users", email.trim()])?;
        let body = serde_json::to_string(user)?;
        check(
            self.http
                .put_json(url.as_str(), &[("Authorization", bearer.as_str())], &body)
                .await?,
        )?;
        tracing::info!("Updated user {}", email.trim());
        Ok(())
    }

    pub async fn delete_user(&self, email: &str) -> Result<()> {
        require("email", email)?;
        let bearer = self.bearer()?;
        let url = self.endpoint(&["users", email.trim()])?;
        check(
            self.http
                .delete(url.as_str(), &[("Authorization", bearer.as_str())])
                .await?,
        )?;
        tracing::info!("Deleted user {}", email.trim());
        Ok(())
    }

    /// Stored telemetry for one device, optionally limited to a time window
    pub async fn sensor_history(
        &self,
        mac_address: &str,
        range: Option<HistoryRange>,
    ) -> Result<Vec<HistoryRecord>> {
        require("mac_address", mac_address)?;
        let mut url = self.endpoint(&["sensor", "history", mac_address.trim()])?;
        if let Some(range) = range {
            url.query_pairs_mut().append_pair("range", range.as_str());
        }

        let envelope: HistoryEnvelope = self.get_json(url).await?;
        let records = envelope.data.unwrap_or_default();
        tracing::debug!("History for {}: {} record(s)", mac_address.trim(), records.len());
        Ok(records)
    }
}
