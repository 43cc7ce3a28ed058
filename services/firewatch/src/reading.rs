//! Telemetry readings and payload normalization
//!
//! Devices publish loosely-typed JSON. Normalization turns one payload into a
//! [`Reading`], collapsing the smoke and flame sensor fields (and their legacy
//! spellings `MQ` / `Flame`) into a two-valued [`SensorStatus`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::NormalizationError;

/// Raw smoke sensor value that means smoke was detected.
pub const SMOKE_DETECTED: &str = "Terdeteksi";

/// Raw flame sensor value that means a flame was detected.
pub const FLAME_DETECTED: &str = "Api Terdeteksi";

/// Normalized state of a binary detector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorStatus {
    #[default]
    Aman,
    Terdeteksi,
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorStatus::Aman => write!(f, "Aman"),
            SensorStatus::Terdeteksi => write!(f, "Terdeteksi"),
        }
    }
}

/// Latest normalized telemetry snapshot of one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub mac_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub mq_status: SensorStatus,
    #[serde(default)]
    pub flame_status: SensorStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl Reading {
    /// A reading with only the key set and every sensor at its default.
    pub fn new(mac_address: impl Into<String>) -> Self {
        Self {
            mac_address: mac_address.into(),
            temperature: None,
            humidity: None,
            mq_status: SensorStatus::Aman,
            flame_status: SensorStatus::Aman,
            timestamp: None,
            latitude: None,
            longitude: None,
        }
    }
}

/// Parse and normalize one raw payload.
///
/// Returns `Ok(None)` when the payload has no usable `mac_address`: such
/// messages are filtered out, not treated as errors.
pub fn normalize(payload: &[u8]) -> Result<Option<Reading>, NormalizationError> {
    let value: Value =
        serde_json::from_slice(payload).map_err(|e| NormalizationError::Json(e.to_string()))?;
    let object = value.as_object().ok_or(NormalizationError::NotAnObject)?;

    let mac_address = match object.get("mac_address") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(mac)) if mac.is_empty() => return Ok(None),
        Some(Value::String(mac)) => mac.clone(),
        Some(_) => {
            return Err(NormalizationError::InvalidField {
                field: "mac_address",
                expected: "a string",
            })
        }
    };

    Ok(Some(Reading {
        mac_address,
        temperature: number_field(object, "temperature")?,
        humidity: number_field(object, "humidity")?,
        mq_status: status_field(object, "mq_status", "MQ", SMOKE_DETECTED),
        flame_status: status_field(object, "flame_status", "Flame", FLAME_DETECTED),
        timestamp: string_field(object, "timestamp")?,
        latitude: number_field(object, "latitude")?,
        longitude: number_field(object, "longitude")?,
    }))
}

/// Numbers may arrive as JSON numbers or as numeric strings.
fn number_field(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<f64>, NormalizationError> {
    let invalid = NormalizationError::InvalidField {
        field,
        expected: "a number",
    };
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or(invalid),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Some)
            .ok_or(invalid),
        Some(_) => Err(invalid),
    }
}

fn string_field(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, NormalizationError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(NormalizationError::InvalidField {
            field,
            expected: "a string",
        }),
    }
}

/// The primary field wins unless it is absent or falsy (null, false, zero,
/// or an empty string), in which case the legacy field is consulted. Anything other than
/// the exact detection literal is `Aman`.
fn status_field(
    object: &Map<String, Value>,
    primary: &str,
    legacy: &str,
    detected: &str,
) -> SensorStatus {
    let raw = [primary, legacy]
        .iter()
        .filter_map(|key| object.get(*key))
        .find(|value| is_set(value));

    match raw {
        Some(Value::String(s)) if s == detected => SensorStatus::Terdeteksi,
        _ => SensorStatus::Aman,
    }
}

fn is_set(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}
