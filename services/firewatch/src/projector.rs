//! Pure derivation of display structures from the device state store

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, Utc};
use serde::Serialize;

use crate::config::{Config, Coordinate, MissingCoordinates};
use crate::reading::Reading;
use crate::store::DeviceStateStore;

const NOT_AVAILABLE: &str = "N/A";
const DISPLAY_FORMAT: &str = "%d/%m/%Y, %H.%M.%S";

/// Value shown on a card tile
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CardValue {
    Number(f64),
    Text(String),
}

/// One labelled tile of a device card
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardField {
    pub title: &'static str,
    pub value: CardValue,
    pub description: &'static str,
}

/// All tiles for one device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceCard {
    pub mac_address: String,
    pub heading: String,
    pub fields: Vec<CardField>,
}

impl DeviceCard {
    /// Look up a tile by its title
    pub fn field(&self, title: &str) -> Option<&CardValue> {
        self.fields.iter().find(|f| f.title == title).map(|f| &f.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopupLine {
    pub label: &'static str,
    pub value: String,
}

/// Map marker for one device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMarker {
    pub mac_address: String,
    pub position: Coordinate,
    pub title: String,
    pub popup: Vec<PopupLine>,
}

/// Derives cards, markers, and the map center.
///
/// Holds only presentation settings; every method is a pure function of the
/// store passed in.
#[derive(Debug, Clone)]
pub struct Projector {
    display_offset: FixedOffset,
    missing_coordinates: MissingCoordinates,
    fallback_coordinate: Coordinate,
    default_center: Coordinate,
}

impl Default for Projector {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Projector {
    pub fn from_config(config: &Config) -> Self {
        let offset_seconds = config.display.utc_offset_minutes.saturating_mul(60);
        let display_offset = FixedOffset::east_opt(offset_seconds).unwrap_or_else(|| {
            tracing::warn!(
                "Display offset of {} minutes is out of range, using UTC",
                config.display.utc_offset_minutes
            );
            Utc.fix()
        });

        Self {
            display_offset,
            missing_coordinates: config.map.missing_coordinates,
            fallback_coordinate: config.map.fallback_coordinate,
            default_center: config.map.default_center,
        }
    }

    /// One card per device, in store order
    pub fn project_cards(&self, store: &DeviceStateStore) -> Vec<DeviceCard> {
        store.readings().map(|r| self.card(r)).collect()
    }

    /// One marker per device; devices without a position follow the
    /// configured [`MissingCoordinates`] policy.
    pub fn project_markers(&self, store: &DeviceStateStore) -> Vec<MapMarker> {
        store
            .readings()
            .filter_map(|r| {
                let position = self.position(r)?;
                Some(MapMarker {
                    mac_address: r.mac_address.clone(),
                    position,
                    title: format!("Device {}", r.mac_address),
                    popup: vec![
                        PopupLine {
                            label: "MAC",
                            value: r.mac_address.clone(),
                        },
                        PopupLine {
                            label: "Suhu",
                            value: r
                                .temperature
                                .map(|t| t.to_string())
                                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                        },
                        PopupLine {
                            label: "Asap",
                            value: r.mq_status.to_string(),
                        },
                        PopupLine {
                            label: "Api",
                            value: r.flame_status.to_string(),
                        },
                    ],
                })
            })
            .collect()
    }

    /// The first device's position, or the default center for an empty store
    pub fn project_map_center(&self, store: &DeviceStateStore) -> Coordinate {
        match store.readings().next() {
            Some(first) => Coordinate::new(
                first
                    .latitude
                    .unwrap_or(self.fallback_coordinate.latitude),
                first
                    .longitude
                    .unwrap_or(self.fallback_coordinate.longitude),
            ),
            None => self.default_center,
        }
    }

    fn position(&self, reading: &Reading) -> Option<Coordinate> {
        match (reading.latitude, reading.longitude) {
            (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
            (lat, lon) => match self.missing_coordinates {
                MissingCoordinates::Skip => None,
                MissingCoordinates::Fallback => Some(Coordinate::new(
                    lat.unwrap_or(self.fallback_coordinate.latitude),
                    lon.unwrap_or(self.fallback_coordinate.longitude),
                )),
            },
        }
    }

    fn card(&self, r: &Reading) -> DeviceCard {
        DeviceCard {
            mac_address: r.mac_address.clone(),
            heading: format!("Perangkat: {}", r.mac_address),
            fields: vec![
                CardField {
                    title: "Temperature",
                    value: CardValue::Number(r.temperature.unwrap_or(0.0)),
                    description: "Temperatur dari sensor DHT",
                },
                CardField {
                    title: "Humidity",
                    value: CardValue::Number(r.humidity.unwrap_or(0.0)),
                    description: "Kelembaban dari sensor DHT",
                },
                CardField {
                    title: "MQ Status",
                    value: CardValue::Text(r.mq_status.to_string()),
                    description: "Status asap",
                },
                CardField {
                    title: "Flame Status",
                    value: CardValue::Text(r.flame_status.to_string()),
                    description: "Status api",
                },
                CardField {
                    title: "Timestamp",
                    value: CardValue::Text(self.format_timestamp(r.timestamp.as_deref())),
                    description: "Waktu input",
                },
                CardField {
                    title: "Mac Address",
                    value: CardValue::Text(r.mac_address.clone()),
                    description: "Identitas perangkat",
                },
            ],
        }
    }

    /// Render a source timestamp in the display offset.
    ///
    /// Zone-less timestamps are shown as-is; unparseable ones are passed
    /// through verbatim.
    pub fn format_timestamp(&self, timestamp: Option<&str>) -> String {
        let Some(raw) = timestamp else {
            return NOT_AVAILABLE.to_string();
        };

        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return parsed
                .with_timezone(&self.display_offset)
                .format(DISPLAY_FORMAT)
                .to_string();
        }

        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.format(DISPLAY_FORMAT).to_string())
            .unwrap_or_else(|| raw.to_string())
    }
}
