//! # Sensor Reading
//!
//! One measurement flowing through the pipeline. The wire format is JSON with
//! camelCase field names; the aliases accepted on input cover the field names
//! older producers emit (`ID`, `Type`, `Timestamp`, ...). Unknown fields are
//! ignored.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{ReadingError, Recipient, StorageKey};

/// Enumerated sensor category. The value semantics depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum SensorType {
    /// Degrees Celsius.
    Temperature,
    /// Millimetres of mercury.
    Pressure,
    /// Relative humidity, percent.
    Humidity,
}

impl SensorType {
    pub const ALL: [SensorType; 3] = [SensorType::Temperature, SensorType::Pressure, SensorType::Humidity];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Temperature => "temperature",
            SensorType::Pressure => "pressure",
            SensorType::Humidity => "humidity",
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorType {
    type Err = ReadingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "temperature" => Ok(SensorType::Temperature),
            "pressure" => Ok(SensorType::Pressure),
            "humidity" => Ok(SensorType::Humidity),
            other => Err(ReadingError::UnknownSensorType(other.to_string())),
        }
    }
}

impl TryFrom<String> for SensorType {
    type Error = ReadingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// # Reading
///
/// A single sensor measurement addressed to one recipient.
///
/// `captured_at` is the logical production time in unix seconds, not the time
/// the reading was stored. `id` is unique per (sensor type, sequence) within a
/// producer; when a producer omits it, a deterministic fingerprint of the other
/// fields is used instead so that a redelivered message lands on the same
/// storage key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "WireReading")]
pub struct Reading {
    pub id: String,
    pub sensor_type: SensorType,
    pub value: f64,
    pub captured_at: i64,
    pub recipient: Recipient,
}

/// Input shape, tolerant of legacy field names and a missing id.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReading {
    #[serde(default, alias = "ID")]
    id: Option<String>,
    #[serde(alias = "type", alias = "Type")]
    sensor_type: SensorType,
    #[serde(alias = "Value")]
    value: f64,
    #[serde(alias = "timestamp", alias = "Timestamp")]
    captured_at: i64,
    #[serde(alias = "Recipient")]
    recipient: Recipient,
}

impl From<WireReading> for Reading {
    fn from(wire: WireReading) -> Self {
        match wire.id.filter(|id| !id.trim().is_empty()) {
            Some(id) => Reading {
                id,
                sensor_type: wire.sensor_type,
                value: wire.value,
                captured_at: wire.captured_at,
                recipient: wire.recipient,
            },
            None => Reading::new(wire.sensor_type, wire.value, wire.captured_at, wire.recipient),
        }
    }
}

impl Reading {
    /// Builds a reading whose id is the fingerprint of its contents.
    pub fn new(sensor_type: SensorType, value: f64, captured_at: i64, recipient: Recipient) -> Self {
        let id = fingerprint(sensor_type, value, captured_at, &recipient);
        Self {
            id,
            sensor_type,
            value,
            captured_at,
            recipient,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Decodes an inbound message body.
    pub fn from_json(body: &[u8]) -> Result<Self, ReadingError> {
        Ok(serde_json::from_slice(body)?)
    }

    pub fn to_json(&self) -> Result<String, ReadingError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The key this reading is stored under.
    pub fn storage_key(&self) -> StorageKey {
        StorageKey::for_reading(self)
    }
}

fn fingerprint(sensor_type: SensorType, value: f64, captured_at: i64, recipient: &Recipient) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sensor_type.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(value.to_bits().to_be_bytes());
    hasher.update(b"|");
    hasher.update(captured_at.to_be_bytes());
    hasher.update(b"|");
    hasher.update(recipient.as_str().as_bytes());
    let digest = hasher.finalize();
    format!("{}-{}", sensor_type, hex::encode(&digest[..8]))
}
