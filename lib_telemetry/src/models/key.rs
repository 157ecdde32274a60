use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Reading, ReadingError, Recipient, SensorType};

const KEY_PREFIX: &str = "sensor";
const CHANNEL_PREFIX: &str = "new_data";
const INDEX_PREFIX: &str = "recent";

/// # Storage Key
///
/// Colon-delimited composite key `sensor:{type}:{id}:{captured_at}`.
///
/// Deterministic for a given reading, so writing the same reading twice
/// overwrites one entry instead of creating two. Ids may themselves contain colons;
/// parsing takes the type from the front and the timestamp from the back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageKey {
    sensor_type: SensorType,
    id: String,
    captured_at: i64,
}

impl StorageKey {
    pub fn for_reading(reading: &Reading) -> Self {
        Self {
            sensor_type: reading.sensor_type,
            id: reading.id.clone(),
            captured_at: reading.captured_at,
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", KEY_PREFIX, self.sensor_type, self.id, self.captured_at)
    }
}

impl FromStr for StorageKey {
    type Err = ReadingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ReadingError::MalformedKey(s.to_string());

        let rest = s
            .strip_prefix(KEY_PREFIX)
            .and_then(|r| r.strip_prefix(':'))
            .ok_or_else(malformed)?;
        let (sensor_type, rest) = rest.split_once(':').ok_or_else(malformed)?;
        let (id, captured_at) = rest.rsplit_once(':').ok_or_else(malformed)?;
        if id.is_empty() {
            return Err(malformed());
        }

        Ok(Self {
            sensor_type: sensor_type.parse().map_err(|_| malformed())?,
            id: id.to_string(),
            captured_at: captured_at.parse().map_err(|_| malformed())?,
        })
    }
}

impl TryFrom<String> for StorageKey {
    type Error = ReadingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StorageKey> for String {
    fn from(value: StorageKey) -> Self {
        value.to_string()
    }
}

/// Pub/sub channel announcing new keys for `recipient`.
pub fn notification_channel(recipient: &Recipient) -> String {
    format!("{}:{}", CHANNEL_PREFIX, recipient)
}

/// Sorted-set index of a recipient's keys, scored by capture time.
pub fn recent_index(recipient: &Recipient) -> String {
    format!("{}:{}", INDEX_PREFIX, recipient)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_and_parses_the_composite_key() {
        let reading = Reading::new(SensorType::Temperature, 21.5, 1_700_000_000, Recipient::new("R1").unwrap())
            .with_id("temperature-42");
        let key = reading.storage_key();
        assert_eq!(key.to_string(), "sensor:temperature:temperature-42:1700000000");

        let parsed: StorageKey = "sensor:temperature:temperature-42:1700000000".parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn ids_containing_colons_survive_parsing() {
        let key: StorageKey = "sensor:humidity:a:b:c:17".parse().unwrap();
        let reading = Reading::new(SensorType::Humidity, 50.0, 17, Recipient::new("R1").unwrap()).with_id("a:b:c");
        assert_eq!(key, StorageKey::for_reading(&reading));
        assert_eq!(key.to_string(), "sensor:humidity:a:b:c:17");
    }

    #[test]
    fn rejects_foreign_keys() {
        for bad in ["", "sensor", "sensor:temperature", "sensor:temperature::5", "sensor:wind:x:5", "other:temperature:x:5", "sensor:pressure:x:later"] {
            assert!(bad.parse::<StorageKey>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn channel_and_index_names() {
        let r = Recipient::new("User2").unwrap();
        assert_eq!(notification_channel(&r), "new_data:User2");
        assert_eq!(recent_index(&r), "recent:User2");
    }
}
