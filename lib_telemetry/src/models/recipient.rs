use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ReadingError;

/// Identity of the subscriber a reading is destined for.
///
/// Construction trims surrounding whitespace and rejects empty identifiers, so
/// every `Recipient` in the system is non-empty. Whether the recipient is
/// actually known is a routing question answered by
/// [`RecipientRegistry`](super::RecipientRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Recipient(String);

impl Recipient {
    pub fn new(id: impl AsRef<str>) -> Result<Self, ReadingError> {
        let trimmed = id.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ReadingError::EmptyRecipient);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Recipient {
    type Err = ReadingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Recipient {
    type Error = ReadingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Recipient> for String {
    fn from(value: Recipient) -> Self {
        value.0
    }
}
