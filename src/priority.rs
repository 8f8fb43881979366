use crate::error::{BoardError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Task priority levels mapped to the integers the server stores
/// Higher number = Higher priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Low = 1,
    #[default]
    Medium = 2,
    High = 3,
}

impl Priority {
    /// Parse a priority string (case insensitive)
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(BoardError::ValidationError(format!(
                "Invalid priority '{}'. Valid values: low, medium, high",
                s
            ))),
        }
    }

    /// Map a stored integer back to a level
    pub fn from_level(level: i64) -> Result<Self> {
        match level {
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            _ => Err(BoardError::ValidationError(format!(
                "Invalid priority level {}. Valid values: 1, 2, 3",
                level
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parse optional priority string
    pub fn parse_optional(s: Option<&str>) -> Result<Option<Self>> {
        s.map(Self::parse).transpose()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// The server hands back either the label or the stored integer.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPriority {
    Level(i64),
    Label(String),
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let parsed = match RawPriority::deserialize(deserializer)? {
            RawPriority::Level(level) => Priority::from_level(level),
            RawPriority::Label(label) => Priority::parse(&label),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}

/// `null` and missing both mean medium.
pub fn deserialize_nullable<'de, D>(deserializer: D) -> std::result::Result<Priority, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Priority>::deserialize(deserializer)?.unwrap_or_default())
}
