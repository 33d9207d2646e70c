//! Serde helpers for schedule fields
//!
//! Slot times travel as venue-local `"HH:MM"` strings.

use chrono::NaiveTime;
use serde::{Deserialize, Deserializer, Serializer};

/// `NaiveTime` <-> `"HH:MM"` (seconds are accepted on input and dropped)
pub mod hhmm {
    use super::*;

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    /// Parse `"HH:MM"` or `"HH:MM:SS"`
    pub fn parse(raw: &str) -> Result<NaiveTime, String> {
        let trimmed = raw.trim();
        NaiveTime::parse_from_str(trimmed, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
            .map_err(|_| format!("invalid slot time: {}", raw))
    }
}

/// Slot duration that treats null/missing as 60 minutes
pub fn duration_or_default<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u32>::deserialize(deserializer).map(|opt| opt.unwrap_or(super::DEFAULT_SLOT_MINUTES))
}

pub fn default_duration() -> u32 {
    super::DEFAULT_SLOT_MINUTES
}
