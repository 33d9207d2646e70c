//! Class Schedule Models

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::serde_helpers::{self, hhmm};

/// Default slot length when the schedule omits it
pub const DEFAULT_SLOT_MINUTES: u32 = 60;

/// Instructor reference on a slot or record
///
/// Legacy documents store a bare name; newer ones store a profile object.
/// Both shapes are accepted at deserialization and nothing downstream
/// needs to care which one it got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Instructor {
    Profile {
        name: String,
        #[serde(default)]
        phone: Option<String>,
        #[serde(default, alias = "phoneLast4")]
        phone_last4: Option<String>,
    },
    LegacyName(String),
}

impl Instructor {
    pub fn name(&self) -> &str {
        match self {
            Instructor::Profile { name, .. } => name,
            Instructor::LegacyName(name) => name,
        }
    }

    /// Same person, regardless of representation
    pub fn same_as(&self, other: &Instructor) -> bool {
        self.name().trim() == other.name().trim()
    }
}

/// Slot status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    #[default]
    Normal,
    Cancelled,
}

/// One class in a day's schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSlot {
    /// Venue-local start time
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    /// Minutes
    #[serde(
        default = "serde_helpers::default_duration",
        deserialize_with = "serde_helpers::duration_or_default"
    )]
    pub duration: u32,
    pub title: String,
    #[serde(default)]
    pub instructor: Option<Instructor>,
    #[serde(default)]
    pub status: SlotStatus,
}

impl ClassSlot {
    pub fn new(time: NaiveTime, duration: u32, title: impl Into<String>) -> Self {
        Self {
            time,
            duration,
            title: title.into(),
            instructor: None,
            status: SlotStatus::Normal,
        }
    }

    pub fn with_instructor(mut self, instructor: Instructor) -> Self {
        self.instructor = Some(instructor);
        self
    }

    pub fn cancelled(mut self) -> Self {
        self.status = SlotStatus::Cancelled;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == SlotStatus::Cancelled
    }

    /// Start as minutes since midnight
    pub fn start_minute(&self) -> i64 {
        minute_of_day(self.time)
    }

    /// End (exclusive) as minutes since midnight; may exceed 24h
    pub fn end_minute(&self) -> i64 {
        self.start_minute() + i64::from(self.duration)
    }

    pub fn length(&self) -> Duration {
        Duration::minutes(i64::from(self.duration))
    }

    pub fn instructor_name(&self) -> Option<&str> {
        self.instructor.as_ref().map(Instructor::name)
    }
}

/// Schedule for one branch on one venue-local day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSchedule {
    pub branch_id: String,
    pub date: NaiveDate,
    pub slots: Vec<ClassSlot>,
}

/// Minutes since midnight (seconds truncated)
pub fn minute_of_day(time: NaiveTime) -> i64 {
    use chrono::Timelike;
    i64::from(time.hour()) * 60 + i64::from(time.minute())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instructor_accepts_both_shapes() {
        let legacy: Instructor = serde_json::from_str("\"Jiyoon\"").unwrap();
        let profile: Instructor =
            serde_json::from_str(r#"{"name":"Jiyoon","phone":"010-1234-5678","phoneLast4":"5678"}"#)
                .unwrap();

        assert_eq!(legacy, Instructor::LegacyName("Jiyoon".to_string()));
        assert_eq!(profile.name(), "Jiyoon");
        assert!(legacy.same_as(&profile));
    }

    #[test]
    fn test_slot_defaults() {
        let slot: ClassSlot =
            serde_json::from_str(r#"{"time":"09:30","duration":null,"title":"Flow"}"#).unwrap();
        assert_eq!(slot.duration, DEFAULT_SLOT_MINUTES);
        assert_eq!(slot.status, SlotStatus::Normal);
        assert_eq!(slot.start_minute(), 9 * 60 + 30);
        assert_eq!(slot.end_minute(), 10 * 60 + 30);

        let out = serde_json::to_value(&slot).unwrap();
        assert_eq!(out["time"], "09:30");
    }

    #[test]
    fn test_slot_rejects_bad_time() {
        let res: Result<ClassSlot, _> = serde_json::from_str(r#"{"time":"9h30","title":"Flow"}"#);
        assert!(res.is_err());
    }
}
