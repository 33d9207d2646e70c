//! Attendance Record Model

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::Instructor;
use crate::checkin::{DenialReason, SyncMode};

/// Final status of an attendance record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Valid,
    Denied,
}

/// Attendance record (출석 기록)
///
/// Written once by the engine. Only schedule correction may later rewrite
/// `class_name` / `instructor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub member_id: String,
    pub member_name: String,
    pub branch_id: String,
    /// Venue-local calendar day
    pub date: NaiveDate,
    /// Venue-local time of day of the event
    pub local_time: NaiveTime,
    /// Event instant (Unix millis)
    pub timestamp: i64,
    pub class_name: String,
    #[serde(default)]
    pub instructor: Option<Instructor>,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub denial_reason: Option<DenialReason>,
    #[serde(default)]
    pub is_multi_session: bool,
    #[serde(default = "one")]
    pub session_count: u32,
    #[serde(default)]
    pub sync_mode: SyncMode,
    /// Balance right after this record (None when unlimited)
    #[serde(default)]
    pub credits_after: Option<i64>,
    pub created_at: i64,
}

fn one() -> u32 {
    1
}

impl AttendanceRecord {
    pub fn is_valid(&self) -> bool {
        self.status == AttendanceStatus::Valid
    }

    pub fn instructor_name(&self) -> Option<&str> {
        self.instructor.as_ref().map(Instructor::name)
    }
}
