//! Member Model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Remaining credit balance (次数)
///
/// Unlimited memberships never run out; consuming from them is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credits {
    Unlimited,
    Remaining(i64),
}

impl Credits {
    /// Whether at least one session can be consumed
    pub fn has_balance(&self) -> bool {
        match self {
            Credits::Unlimited => true,
            Credits::Remaining(n) => *n > 0,
        }
    }

    /// Balance after consuming one session
    pub fn consumed(self) -> Self {
        match self {
            Credits::Unlimited => Credits::Unlimited,
            Credits::Remaining(n) => Credits::Remaining(n - 1),
        }
    }

    /// Balance after refunding one session
    pub fn refunded(self) -> Self {
        match self {
            Credits::Unlimited => Credits::Unlimited,
            Credits::Remaining(n) => Credits::Remaining(n + 1),
        }
    }

    /// Numeric balance, `None` for unlimited
    pub fn remaining(&self) -> Option<i64> {
        match self {
            Credits::Unlimited => None,
            Credits::Remaining(n) => Some(*n),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Credits::Unlimited)
    }
}

impl Default for Credits {
    fn default() -> Self {
        Credits::Remaining(0)
    }
}

/// When a queued membership term starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpcomingStart {
    /// Fixed start date
    On(NaiveDate),
    /// "To be determined": starts on the first check-in that needs it
    Tbd,
}

/// A queued future membership term (다음 회원권)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpcomingMembership {
    pub membership_type: String,
    pub start: UpcomingStart,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Term length used to derive `end_date` when a TBD term activates
    #[serde(default)]
    pub duration_months: Option<u32>,
    pub credits: Credits,
}

/// Member document
///
/// Owned by the member directory; the check-in engine only touches
/// `credits`, `attendance_count`, `streak`, `last_attendance`,
/// `upcoming_membership` (activation) and `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub membership_type: String,
    pub credits: Credits,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub upcoming_membership: Option<UpcomingMembership>,
    #[serde(default)]
    pub attendance_count: u32,
    #[serde(default)]
    pub streak: u32,
    /// Venue-local day of the last valid attendance
    #[serde(default)]
    pub last_attendance: Option<NaiveDate>,
    /// Optimistic concurrency token, bumped on every committed write
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Member {
    /// Minimal member with a limited balance (handy for imports and tests)
    pub fn new(id: impl Into<String>, name: impl Into<String>, credits: Credits) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            phone: None,
            membership_type: "general".to_string(),
            credits,
            start_date: None,
            end_date: None,
            upcoming_membership: None,
            attendance_count: 0,
            streak: 0,
            last_attendance: None,
            version: 0,
            updated_at: 0,
        }
    }
}
