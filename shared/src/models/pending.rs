//! Pending (offline) check-in models

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::checkin::ResolvedClass;

/// Which queue tier holds a pending check-in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueTier {
    /// Persisted in the primary store
    Durable,
    /// In-process only; lost if the device dies before the next sync
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    #[default]
    PendingOffline,
}

/// A check-in captured while the live path was unreachable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCheckIn {
    pub id: String,
    pub member_id: String,
    pub branch_id: String,
    /// Venue-local day of the original event
    pub date: NaiveDate,
    pub local_time: NaiveTime,
    /// Original event instant (Unix millis), replayed as-is
    pub occurred_at: i64,
    /// Class attribution at capture time
    pub class: ResolvedClass,
    #[serde(default)]
    pub status: PendingStatus,
    pub tier: QueueTier,
    pub queued_at: i64,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Pending check-in that exhausted its retries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub pending: PendingCheckIn,
    pub failed_at: i64,
    pub last_error: String,
}
