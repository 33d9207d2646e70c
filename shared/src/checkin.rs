//! Check-in wire types
//!
//! Outcomes, statuses and reports exchanged between kiosks and the
//! check-in engine.

use serde::{Deserialize, Serialize};

use crate::models::{ClassSlot, Instructor, Member};

/// Class name recorded when no scheduled slot matches
pub const SELF_PRACTICE: &str = "Self-Practice";

/// Why a check-in was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    Expired,
    NoCredits,
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenialReason::Expired => write!(f, "expired"),
            DenialReason::NoCredits => write!(f, "no_credits"),
        }
    }
}

/// How an attendance record was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Live,
    OfflineQueued,
    Manual,
}

/// Result status of a check-in attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    /// Committed: credit consumed, record written
    Valid,
    /// Membership expired or out of credits
    Denied,
    /// Already checked in today and `force` was not set
    Duplicate,
    /// Live path unreachable; accepted into the offline queue
    Queued,
}

/// Which resolver rule picked the class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveReason {
    Upcoming,
    InProgress,
    NextClassLookAhead,
    EarlyBird,
    PostClassGrace,
    /// Picked by an explicit class hint from the kiosk
    Hinted,
    NoneMatched,
}

/// Class attribution for a check-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedClass {
    pub slot: Option<ClassSlot>,
    pub reason: ResolveReason,
}

impl ResolvedClass {
    pub fn matched(slot: ClassSlot, reason: ResolveReason) -> Self {
        Self {
            slot: Some(slot),
            reason,
        }
    }

    pub fn self_practice() -> Self {
        Self {
            slot: None,
            reason: ResolveReason::NoneMatched,
        }
    }

    pub fn is_self_practice(&self) -> bool {
        self.slot.is_none()
    }

    pub fn class_name(&self) -> &str {
        self.slot.as_ref().map(|s| s.title.as_str()).unwrap_or(SELF_PRACTICE)
    }

    pub fn instructor(&self) -> Option<&Instructor> {
        self.slot.as_ref().and_then(|s| s.instructor.as_ref())
    }
}

/// Kiosk check-in request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInRequest {
    pub member_id: String,
    pub branch_id: String,
    /// Slot title chosen at the kiosk; resolved from the schedule when absent
    #[serde(default)]
    pub class_hint: Option<String>,
    /// Record an additional same-day session
    #[serde(default)]
    pub force: bool,
}

/// Response of `CheckIn`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInOutcome {
    pub success: bool,
    pub status: CheckInStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial_reason: Option<DenialReason>,
    /// Member snapshot after the attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member: Option<Member>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    /// 1 for the first session of the day, 2+ for forced extra sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_count: Option<u32>,
    pub class_name: String,
    pub sync_mode: SyncMode,
}

impl CheckInOutcome {
    pub fn valid(member: Member, record_id: String, session_count: u32, class_name: String, sync_mode: SyncMode) -> Self {
        Self {
            success: true,
            status: CheckInStatus::Valid,
            denial_reason: None,
            member: Some(member),
            record_id: Some(record_id),
            session_count: Some(session_count),
            class_name,
            sync_mode,
        }
    }

    pub fn denied(member: Member, reason: DenialReason, record_id: Option<String>, class_name: String, sync_mode: SyncMode) -> Self {
        Self {
            success: false,
            status: CheckInStatus::Denied,
            denial_reason: Some(reason),
            member: Some(member),
            record_id,
            session_count: None,
            class_name,
            sync_mode,
        }
    }

    pub fn duplicate(member: Member, prior_sessions: u32, class_name: String, sync_mode: SyncMode) -> Self {
        Self {
            success: false,
            status: CheckInStatus::Duplicate,
            denial_reason: None,
            member: Some(member),
            record_id: None,
            session_count: Some(prior_sessions),
            class_name,
            sync_mode,
        }
    }

    pub fn queued(member: Member, pending_id: String, class_name: String) -> Self {
        Self {
            success: true,
            status: CheckInStatus::Queued,
            denial_reason: None,
            member: Some(member),
            record_id: Some(pending_id),
            session_count: None,
            class_name,
            sync_mode: SyncMode::OfflineQueued,
        }
    }

    /// Credits left in the returned snapshot (None when unlimited or absent)
    pub fn remaining_credits(&self) -> Option<i64> {
        self.member.as_ref().and_then(|m| m.credits.remaining())
    }
}

/// Response of `SyncPending`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Replayed and committed
    pub synced: usize,
    /// Dropped: superseded by a real record, or orphaned
    pub discarded: usize,
    /// Replayed but the member was no longer eligible
    pub denied: usize,
    /// Retryable failure, kept for the next run
    pub failed: usize,
    /// Gave up after max retries
    pub dead_lettered: usize,
    /// Still pending after this run (both tiers)
    pub remaining: usize,
}

impl SyncReport {
    pub fn processed(&self) -> usize {
        self.synced + self.discarded + self.denied
    }
}
