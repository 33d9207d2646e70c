//! Check-In Transaction Engine
//!
//! Turns a resolved check-in into either a committed credit-consuming
//! attendance record or a denied / duplicate outcome.
//!
//! ```text
//! read member + today's sessions ──► decide ──► commit_session(expected_version)
//!        ▲                                              │
//!        └────────── VersionConflict (≤ 5 attempts) ◄───┘
//! ```
//!
//! The conditional write scopes contention to one member document:
//! check-ins for different members never conflict, and two concurrent
//! check-ins for the same member cannot both spend the same credit.
//!
//! Every command carries a `request_id`. The commit records it in the
//! same write transaction, so a retry of a request whose first attempt
//! already committed (e.g. after the caller timed out) gets the original
//! outcome back instead of spending a second credit.
//!
//! Events are published only after the redb commit returns.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use shared::models::{AttendanceRecord, AttendanceStatus, ClassSlot, Member, PendingCheckIn};
use shared::{CheckInOutcome, ResolvedClass, SyncMode};
use tokio::sync::broadcast;

use super::correction;
use super::error::{CheckInError, CheckInResult};
use super::events::AttendanceEvent;
use super::membership;
use super::storage::{AttendanceStorage, StorageError};
use crate::utils::time::venue_local;

/// Read-decide-write attempts before giving up on a contended member
const MAX_CONFLICT_RETRIES: u32 = 5;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// One check-in to execute
#[derive(Debug, Clone)]
pub struct CheckInCommand {
    /// Stable across retries of one tap; a replay uses its pending id
    pub request_id: String,
    pub member_id: String,
    pub branch_id: String,
    pub class: ResolvedClass,
    /// Record an additional same-day session instead of reporting a duplicate
    pub force: bool,
    /// Event instant; the venue-local day is derived from it
    pub occurred_at: DateTime<Utc>,
    pub sync_mode: SyncMode,
}

impl CheckInCommand {
    /// Live check-in with a fresh request id
    pub fn live(member_id: String, branch_id: String, class: ResolvedClass, force: bool, occurred_at: DateTime<Utc>) -> Self {
        Self {
            request_id: shared::util::new_id(),
            member_id,
            branch_id,
            class,
            force,
            occurred_at,
            sync_mode: SyncMode::Live,
        }
    }

    /// Replay of a pending check-in at its original instant (never forced)
    ///
    /// `None` when the stored instant is out of range; such an entry cannot
    /// be attributed to a day.
    pub fn replay(pending: &PendingCheckIn) -> Option<Self> {
        let occurred_at = DateTime::from_timestamp_millis(pending.occurred_at)?;
        Some(Self {
            request_id: pending.id.clone(),
            member_id: pending.member_id.clone(),
            branch_id: pending.branch_id.clone(),
            class: pending.class.clone(),
            force: false,
            occurred_at,
            sync_mode: SyncMode::OfflineQueued,
        })
    }
}

/// Live check-in path as seen by callers that bound it with a timeout
///
/// Implemented by [`CheckInEngine`]; tests substitute failing gateways to
/// drive the offline path.
#[async_trait]
pub trait CheckInGateway: Send + Sync {
    async fn check_in(&self, cmd: CheckInCommand) -> CheckInResult<CheckInOutcome>;
}

#[derive(Clone)]
pub struct CheckInEngine {
    storage: AttendanceStorage,
    tz: Tz,
    event_tx: broadcast::Sender<AttendanceEvent>,
}

impl std::fmt::Debug for CheckInEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckInEngine")
            .field("tz", &self.tz)
            .field("subscribers", &self.event_tx.receiver_count())
            .finish_non_exhaustive()
    }
}

impl CheckInEngine {
    pub fn new(storage: AttendanceStorage, tz: Tz) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            storage,
            tz,
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AttendanceEvent> {
        self.event_tx.subscribe()
    }

    pub fn storage(&self) -> &AttendanceStorage {
        &self.storage
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Execute a check-in, retrying on concurrent member updates
    pub fn execute(&self, cmd: &CheckInCommand) -> CheckInResult<CheckInOutcome> {
        let (date, local_time) = venue_local(cmd.occurred_at, self.tz);

        for attempt in 1..=MAX_CONFLICT_RETRIES {
            match self.try_check_in(cmd, date, local_time) {
                Err(CheckInError::Storage(StorageError::VersionConflict { expected, found, .. })) => {
                    tracing::debug!(
                        member_id = %cmd.member_id,
                        attempt,
                        expected,
                        found,
                        "Member changed during check-in, retrying"
                    );
                }
                Err(CheckInError::Storage(StorageError::RequestCommitted { request_id, record_id })) => {
                    // Another attempt of this request won; the next pass returns its outcome
                    tracing::debug!(request_id = %request_id, record_id = %record_id, attempt, "Check-in request already committed");
                }
                Err(CheckInError::Storage(StorageError::MemberNotFound(id))) => {
                    return Err(CheckInError::MemberNotFound(id));
                }
                other => return other,
            }
        }

        tracing::warn!(
            member_id = %cmd.member_id,
            attempts = MAX_CONFLICT_RETRIES,
            "Check-in gave up after repeated version conflicts"
        );
        Err(CheckInError::Contended(cmd.member_id.clone()))
    }

    fn try_check_in(
        &self,
        cmd: &CheckInCommand,
        date: NaiveDate,
        local_time: NaiveTime,
    ) -> CheckInResult<CheckInOutcome> {
        let member = self
            .storage
            .get_member(&cmd.member_id)?
            .ok_or_else(|| CheckInError::MemberNotFound(cmd.member_id.clone()))?;

        if let Some(record) = self.storage.committed_request(&cmd.request_id)? {
            tracing::info!(
                member_id = %member.id,
                request_id = %cmd.request_id,
                record_id = %record.id,
                "Check-in request already committed, returning original outcome"
            );
            return Ok(CheckInOutcome::valid(member, record.id, record.session_count, record.class_name, cmd.sync_mode));
        }

        let class_name = cmd.class.class_name().to_string();

        // Activation mutates the working copy only; a denial discards it
        let mut working = member.clone();
        if let Err(reason) = membership::ensure_eligible(&mut working, date) {
            let mut record = self.new_record(cmd, &member, date, local_time);
            record.status = AttendanceStatus::Denied;
            record.denial_reason = Some(reason);
            record.credits_after = member.credits.remaining();
            self.storage.append_record(&record)?;

            tracing::info!(
                member_id = %member.id,
                branch_id = %cmd.branch_id,
                record_id = %record.id,
                reason = %reason,
                "Check-in denied"
            );
            let record_id = record.id.clone();
            self.publish(AttendanceEvent::Denied { record });
            return Ok(CheckInOutcome::denied(member, reason, Some(record_id), class_name, cmd.sync_mode));
        }

        let prior = self.storage.valid_sessions(&member.id, date)?;
        let prior_count = u32::try_from(prior.len()).unwrap_or(u32::MAX);
        if prior_count > 0 && !cmd.force {
            tracing::debug!(member_id = %member.id, prior = prior_count, "Duplicate check-in");
            return Ok(CheckInOutcome::duplicate(member, prior_count, class_name, cmd.sync_mode));
        }

        membership::apply_session(&mut working, date);

        let mut record = self.new_record(cmd, &working, date, local_time);
        record.is_multi_session = prior_count > 0;
        record.session_count = prior_count + 1;
        record.credits_after = working.credits.remaining();

        let stored = self
            .storage
            .commit_session(member.version, &cmd.request_id, &working, &record)?;

        tracing::info!(
            member_id = %stored.id,
            branch_id = %cmd.branch_id,
            record_id = %record.id,
            class_name = %record.class_name,
            session_count = record.session_count,
            credits = ?stored.credits,
            sync_mode = ?cmd.sync_mode,
            "Check-in committed"
        );

        let session_count = record.session_count;
        let record_id = record.id.clone();
        self.publish(AttendanceEvent::Committed {
            record,
            member: stored.clone(),
        });
        Ok(CheckInOutcome::valid(stored, record_id, session_count, class_name, cmd.sync_mode))
    }

    /// Valid first-session record skeleton for `cmd`
    fn new_record(&self, cmd: &CheckInCommand, member: &Member, date: NaiveDate, local_time: NaiveTime) -> AttendanceRecord {
        AttendanceRecord {
            id: shared::util::new_id(),
            member_id: member.id.clone(),
            member_name: member.name.clone(),
            branch_id: cmd.branch_id.clone(),
            date,
            local_time,
            timestamp: cmd.occurred_at.timestamp_millis(),
            class_name: cmd.class.class_name().to_string(),
            instructor: cmd.class.instructor().cloned(),
            status: AttendanceStatus::Valid,
            denial_reason: None,
            is_multi_session: false,
            session_count: 1,
            sync_mode: cmd.sync_mode,
            credits_after: None,
            created_at: shared::util::now_millis(),
        }
    }

    /// `DeleteAttendance`: remove a record, refunding its credit if valid
    pub fn delete_record(&self, record_id: &str) -> CheckInResult<Option<Member>> {
        let refunded = self.storage.delete_record(record_id)?;
        tracing::info!(
            record_id = %record_id,
            refunded = refunded.is_some(),
            "Attendance record deleted"
        );
        self.publish(AttendanceEvent::Refunded {
            record_id: record_id.to_string(),
            member: refunded.clone(),
        });
        Ok(refunded)
    }

    /// Member directory upsert
    pub fn upsert_member(&self, member: &Member) -> CheckInResult<Member> {
        let stored = self.storage.put_member(member)?;
        tracing::debug!(member_id = %stored.id, version = stored.version, "Member document updated");
        self.publish(AttendanceEvent::MemberUpdated { member: stored.clone() });
        Ok(stored)
    }

    /// `CorrectSchedule`
    pub fn correct_schedule(
        &self,
        branch_id: &str,
        date: NaiveDate,
        old_slots: &[ClassSlot],
        new_slots: &[ClassSlot],
    ) -> CheckInResult<usize> {
        let updated = correction::correct_schedule(&self.storage, branch_id, date, old_slots, new_slots)?;
        if updated > 0 {
            self.publish(AttendanceEvent::Corrected {
                branch_id: branch_id.to_string(),
                date,
                updated,
            });
        }
        Ok(updated)
    }

    fn publish(&self, event: AttendanceEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::trace!("No attendance event subscribers");
        }
    }
}

#[async_trait]
impl CheckInGateway for CheckInEngine {
    async fn check_in(&self, cmd: CheckInCommand) -> CheckInResult<CheckInOutcome> {
        // redb calls block; keep them off the async workers
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.execute(&cmd))
            .await
            .map_err(|e| CheckInError::Unavailable(format!("check-in task failed: {e}")))?
    }
}
