//! Kiosk check-in service
//!
//! `CheckIn(memberId, branchId, classHint, force)`:
//!
//! 1. Resolve the class from the branch's schedule (hint first)
//! 2. Call the live engine, bounded by a timeout, retrying once
//! 3. On timeout / unreachable store only: hand off to the offline queue
//!
//! All attempts of one tap share a request id, so an attempt that commits
//! after its caller timed out is not committed again by the retry.
//!
//! Denied, duplicate and member-not-found results are terminal and never
//! reach the offline queue.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use shared::models::ClassSlot;
use shared::{CheckInOutcome, CheckInRequest, ResolvedClass};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use super::engine::{CheckInCommand, CheckInGateway};
use super::error::{CheckInError, CheckInResult};
use super::offline::OfflineQueue;
use super::resolver;
use super::storage::AttendanceStorage;
use crate::utils::time::venue_local;

/// Bounds on the live path before falling back offline
#[derive(Debug, Clone, Copy)]
pub struct LivePolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl Default for LivePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(3000),
            max_attempts: 2,
        }
    }
}

pub struct CheckInService {
    gateway: Arc<dyn CheckInGateway>,
    offline: Arc<OfflineQueue>,
    storage: AttendanceStorage,
    tz: Tz,
    policy: LivePolicy,
    /// Wakes the reconcile worker once the live path works again
    sync_trigger: Arc<Notify>,
}

impl CheckInService {
    pub fn new(
        gateway: Arc<dyn CheckInGateway>,
        offline: Arc<OfflineQueue>,
        storage: AttendanceStorage,
        tz: Tz,
        policy: LivePolicy,
        sync_trigger: Arc<Notify>,
    ) -> Self {
        Self {
            gateway,
            offline,
            storage,
            tz,
            policy,
            sync_trigger,
        }
    }

    /// `ResolveClass(branchId, date, now)`, with an optional kiosk hint
    ///
    /// A hint naming a non-cancelled slot wins; anything else falls back
    /// to the time-window rules.
    pub async fn resolve(
        &self,
        branch_id: &str,
        date: NaiveDate,
        now: NaiveTime,
        hint: Option<&str>,
    ) -> CheckInResult<ResolvedClass> {
        let slots = self.load_schedule(branch_id, date).await?;
        if let Some(hint) = hint
            && let Some(resolved) = resolver::resolve_hint(&slots, hint)
        {
            return Ok(resolved);
        }
        Ok(resolver::resolve_class(&slots, now))
    }

    /// Schedule read on the blocking pool, bounded like a live call
    async fn load_schedule(&self, branch_id: &str, date: NaiveDate) -> CheckInResult<Vec<ClassSlot>> {
        let storage = self.storage.clone();
        let branch_id = branch_id.to_string();
        let read = tokio::task::spawn_blocking(move || storage.get_schedule(&branch_id, date));
        match tokio::time::timeout(self.policy.timeout, read).await {
            Ok(Ok(slots)) => Ok(slots?),
            Ok(Err(e)) => Err(CheckInError::Unavailable(format!("schedule read task failed: {e}"))),
            Err(_) => Err(CheckInError::Unavailable("schedule read timed out".to_string())),
        }
    }

    pub async fn check_in(&self, req: CheckInRequest) -> CheckInResult<CheckInOutcome> {
        self.check_in_at(req, Utc::now()).await
    }

    /// Check in at an explicit instant
    pub async fn check_in_at(&self, req: CheckInRequest, now: DateTime<Utc>) -> CheckInResult<CheckInOutcome> {
        let (date, local_time) = venue_local(now, self.tz);
        let class = self
            .resolve(&req.branch_id, date, local_time, req.class_hint.as_deref())
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(branch_id = %req.branch_id, error = %e, "Schedule unavailable, recording self-practice");
                ResolvedClass::self_practice()
            });

        let cmd = CheckInCommand::live(req.member_id, req.branch_id, class, req.force, now);

        let mut last_error = String::new();
        for attempt in 1..=self.policy.max_attempts.max(1) {
            match tokio::time::timeout(self.policy.timeout, self.gateway.check_in(cmd.clone())).await {
                Ok(Ok(outcome)) => {
                    self.after_live(&outcome);
                    return Ok(outcome);
                }
                Ok(Err(e)) if e.is_transient() => {
                    tracing::warn!(member_id = %cmd.member_id, attempt, error = %e, "Live check-in failed");
                    last_error = e.to_string();
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    tracing::warn!(
                        member_id = %cmd.member_id,
                        attempt,
                        timeout_ms = self.policy.timeout.as_millis() as u64,
                        "Live check-in timed out"
                    );
                    last_error = "live check-in timed out".to_string();
                }
            }
        }

        // A forced extra session is discarded on replay, so never queue it
        if cmd.force {
            return Err(CheckInError::Unavailable(last_error));
        }

        tracing::warn!(
            member_id = %cmd.member_id,
            branch_id = %cmd.branch_id,
            error = %last_error,
            "Live path unavailable, falling back to offline queue"
        );
        self.offline.enqueue(&cmd).await
    }

    fn after_live(&self, outcome: &CheckInOutcome) {
        if let Some(member) = &outcome.member {
            self.offline.cache().refresh(member);
        }
        if self.offline.pending_len() > 0 {
            self.sync_trigger.notify_one();
        }
    }

    pub fn offline(&self) -> &Arc<OfflineQueue> {
        &self.offline
    }
}
