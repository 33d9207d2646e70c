//! Reconciler - replays pending check-ins exactly once
//!
//! For each pending check-in, local tier first, oldest first:
//!
//! | Situation | Action |
//! |-----------|--------|
//! | Member already has a valid session that day | discard (audit log) |
//! | Replay commits | delete pending after commit |
//! | Replay denied / duplicate | delete pending |
//! | Member no longer exists | discard orphan |
//! | Replay fails (retryable) | keep, bump `retry_count`; dead letter at 3 |
//! | Stored instant unreadable | dead letter now |
//!
//! Deleting only after the commit plus the engine's duplicate check makes
//! a crash between the two harmless: the next run sees the committed
//! session and discards the leftover pending entry.

use shared::models::{Member, PendingCheckIn, QueueTier};
use shared::{CheckInStatus, SyncReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::cache::MemberCache;
use super::engine::{CheckInCommand, CheckInGateway};
use super::error::CheckInError;
use super::offline::OfflineQueue;
use super::storage::AttendanceStorage;

/// Failed replays before a pending check-in is dead-lettered
pub const MAX_REPLAY_RETRIES: u32 = 3;

enum Disposition {
    Synced(Option<Member>),
    Discarded,
    Denied,
    Failed(String),
    Unreplayable(String),
}

pub struct Reconciler {
    gateway: Arc<dyn CheckInGateway>,
    storage: AttendanceStorage,
    offline: Arc<OfflineQueue>,
    /// One sync at a time
    running: tokio::sync::Mutex<()>,
}

impl Reconciler {
    pub fn new(gateway: Arc<dyn CheckInGateway>, storage: AttendanceStorage, offline: Arc<OfflineQueue>) -> Self {
        Self {
            gateway,
            storage,
            offline,
            running: tokio::sync::Mutex::new(()),
        }
    }

    fn cache(&self) -> &MemberCache {
        self.offline.cache()
    }

    /// `SyncPending`
    pub async fn sync_pending(&self) -> SyncReport {
        let _running = self.running.lock().await;
        let mut report = SyncReport::default();

        for pending in self.offline.local().snapshot() {
            let disposition = self.replay(&pending).await;
            self.finish(&pending, disposition, &mut report);
        }

        match self.offline.durable().list() {
            Ok(entries) => {
                for pending in entries {
                    let disposition = self.replay(&pending).await;
                    self.finish(&pending, disposition, &mut report);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to list durable pending check-ins");
            }
        }

        report.remaining = self.offline.pending_len();
        if report.processed() > 0 || report.failed > 0 || report.dead_lettered > 0 {
            tracing::info!(
                synced = report.synced,
                discarded = report.discarded,
                denied = report.denied,
                failed = report.failed,
                dead_lettered = report.dead_lettered,
                remaining = report.remaining,
                "Pending check-ins reconciled"
            );
        }
        report
    }

    async fn replay(&self, pending: &PendingCheckIn) -> Disposition {
        match self.storage.valid_sessions(&pending.member_id, pending.date) {
            Ok(sessions) if !sessions.is_empty() => {
                tracing::info!(
                    target: "audit",
                    pending_id = %pending.id,
                    member_id = %pending.member_id,
                    date = %pending.date,
                    record_id = %sessions[0].id,
                    "Pending check-in superseded by existing attendance, discarded"
                );
                return Disposition::Discarded;
            }
            Ok(_) => {}
            Err(e) => return Disposition::Failed(e.to_string()),
        }

        let Some(cmd) = CheckInCommand::replay(pending) else {
            tracing::warn!(
                pending_id = %pending.id,
                member_id = %pending.member_id,
                occurred_at = pending.occurred_at,
                "Pending check-in has an out-of-range timestamp"
            );
            return Disposition::Unreplayable(format!("occurred_at {} out of range", pending.occurred_at));
        };

        match self.gateway.check_in(cmd).await {
            Ok(outcome) => match outcome.status {
                CheckInStatus::Valid => Disposition::Synced(outcome.member),
                CheckInStatus::Duplicate => {
                    tracing::info!(
                        target: "audit",
                        pending_id = %pending.id,
                        member_id = %pending.member_id,
                        "Pending check-in raced a live check-in, discarded"
                    );
                    Disposition::Discarded
                }
                CheckInStatus::Denied => {
                    tracing::warn!(
                        target: "audit",
                        pending_id = %pending.id,
                        member_id = %pending.member_id,
                        reason = ?outcome.denial_reason,
                        "Pending check-in denied on replay"
                    );
                    Disposition::Denied
                }
                CheckInStatus::Queued => Disposition::Failed("replay was queued instead of committed".to_string()),
            },
            Err(CheckInError::MemberNotFound(_)) => {
                tracing::warn!(
                    target: "audit",
                    pending_id = %pending.id,
                    member_id = %pending.member_id,
                    "Member no longer exists, orphaned pending check-in discarded"
                );
                Disposition::Discarded
            }
            Err(e) => Disposition::Failed(e.to_string()),
        }
    }

    fn finish(&self, pending: &PendingCheckIn, disposition: Disposition, report: &mut SyncReport) {
        match disposition {
            Disposition::Synced(member) => {
                if let Some(member) = member {
                    self.cache().refresh(&member);
                }
                self.remove(pending);
                report.synced += 1;
            }
            Disposition::Discarded => {
                self.remove(pending);
                report.discarded += 1;
            }
            Disposition::Denied => {
                self.remove(pending);
                report.denied += 1;
            }
            Disposition::Unreplayable(error) => {
                if self.dead_letter(pending, &error) {
                    report.dead_lettered += 1;
                } else {
                    report.failed += 1;
                }
            }
            Disposition::Failed(error) => {
                tracing::warn!(pending_id = %pending.id, member_id = %pending.member_id, error = %error, "Pending check-in replay failed");
                let updated = match pending.tier {
                    QueueTier::Local => self.offline.local().mark_failed(&pending.id, &error),
                    QueueTier::Durable => match self.offline.durable().mark_failed(&pending.id, &error) {
                        Ok(updated) => updated,
                        Err(e) => {
                            tracing::error!(pending_id = %pending.id, error = %e, "Failed to record replay failure");
                            None
                        }
                    },
                };
                match updated {
                    Some(updated) if updated.retry_count >= MAX_REPLAY_RETRIES => {
                        if self.dead_letter(&updated, &error) {
                            report.dead_lettered += 1;
                        } else {
                            report.failed += 1;
                        }
                    }
                    _ => report.failed += 1,
                }
            }
        }
    }

    fn remove(&self, pending: &PendingCheckIn) {
        let removed = match pending.tier {
            QueueTier::Local => Ok(self.offline.local().remove(&pending.id)),
            QueueTier::Durable => self.offline.durable().remove(&pending.id),
        };
        if let Err(e) = removed {
            // Left in place; the next run discards it as superseded
            tracing::error!(pending_id = %pending.id, error = %e, "Failed to delete reconciled pending check-in");
        }
        self.cache().settle(&pending.member_id, &pending.id);
    }

    fn dead_letter(&self, pending: &PendingCheckIn, error: &str) -> bool {
        match self.offline.durable().dead_letter(pending, error) {
            Ok(()) => {
                if pending.tier == QueueTier::Local {
                    self.offline.local().remove(&pending.id);
                }
                tracing::error!(
                    target: "monitoring",
                    pending_id = %pending.id,
                    member_id = %pending.member_id,
                    retry_count = pending.retry_count,
                    error = %error,
                    "Pending check-in moved to dead letter queue"
                );
                self.cache().settle(&pending.member_id, &pending.id);
                true
            }
            Err(e) => {
                tracing::error!(pending_id = %pending.id, error = %e, "Failed to dead-letter pending check-in");
                false
            }
        }
    }
}

/// Runs `SyncPending` on startup, on an interval, and when triggered
pub struct ReconcileWorker {
    reconciler: Arc<Reconciler>,
    trigger: Arc<Notify>,
    interval: Duration,
}

impl ReconcileWorker {
    pub fn new(reconciler: Arc<Reconciler>, trigger: Arc<Notify>, interval: Duration) -> Self {
        Self {
            reconciler,
            trigger,
            interval,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Reconcile worker started");

        // First tick fires immediately: startup sync
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Reconcile worker received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {}
                _ = self.trigger.notified() => {
                    tracing::debug!("Connectivity restored, syncing pending check-ins");
                }
            }
            self.reconciler.sync_pending().await;
        }
    }
}
