//! Offline queue
//!
//! Used only after the live path failed on timeout / connectivity grounds.
//!
//! ```text
//! projection (MemberCache) ──► validity check ──► durable pending (redb)
//!                                                     │ write failed
//!                                                     ▼
//!                                               local tier (memory) ⚠ not durable
//! ```
//!
//! The projection is updated speculatively so the kiosk shows the new
//! balance; no attendance record is written until the reconciler replays
//! the pending check-in through the engine.
//!
//! The durable write runs on the blocking pool under `write_timeout`. A
//! write that times out may still land later, leaving the same pending id
//! in both tiers; replays are keyed by that id, so it commits once.

use chrono_tz::Tz;
use parking_lot::Mutex;
use shared::models::{PendingCheckIn, PendingStatus, QueueTier};
use shared::CheckInOutcome;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::cache::MemberCache;
use super::engine::CheckInCommand;
use super::error::{CheckInError, CheckInResult, QueueError, QueueResult};
use super::membership;
use super::storage::AttendanceStorage;
use crate::utils::time::venue_local;

/// Durable tier of the pending queue
pub trait PendingStore: Send + Sync {
    fn insert(&self, pending: &PendingCheckIn) -> QueueResult<()>;
    /// Ordered by original event time
    fn list(&self) -> QueueResult<Vec<PendingCheckIn>>;
    fn remove(&self, pending_id: &str) -> QueueResult<bool>;
    fn mark_failed(&self, pending_id: &str, error: &str) -> QueueResult<Option<PendingCheckIn>>;
    /// Park a pending check-in (from either tier) for manual reconciliation
    fn dead_letter(&self, pending: &PendingCheckIn, error: &str) -> QueueResult<()>;
    fn count(&self) -> QueueResult<u64>;
}

impl PendingStore for AttendanceStorage {
    fn insert(&self, pending: &PendingCheckIn) -> QueueResult<()> {
        Ok(self.insert_pending(pending)?)
    }

    fn list(&self) -> QueueResult<Vec<PendingCheckIn>> {
        Ok(self.list_pending()?)
    }

    fn remove(&self, pending_id: &str) -> QueueResult<bool> {
        Ok(self.remove_pending(pending_id)?)
    }

    fn mark_failed(&self, pending_id: &str, error: &str) -> QueueResult<Option<PendingCheckIn>> {
        Ok(self.mark_pending_failed(pending_id, error)?)
    }

    fn dead_letter(&self, pending: &PendingCheckIn, error: &str) -> QueueResult<()> {
        Ok(AttendanceStorage::dead_letter(self, pending, error)?)
    }

    fn count(&self) -> QueueResult<u64> {
        Ok(self.pending_count()?)
    }
}

/// In-process fallback tier; lost if the process dies before a sync
#[derive(Debug, Default)]
pub struct LocalQueue {
    entries: Mutex<Vec<PendingCheckIn>>,
}

impl LocalQueue {
    pub fn push(&self, pending: PendingCheckIn) {
        self.entries.lock().push(pending);
    }

    /// Copy ordered by original event time
    pub fn snapshot(&self) -> Vec<PendingCheckIn> {
        let mut entries = self.entries.lock().clone();
        entries.sort_by_key(|p| p.occurred_at);
        entries
    }

    pub fn remove(&self, pending_id: &str) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|p| p.id != pending_id);
        entries.len() != before
    }

    pub fn mark_failed(&self, pending_id: &str, error: &str) -> Option<PendingCheckIn> {
        let mut entries = self.entries.lock();
        let pending = entries.iter_mut().find(|p| p.id == pending_id)?;
        pending.retry_count += 1;
        pending.last_error = Some(error.to_string());
        Some(pending.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(3000);

pub struct OfflineQueue {
    durable: Arc<dyn PendingStore>,
    local: LocalQueue,
    cache: Arc<MemberCache>,
    tz: Tz,
    write_timeout: Duration,
    /// Serializes enqueue so two offline taps cannot both pass the
    /// projection's duplicate check
    enqueue_lock: tokio::sync::Mutex<()>,
    degraded_writes: AtomicU64,
}

impl OfflineQueue {
    pub fn new(durable: Arc<dyn PendingStore>, cache: Arc<MemberCache>, tz: Tz) -> Self {
        Self {
            durable,
            local: LocalQueue::default(),
            cache,
            tz,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            enqueue_lock: tokio::sync::Mutex::new(()),
            degraded_writes: AtomicU64::new(0),
        }
    }

    /// Bound on one durable write before falling back to the local tier
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// `OfflineCheckIn`: validate against the projection and queue
    pub async fn enqueue(&self, cmd: &CheckInCommand) -> CheckInResult<CheckInOutcome> {
        let (date, local_time) = venue_local(cmd.occurred_at, self.tz);
        let class_name = cmd.class.class_name().to_string();

        let _guard = self.enqueue_lock.lock().await;
        let projected = self
            .cache
            .projected(&cmd.member_id)
            .ok_or_else(|| CheckInError::MemberNotFound(cmd.member_id.clone()))?;

        if projected.last_attendance == Some(date) {
            tracing::debug!(member_id = %cmd.member_id, "Offline duplicate check-in");
            return Ok(CheckInOutcome::duplicate(projected, 1, class_name, cmd.sync_mode));
        }

        let mut working = projected.clone();
        if let Err(reason) = membership::ensure_eligible(&mut working, date) {
            tracing::info!(member_id = %cmd.member_id, reason = %reason, "Offline check-in denied by projection");
            return Ok(CheckInOutcome::denied(projected, reason, None, class_name, cmd.sync_mode));
        }
        membership::apply_session(&mut working, date);

        let now = shared::util::now_millis();
        let mut pending = PendingCheckIn {
            id: shared::util::new_id(),
            member_id: cmd.member_id.clone(),
            branch_id: cmd.branch_id.clone(),
            date,
            local_time,
            occurred_at: cmd.occurred_at.timestamp_millis(),
            class: cmd.class.clone(),
            status: PendingStatus::PendingOffline,
            tier: QueueTier::Durable,
            queued_at: now,
            retry_count: 0,
            last_error: None,
        };

        match self.insert_durable(&pending).await {
            Ok(()) => {
                tracing::info!(
                    member_id = %pending.member_id,
                    branch_id = %pending.branch_id,
                    pending_id = %pending.id,
                    "Check-in queued offline"
                );
            }
            Err(e) => {
                pending.tier = QueueTier::Local;
                let degraded = self.degraded_writes.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::error!(
                    target: "monitoring",
                    member_id = %pending.member_id,
                    pending_id = %pending.id,
                    degraded_writes = degraded,
                    error = %e,
                    "Durable pending write failed, check-in held in local memory only"
                );
                self.local.push(pending.clone());
            }
        }

        self.cache.add_speculative(&pending.member_id, &pending.id, date);
        Ok(CheckInOutcome::queued(working, pending.id, class_name))
    }

    async fn insert_durable(&self, pending: &PendingCheckIn) -> QueueResult<()> {
        let durable = self.durable.clone();
        let entry = pending.clone();
        let write = tokio::task::spawn_blocking(move || durable.insert(&entry));
        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(QueueError::Unreachable(format!("durable write task failed: {e}"))),
            Err(_) => Err(QueueError::Unreachable(format!(
                "durable write timed out after {}ms",
                self.write_timeout.as_millis()
            ))),
        }
    }

    pub fn durable(&self) -> &dyn PendingStore {
        self.durable.as_ref()
    }

    pub fn local(&self) -> &LocalQueue {
        &self.local
    }

    pub fn cache(&self) -> &Arc<MemberCache> {
        &self.cache
    }

    /// Entries waiting in both tiers (durable count read failures count as 0)
    pub fn pending_len(&self) -> usize {
        let durable = match self.durable.count() {
            Ok(n) => usize::try_from(n).unwrap_or(usize::MAX),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to count durable pending check-ins");
                0
            }
        };
        durable + self.local.len()
    }

    /// Check-ins that fell back to the local tier since startup
    pub fn degraded_writes(&self) -> u64 {
        self.degraded_writes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use shared::models::{Credits, Member};
    use shared::{CheckInStatus, DenialReason, ResolvedClass};

    struct UnreachableStore;

    impl PendingStore for UnreachableStore {
        fn insert(&self, _: &PendingCheckIn) -> QueueResult<()> {
            Err(QueueError::Unreachable("disk full".into()))
        }
        fn list(&self) -> QueueResult<Vec<PendingCheckIn>> {
            Err(QueueError::Unreachable("disk full".into()))
        }
        fn remove(&self, _: &str) -> QueueResult<bool> {
            Err(QueueError::Unreachable("disk full".into()))
        }
        fn mark_failed(&self, _: &str, _: &str) -> QueueResult<Option<PendingCheckIn>> {
            Err(QueueError::Unreachable("disk full".into()))
        }
        fn dead_letter(&self, _: &PendingCheckIn, _: &str) -> QueueResult<()> {
            Err(QueueError::Unreachable("disk full".into()))
        }
        fn count(&self) -> QueueResult<u64> {
            Err(QueueError::Unreachable("disk full".into()))
        }
    }

    fn at(h: u32) -> DateTime<Utc> {
        chrono_tz::Asia::Seoul
            .with_ymd_and_hms(2026, 3, 2, h, 0, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    fn command(member_id: &str, h: u32) -> CheckInCommand {
        CheckInCommand::live(
            member_id.to_string(),
            "gangnam".to_string(),
            ResolvedClass::self_practice(),
            false,
            at(h),
        )
    }

    fn cache_with(credits: Credits) -> Arc<MemberCache> {
        let cache = Arc::new(MemberCache::new());
        cache.refresh(&Member::new("m1", "Kim", credits));
        cache
    }

    #[tokio::test]
    async fn test_enqueue_persists_and_projects() {
        let storage = AttendanceStorage::open_in_memory().unwrap();
        let cache = cache_with(Credits::Remaining(5));
        let queue = OfflineQueue::new(Arc::new(storage.clone()), cache.clone(), chrono_tz::Asia::Seoul);

        let outcome = queue.enqueue(&command("m1", 9)).await.unwrap();
        assert_eq!(outcome.status, CheckInStatus::Queued);
        assert_eq!(outcome.remaining_credits(), Some(4));
        assert_eq!(cache.projected("m1").unwrap().credits, Credits::Remaining(4));

        // No attendance record yet, only the pending entry
        let pending = storage.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].tier, QueueTier::Durable);
        assert!(storage.valid_sessions("m1", pending[0].date).unwrap().is_empty());

        // Second tap the same day is a duplicate against the projection
        let dup = queue.enqueue(&command("m1", 10)).await.unwrap();
        assert_eq!(dup.status, CheckInStatus::Duplicate);
        assert_eq!(queue.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_denies_from_projection() {
        let storage = AttendanceStorage::open_in_memory().unwrap();
        let queue = OfflineQueue::new(Arc::new(storage.clone()), cache_with(Credits::Remaining(0)), chrono_tz::Asia::Seoul);

        let outcome = queue.enqueue(&command("m1", 9)).await.unwrap();
        assert_eq!(outcome.status, CheckInStatus::Denied);
        assert_eq!(outcome.denial_reason, Some(DenialReason::NoCredits));
        assert_eq!(storage.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_member_is_not_queued() {
        let storage = AttendanceStorage::open_in_memory().unwrap();
        let queue = OfflineQueue::new(Arc::new(storage), cache_with(Credits::Remaining(5)), chrono_tz::Asia::Seoul);
        assert!(matches!(
            queue.enqueue(&command("ghost", 9)).await,
            Err(CheckInError::MemberNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_durable_failure_degrades_to_local_tier() {
        let queue = OfflineQueue::new(Arc::new(UnreachableStore), cache_with(Credits::Remaining(5)), chrono_tz::Asia::Seoul);

        let outcome = queue.enqueue(&command("m1", 9)).await.unwrap();
        assert_eq!(outcome.status, CheckInStatus::Queued);
        assert_eq!(queue.degraded_writes(), 1);
        assert_eq!(queue.local().len(), 1);
        assert_eq!(queue.local().snapshot()[0].tier, QueueTier::Local);
        assert_eq!(queue.pending_len(), 1);
    }

    /// Durable tier whose writes hang well past the write timeout
    struct StalledStore(AttendanceStorage);

    impl PendingStore for StalledStore {
        fn insert(&self, pending: &PendingCheckIn) -> QueueResult<()> {
            std::thread::sleep(Duration::from_millis(800));
            self.0.insert(pending)
        }
        fn list(&self) -> QueueResult<Vec<PendingCheckIn>> {
            self.0.list()
        }
        fn remove(&self, pending_id: &str) -> QueueResult<bool> {
            PendingStore::remove(&self.0, pending_id)
        }
        fn mark_failed(&self, pending_id: &str, error: &str) -> QueueResult<Option<PendingCheckIn>> {
            PendingStore::mark_failed(&self.0, pending_id, error)
        }
        fn dead_letter(&self, pending: &PendingCheckIn, error: &str) -> QueueResult<()> {
            PendingStore::dead_letter(&self.0, pending, error)
        }
        fn count(&self) -> QueueResult<u64> {
            self.0.count()
        }
    }

    #[tokio::test]
    async fn test_stalled_durable_write_falls_back_in_time() {
        let storage = AttendanceStorage::open_in_memory().unwrap();
        let queue = OfflineQueue::new(Arc::new(StalledStore(storage)), cache_with(Credits::Remaining(5)), chrono_tz::Asia::Seoul)
            .with_write_timeout(Duration::from_millis(50));

        let started = std::time::Instant::now();
        let outcome = queue.enqueue(&command("m1", 9)).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(outcome.status, CheckInStatus::Queued);
        assert_eq!(queue.degraded_writes(), 1);
        assert_eq!(queue.local().snapshot()[0].tier, QueueTier::Local);
    }
}
