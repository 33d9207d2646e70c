//! 离线队列同步: 幂等、降级到内存队列、死信

mod common;

use common::*;
use shared::models::{Credits, Member, PendingCheckIn, QueueTier};
use shared::{CheckInStatus, SyncMode};
use std::sync::Arc;
use studio_server::attendance::reconciler::MAX_REPLAY_RETRIES;
use studio_server::attendance::{CheckInCommand, CheckInGateway, PendingStore, QueueError};

/// Durable tier that is never reachable
struct UnreachableStore;

impl PendingStore for UnreachableStore {
    fn insert(&self, _pending: &PendingCheckIn) -> Result<(), QueueError> {
        Err(QueueError::Unreachable("disk offline".to_string()))
    }

    fn list(&self) -> Result<Vec<PendingCheckIn>, QueueError> {
        Err(QueueError::Unreachable("disk offline".to_string()))
    }

    fn remove(&self, _pending_id: &str) -> Result<bool, QueueError> {
        Ok(false)
    }

    fn mark_failed(&self, _pending_id: &str, _error: &str) -> Result<Option<PendingCheckIn>, QueueError> {
        Err(QueueError::Unreachable("disk offline".to_string()))
    }

    fn dead_letter(&self, _pending: &PendingCheckIn, _error: &str) -> Result<(), QueueError> {
        Err(QueueError::Unreachable("disk offline".to_string()))
    }

    fn count(&self) -> Result<u64, QueueError> {
        Ok(0)
    }
}

#[tokio::test]
async fn test_live_commit_supersedes_pending() {
    let h = Harness::new(&[Member::new("m1", "Kim", Credits::Remaining(5))]);

    h.gateway.set_mode(Mode::Down);
    let queued = h.service.check_in_at(request("m1", false), seoul(2, 9, 40)).await.unwrap();
    assert_eq!(queued.status, CheckInStatus::Queued);

    // The same check-in reached the store anyway (e.g. committed after the timeout)
    h.gateway.set_mode(Mode::Up);
    let cmd = CheckInCommand::live(
        "m1".to_string(),
        BRANCH.to_string(),
        shared::ResolvedClass::self_practice(),
        false,
        seoul(2, 9, 41),
    );
    let live = h.engine.check_in(cmd).await.unwrap();
    assert_eq!(live.status, CheckInStatus::Valid);

    let report = h.reconciler.sync_pending().await;
    assert_eq!(report.synced, 0);
    assert_eq!(report.discarded, 1);
    assert_eq!(report.remaining, 0);

    assert_eq!(h.valid_records("m1", 2), 1);
    assert_eq!(h.member("m1").credits, Credits::Remaining(4));
    assert_eq!(h.cache.speculative_count("m1"), 0);
}

#[tokio::test]
async fn test_replay_twice_commits_once() {
    let h = Harness::new(&[Member::new("m1", "Kim", Credits::Remaining(5))]);
    h.gateway.set_mode(Mode::Down);
    h.service.check_in_at(request("m1", false), seoul(2, 9, 40)).await.unwrap();

    let pending = h.storage.list_pending().unwrap().remove(0);
    h.gateway.set_mode(Mode::Up);

    // Replay directly twice, as a crashed reconciler would on restart
    let first = h.engine.check_in(CheckInCommand::replay(&pending).unwrap()).await.unwrap();
    let second = h.engine.check_in(CheckInCommand::replay(&pending).unwrap()).await.unwrap();
    assert_eq!(first.status, CheckInStatus::Valid);
    // Same pending id: the second replay reports the first commit
    assert_eq!(second.status, CheckInStatus::Valid);
    assert_eq!(second.record_id, first.record_id);
    assert_eq!(second.remaining_credits(), Some(4));

    let report = h.reconciler.sync_pending().await;
    assert_eq!(report.discarded, 1);
    assert_eq!(h.valid_records("m1", 2), 1);
    assert_eq!(h.member("m1").credits, Credits::Remaining(4));
}

#[tokio::test]
async fn test_replay_uses_original_day() {
    let h = Harness::new(&[Member::new("m1", "Kim", Credits::Remaining(5))]);
    h.gateway.set_mode(Mode::Down);
    h.service.check_in_at(request("m1", false), seoul(2, 19, 10)).await.unwrap();

    // Reconnected the next day; a live check-in on day 3 must not collide
    h.gateway.set_mode(Mode::Up);
    let live = h.service.check_in_at(request("m1", false), seoul(3, 9, 40)).await.unwrap();
    assert_eq!(live.status, CheckInStatus::Valid);

    let report = h.reconciler.sync_pending().await;
    assert_eq!(report.synced, 1);
    assert_eq!(h.valid_records("m1", 2), 1);
    assert_eq!(h.valid_records("m1", 3), 1);
    assert_eq!(h.member("m1").credits, Credits::Remaining(3));
}

#[tokio::test]
async fn test_replay_denied_when_member_lapsed() {
    let h = Harness::new(&[Member::new("m1", "Kim", Credits::Remaining(1))]);
    h.gateway.set_mode(Mode::Down);
    let queued = h.service.check_in_at(request("m1", false), seoul(2, 9, 40)).await.unwrap();
    assert_eq!(queued.status, CheckInStatus::Queued);

    // Directory zeroes the balance before the queue drains
    let mut member = h.member("m1");
    member.credits = Credits::Remaining(0);
    h.engine.upsert_member(&member).unwrap();

    h.gateway.set_mode(Mode::Up);
    let report = h.reconciler.sync_pending().await;
    assert_eq!(report.denied, 1);
    assert_eq!(report.remaining, 0);

    let records = h.storage.records_for_branch_day(BRANCH, date(2)).unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].is_valid());
    assert_eq!(records[0].sync_mode, SyncMode::OfflineQueued);
}

#[tokio::test]
async fn test_orphaned_pending_is_discarded() {
    let h = Harness::new(&[Member::new("m1", "Kim", Credits::Remaining(5))]);
    h.gateway.set_mode(Mode::Down);
    h.service.check_in_at(request("m1", false), seoul(2, 9, 40)).await.unwrap();

    // Hand-edit the pending entry to point at a member that no longer exists
    let mut pending = h.storage.list_pending().unwrap().remove(0);
    h.storage.remove_pending(&pending.id).unwrap();
    pending.member_id = "gone".to_string();
    h.storage.insert_pending(&pending).unwrap();

    h.gateway.set_mode(Mode::Up);
    let report = h.reconciler.sync_pending().await;
    assert_eq!(report.discarded, 1);
    assert_eq!(h.storage.pending_count().unwrap(), 0);
}

#[tokio::test]
async fn test_degraded_local_tier_drains() {
    let h = Harness::with_durable(
        &[Member::new("m1", "Kim", Credits::Remaining(5))],
        Arc::new(UnreachableStore),
    );
    h.gateway.set_mode(Mode::Down);

    let outcome = h.service.check_in_at(request("m1", false), seoul(2, 9, 40)).await.unwrap();
    assert_eq!(outcome.status, CheckInStatus::Queued);
    assert_eq!(h.offline.degraded_writes(), 1);
    assert_eq!(h.offline.local().len(), 1);
    assert_eq!(h.offline.local().snapshot()[0].tier, QueueTier::Local);

    h.gateway.set_mode(Mode::Up);
    let report = h.reconciler.sync_pending().await;
    assert_eq!(report.synced, 1);
    assert!(h.offline.local().is_empty());
    assert_eq!(h.valid_records("m1", 2), 1);
    assert_eq!(h.member("m1").credits, Credits::Remaining(4));
}

/// Durable tier whose writes stall far past the live timeout
struct StalledStore(studio_server::attendance::AttendanceStorage);

impl PendingStore for StalledStore {
    fn insert(&self, pending: &PendingCheckIn) -> Result<(), QueueError> {
        std::thread::sleep(std::time::Duration::from_millis(1500));
        self.0.insert(pending)
    }

    fn list(&self) -> Result<Vec<PendingCheckIn>, QueueError> {
        self.0.list()
    }

    fn remove(&self, pending_id: &str) -> Result<bool, QueueError> {
        PendingStore::remove(&self.0, pending_id)
    }

    fn mark_failed(&self, pending_id: &str, error: &str) -> Result<Option<PendingCheckIn>, QueueError> {
        PendingStore::mark_failed(&self.0, pending_id, error)
    }

    fn dead_letter(&self, pending: &PendingCheckIn, error: &str) -> Result<(), QueueError> {
        PendingStore::dead_letter(&self.0, pending, error)
    }

    fn count(&self) -> Result<u64, QueueError> {
        self.0.count()
    }
}

#[tokio::test]
async fn test_stalled_durable_tier_does_not_block_check_in() {
    let stalled = StalledStore(studio_server::attendance::AttendanceStorage::open_in_memory().unwrap());
    let h = Harness::with_durable(&[Member::new("m1", "Kim", Credits::Remaining(5))], Arc::new(stalled));
    h.gateway.set_mode(Mode::Down);

    let outcome = tokio::time::timeout(
        std::time::Duration::from_secs(1),
        h.service.check_in_at(request("m1", false), seoul(2, 9, 40)),
    )
    .await
    .expect("check-in blocked on the durable tier")
    .unwrap();
    assert_eq!(outcome.status, CheckInStatus::Queued);
    assert_eq!(h.offline.degraded_writes(), 1);
    assert_eq!(h.offline.local().len(), 1);
    assert_eq!(h.cache.projected("m1").unwrap().credits, Credits::Remaining(4));
}

#[tokio::test]
async fn test_unreadable_timestamp_is_dead_lettered() {
    let h = Harness::new(&[Member::new("m1", "Kim", Credits::Remaining(5))]);
    h.gateway.set_mode(Mode::Down);
    h.service.check_in_at(request("m1", false), seoul(2, 9, 40)).await.unwrap();

    let mut pending = h.storage.list_pending().unwrap().remove(0);
    h.storage.remove_pending(&pending.id).unwrap();
    pending.occurred_at = i64::MAX;
    h.storage.insert_pending(&pending).unwrap();

    h.gateway.set_mode(Mode::Up);
    let report = h.reconciler.sync_pending().await;
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(report.synced, 0);
    assert_eq!(report.remaining, 0);
    assert_eq!(h.storage.dead_letter_count().unwrap(), 1);
    assert_eq!(h.valid_records("m1", 2), 0);
    assert_eq!(h.member("m1").credits, Credits::Remaining(5));
}

#[tokio::test]
async fn test_dead_letter_after_max_retries() {
    let h = Harness::new(&[Member::new("m1", "Kim", Credits::Remaining(5))]);
    h.gateway.set_mode(Mode::Down);
    h.service.check_in_at(request("m1", false), seoul(2, 9, 40)).await.unwrap();

    for run in 1..MAX_REPLAY_RETRIES {
        let report = h.reconciler.sync_pending().await;
        assert_eq!(report.failed, 1, "run {run}");
        assert_eq!(report.remaining, 1);
    }
    let report = h.reconciler.sync_pending().await;
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(report.remaining, 0);

    let dead = h.storage.list_dead_letters().unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].pending.retry_count, MAX_REPLAY_RETRIES);
    // Parked entries no longer count against the projection
    assert_eq!(h.cache.speculative_count("m1"), 0);
    assert_eq!(h.cache.projected("m1").unwrap().credits, Credits::Remaining(5));

    // Manual requeue with the store back
    assert_eq!(h.storage.requeue_dead_letters().unwrap(), 1);
    h.gateway.set_mode(Mode::Up);
    let report = h.reconciler.sync_pending().await;
    assert_eq!(report.synced, 1);
    assert_eq!(h.storage.dead_letter_count().unwrap(), 0);
    assert_eq!(h.valid_records("m1", 2), 1);
}
