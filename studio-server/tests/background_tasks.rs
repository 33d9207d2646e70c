//! 后台任务: 事件分发 → 会员缓存，触发同步，优雅关闭

use chrono::{NaiveDate, TimeZone, Utc};
use shared::models::{Credits, Member};
use shared::{CheckInStatus, ResolvedClass, SyncMode};
use std::time::Duration;
use studio_server::attendance::{AttendanceStorage, CheckInCommand};
use studio_server::{Config, ServerState};

async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_events_refresh_cache_and_trigger_drains_queue() {
    let mut config = Config::default();
    config.venue_tz = chrono_tz::Asia::Seoul;
    config.reconcile_interval_secs = 3600;
    let state = ServerState::with_storage(config, AttendanceStorage::open_in_memory().unwrap()).unwrap();
    let tasks = state.start_background_tasks();

    // Directory update arrives after warmup; the router feeds it to the cache
    state
        .engine
        .upsert_member(&Member::new("m1", "Kim", Credits::Remaining(5)))
        .unwrap();
    assert!(wait_until(|| state.cache.projected("m1").is_some()).await);

    let occurred_at = chrono_tz::Asia::Seoul
        .with_ymd_and_hms(2026, 3, 2, 9, 40, 0)
        .single()
        .unwrap()
        .with_timezone(&Utc);
    let cmd = CheckInCommand {
        request_id: shared::util::new_id(),
        member_id: "m1".to_string(),
        branch_id: "gangnam".to_string(),
        class: ResolvedClass::self_practice(),
        force: false,
        occurred_at,
        sync_mode: SyncMode::Live,
    };
    let queued = state.offline.enqueue(&cmd).await.unwrap();
    assert_eq!(queued.status, CheckInStatus::Queued);

    state.sync_trigger.notify_one();
    let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
    assert!(
        wait_until(|| {
            state.storage.pending_count().unwrap() == 0
                && state.storage.valid_sessions("m1", day).unwrap().len() == 1
        })
        .await
    );
    assert!(wait_until(|| state.cache.speculative_count("m1") == 0).await);
    assert_eq!(
        state.cache.projected("m1").unwrap().credits,
        Credits::Remaining(4)
    );

    tasks.shutdown().await;
}
