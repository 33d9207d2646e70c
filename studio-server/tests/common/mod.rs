//! 集成测试公共工具
//!
//! `Harness` 组装一套完整的签到链路 (内存 redb)，网关可切换为
//! 正常 / 不可达 / 超时，用来模拟终端断网。

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use shared::CheckInOutcome;
use shared::models::{ClassSlot, Member};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use studio_server::attendance::{
    AttendanceStorage, CheckInCommand, CheckInEngine, CheckInError, CheckInGateway, CheckInResult,
    CheckInService, LivePolicy, MemberCache, OfflineQueue, PendingStore, Reconciler,
};
use tokio::sync::Notify;

pub const BRANCH: &str = "gangnam";

pub fn tz() -> chrono_tz::Tz {
    chrono_tz::Asia::Seoul
}

/// 2026-03-{day} h:m in Seoul
pub fn seoul(day: u32, h: u32, m: u32) -> DateTime<Utc> {
    tz().with_ymd_and_hms(2026, 3, day, h, m, 0)
        .single()
        .unwrap()
        .with_timezone(&Utc)
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
}

pub fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// 10:00 Flow (60), 19:00 Yin (60)
pub fn day_slots() -> Vec<ClassSlot> {
    vec![
        ClassSlot::new(hm(10, 0), 60, "Flow"),
        ClassSlot::new(hm(19, 0), 60, "Yin"),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    Up = 0,
    /// 存储不可达
    Down = 1,
    /// 请求挂起直到超时
    Hang = 2,
}

/// Engine gateway whose connectivity can be switched at runtime
pub struct FlakyGateway {
    engine: CheckInEngine,
    mode: AtomicU8,
}

impl FlakyGateway {
    pub fn new(engine: CheckInEngine) -> Self {
        Self {
            engine,
            mode: AtomicU8::new(Mode::Up as u8),
        }
    }

    pub fn set_mode(&self, mode: Mode) {
        self.mode.store(mode as u8, Ordering::SeqCst);
    }

    fn mode(&self) -> Mode {
        match self.mode.load(Ordering::SeqCst) {
            1 => Mode::Down,
            2 => Mode::Hang,
            _ => Mode::Up,
        }
    }
}

#[async_trait]
impl CheckInGateway for FlakyGateway {
    async fn check_in(&self, cmd: CheckInCommand) -> CheckInResult<CheckInOutcome> {
        match self.mode() {
            Mode::Up => self.engine.check_in(cmd).await,
            Mode::Down => Err(CheckInError::Unavailable("primary store unreachable".to_string())),
            Mode::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(CheckInError::Unavailable("hung".to_string()))
            }
        }
    }
}

pub struct Harness {
    pub storage: AttendanceStorage,
    pub engine: CheckInEngine,
    pub gateway: Arc<FlakyGateway>,
    pub cache: Arc<MemberCache>,
    pub offline: Arc<OfflineQueue>,
    pub service: CheckInService,
    pub reconciler: Reconciler,
    pub trigger: Arc<Notify>,
}

impl Harness {
    pub fn new(members: &[Member]) -> Self {
        let storage = AttendanceStorage::open_in_memory().unwrap();
        let durable: Arc<dyn PendingStore> = Arc::new(storage.clone());
        Self::build(storage, members, durable)
    }

    /// Durable tier replaced (e.g. by one that always fails)
    pub fn with_durable(members: &[Member], durable: Arc<dyn PendingStore>) -> Self {
        let storage = AttendanceStorage::open_in_memory().unwrap();
        Self::build(storage, members, durable)
    }

    fn build(storage: AttendanceStorage, members: &[Member], durable: Arc<dyn PendingStore>) -> Self {
        for member in members {
            storage.put_member(member).unwrap();
        }
        storage.put_schedule(BRANCH, date(2), &day_slots()).unwrap();
        storage.put_schedule(BRANCH, date(3), &day_slots()).unwrap();

        let engine = CheckInEngine::new(storage.clone(), tz());
        let gateway = Arc::new(FlakyGateway::new(engine.clone()));
        let cache = Arc::new(MemberCache::new());
        cache.warm(storage.list_members().unwrap());

        let trigger = Arc::new(Notify::new());
        let policy = LivePolicy {
            timeout: Duration::from_millis(50),
            max_attempts: 2,
        };
        let offline = Arc::new(OfflineQueue::new(durable, cache.clone(), tz()).with_write_timeout(policy.timeout));
        let service = CheckInService::new(
            gateway.clone(),
            offline.clone(),
            storage.clone(),
            tz(),
            policy,
            trigger.clone(),
        );
        let reconciler = Reconciler::new(gateway.clone(), storage.clone(), offline.clone());

        Self {
            storage,
            engine,
            gateway,
            cache,
            offline,
            service,
            reconciler,
            trigger,
        }
    }

    pub fn member(&self, id: &str) -> Member {
        self.storage.get_member(id).unwrap().unwrap()
    }

    pub fn valid_records(&self, member_id: &str, day: u32) -> usize {
        self.storage.valid_sessions(member_id, date(day)).unwrap().len()
    }
}

pub fn request(member_id: &str, force: bool) -> shared::CheckInRequest {
    shared::CheckInRequest {
        member_id: member_id.to_string(),
        branch_id: BRANCH.to_string(),
        class_hint: None,
        force,
    }
}
