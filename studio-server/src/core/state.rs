use std::sync::Arc;
use tokio::sync::Notify;

use crate::attendance::notify::StaffNotifier;
use crate::attendance::{
    AttendanceStorage, CheckInEngine, CheckInGateway, CheckInService, MemberCache, OfflineQueue, PendingStore,
    ReconcileWorker, Reconciler,
};
use crate::core::event_router::EventRouter;
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::core::{Config, Result};

/// 缓存通道 buffer（关键，阻塞发送）
const CACHE_CHANNEL_BUFFER: usize = 1024;
/// 通知通道 buffer（best-effort）
const NOTIFY_CHANNEL_BUFFER: usize = 256;

/// 服务器状态 - 持有所有服务的单例引用
///
/// 使用 Arc 实现浅拷贝，clone 成本极低。
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项 (不可变) |
/// | storage | redb 存储 |
/// | engine | 签到事务引擎 + 事件通道 |
/// | cache | 会员投影缓存 |
/// | offline | 离线队列 (durable + local) |
/// | reconciler | 离线队列回放 |
/// | checkin | 终端签到服务 |
/// | sync_trigger | 唤醒 ReconcileWorker |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub storage: AttendanceStorage,
    pub engine: CheckInEngine,
    pub cache: Arc<MemberCache>,
    pub offline: Arc<OfflineQueue>,
    pub reconciler: Arc<Reconciler>,
    pub checkin: Arc<CheckInService>,
    pub sync_trigger: Arc<Notify>,
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 1. 工作目录结构
    /// 2. 数据库 (work_dir/database/checkin.redb)
    /// 3. 服务组装 + 会员缓存预热
    pub fn initialize(config: &Config) -> Result<Self> {
        config.ensure_work_dir_structure()?;
        let db_path = config.database_dir().join("checkin.redb");
        tracing::info!(path = %db_path.display(), "Opening attendance database");
        let storage = AttendanceStorage::open(&db_path)?;
        Self::with_storage(config.clone(), storage)
    }

    /// 使用已打开的存储组装状态 (测试用内存库)
    pub fn with_storage(config: Config, storage: AttendanceStorage) -> Result<Self> {
        let tz = config.venue_tz;
        let engine = CheckInEngine::new(storage.clone(), tz);
        let gateway: Arc<dyn CheckInGateway> = Arc::new(engine.clone());

        let cache = Arc::new(MemberCache::new());
        let warmed = cache.warm(storage.list_members()?);
        tracing::info!(members = warmed, "Member cache warmed");

        let durable: Arc<dyn PendingStore> = Arc::new(storage.clone());
        let offline = Arc::new(
            OfflineQueue::new(durable, cache.clone(), tz).with_write_timeout(config.live_policy().timeout),
        );
        let reconciler = Arc::new(Reconciler::new(gateway.clone(), storage.clone(), offline.clone()));
        let sync_trigger = Arc::new(Notify::new());
        let checkin = Arc::new(CheckInService::new(
            gateway,
            offline.clone(),
            storage.clone(),
            tz,
            config.live_policy(),
            sync_trigger.clone(),
        ));

        Ok(Self {
            config,
            storage,
            engine,
            cache,
            offline,
            reconciler,
            checkin,
            sync_trigger,
        })
    }

    /// 启动后台任务
    ///
    /// 必须在 `Server::run()` 之前调用
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();

        let (router, channels) = EventRouter::new(CACHE_CHANNEL_BUFFER, NOTIFY_CHANNEL_BUFFER);
        tasks.spawn("event_router", TaskKind::Worker, router.run(self.engine.subscribe()));
        tasks.spawn("member_cache", TaskKind::Listener, self.cache.clone().run(channels.cache_rx));
        tasks.spawn("staff_notifier", TaskKind::Listener, StaffNotifier::run(channels.notify_rx));

        let worker = ReconcileWorker::new(
            self.reconciler.clone(),
            self.sync_trigger.clone(),
            self.config.reconcile_interval(),
        );
        let token = tasks.shutdown_token();
        tasks.spawn("reconcile_worker", TaskKind::Periodic, worker.run(token));

        tasks.log_summary();
        tasks
    }
}
