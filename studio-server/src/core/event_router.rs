//! Event Router - 事件路由与分发
//!
//! 解耦 CheckInEngine 和各个订阅者，提供独立的通道。
//!
//! ```text
//! CheckInEngine (broadcast)
//!        │
//!        └── EventRouter
//!               ├── mpsc ──► MemberCache (member snapshots) [CRITICAL]
//!               └── mpsc ──► StaffNotifier (committed / denied) [best-effort]
//! ```
//!
//! ## 优先级策略
//!
//! - **Cache**: 离线路径依赖投影，阻塞发送保证不丢失
//! - **Notify**: Best-effort，满则丢弃（不阻塞关键路径）

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::attendance::AttendanceEvent;

/// 事件通道集合
pub struct EventChannels {
    /// 带会员快照的事件
    pub cache_rx: mpsc::Receiver<Arc<AttendanceEvent>>,
    /// 签到 / 拒绝事件
    pub notify_rx: mpsc::Receiver<Arc<AttendanceEvent>>,
}

/// 事件路由器
///
/// 订阅 CheckInEngine 的 broadcast，按类型分发到独立的 mpsc 通道。
pub struct EventRouter {
    cache_tx: mpsc::Sender<Arc<AttendanceEvent>>,
    notify_tx: mpsc::Sender<Arc<AttendanceEvent>>,
}

impl EventRouter {
    /// 创建路由器和通道
    ///
    /// - `cache_buffer`: 缓存通道 buffer（关键业务，建议较大）
    /// - `notify_buffer`: 通知通道 buffer（best-effort）
    pub fn new(cache_buffer: usize, notify_buffer: usize) -> (Self, EventChannels) {
        let (cache_tx, cache_rx) = mpsc::channel(cache_buffer);
        let (notify_tx, notify_rx) = mpsc::channel(notify_buffer);

        (Self { cache_tx, notify_tx }, EventChannels { cache_rx, notify_rx })
    }

    /// 运行路由器（阻塞直到源通道关闭）
    pub async fn run(self, mut source: broadcast::Receiver<AttendanceEvent>) {
        tracing::info!("Event router started");

        loop {
            match source.recv().await {
                Ok(event) => self.dispatch(event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // 缓存可能落后；下次事件或同步会按版本追上
                    tracing::error!(skipped = n, "Event router lagged! Member cache may be stale");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Source channel closed, event router stopping");
                    break;
                }
            }
        }
    }

    async fn dispatch(&self, event: AttendanceEvent) {
        let event = Arc::new(event);

        // 1. 缓存通道：阻塞发送
        if event.member().is_some() && self.cache_tx.send(Arc::clone(&event)).await.is_err() {
            tracing::error!("Cache channel closed - member projection will go stale!");
        }

        // 2. 通知通道：best-effort，满则丢弃
        if matches!(
            *event,
            AttendanceEvent::Committed { .. } | AttendanceEvent::Denied { .. }
        ) {
            match self.notify_tx.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(event = event.kind(), "Notify channel full, event dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!("Notify channel closed");
                }
            }
        }
    }
}
