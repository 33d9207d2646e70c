//! Staff notification forwarder
//!
//! Downstream consumer of attendance events. Delivery (push, SMS) belongs
//! to the notification service; this forwarder emits one structured log
//! line per event under the `notify` target, which that service tails.

use std::sync::Arc;
use tokio::sync::mpsc;

use super::events::AttendanceEvent;

pub struct StaffNotifier;

impl StaffNotifier {
    pub async fn run(mut rx: mpsc::Receiver<Arc<AttendanceEvent>>) {
        tracing::info!("Staff notification forwarder started");
        while let Some(event) = rx.recv().await {
            Self::forward(&event);
        }
        tracing::info!("Notification channel closed, forwarder stopping");
    }

    fn forward(event: &AttendanceEvent) {
        match event {
            AttendanceEvent::Committed { record, .. } => {
                tracing::info!(
                    target: "notify",
                    record_id = %record.id,
                    member_id = %record.member_id,
                    member_name = %record.member_name,
                    branch_id = %record.branch_id,
                    class_name = %record.class_name,
                    session_count = record.session_count,
                    credits_after = ?record.credits_after,
                    "Member checked in"
                );
            }
            AttendanceEvent::Denied { record } => {
                tracing::info!(
                    target: "notify",
                    record_id = %record.id,
                    member_id = %record.member_id,
                    member_name = %record.member_name,
                    branch_id = %record.branch_id,
                    reason = ?record.denial_reason,
                    "Check-in denied"
                );
            }
            // 其他事件不通知
            _ => {}
        }
    }
}
