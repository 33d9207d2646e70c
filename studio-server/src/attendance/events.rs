//! Attendance events
//!
//! Published by [`CheckInEngine`](super::CheckInEngine) on a broadcast
//! channel after each committed write. Subscribers (member cache, staff
//! notifications) receive them through the event router.

use chrono::NaiveDate;
use shared::models::{AttendanceRecord, Member};

#[derive(Debug, Clone)]
pub enum AttendanceEvent {
    /// A credit-consuming session was committed
    Committed {
        record: AttendanceRecord,
        member: Member,
    },
    /// A denied attempt was recorded; the member is unchanged
    Denied { record: AttendanceRecord },
    /// A record was deleted; `member` is set when a credit was refunded
    Refunded {
        record_id: String,
        member: Option<Member>,
    },
    /// The member directory replaced a member document
    MemberUpdated { member: Member },
    /// A retroactive schedule correction rewrote records
    Corrected {
        branch_id: String,
        date: NaiveDate,
        updated: usize,
    },
}

impl AttendanceEvent {
    /// Member snapshot carried by the event, if any
    pub fn member(&self) -> Option<&Member> {
        match self {
            AttendanceEvent::Committed { member, .. } | AttendanceEvent::MemberUpdated { member } => {
                Some(member)
            }
            AttendanceEvent::Refunded { member, .. } => member.as_ref(),
            AttendanceEvent::Denied { .. } | AttendanceEvent::Corrected { .. } => None,
        }
    }

    /// Event name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            AttendanceEvent::Committed { .. } => "committed",
            AttendanceEvent::Denied { .. } => "denied",
            AttendanceEvent::Refunded { .. } => "refunded",
            AttendanceEvent::MemberUpdated { .. } => "member_updated",
            AttendanceEvent::Corrected { .. } => "corrected",
        }
    }
}
