//! Retroactive schedule correction
//!
//! After an admin edits a past day's schedule, records attributed to the
//! old class title / instructor are rewritten to the new values. A record
//! is touched only while it still holds the old value, which makes a rerun
//! a no-op and leaves manual edits alone.

use chrono::{NaiveDate, NaiveTime, Timelike};
use shared::models::{AttendanceRecord, ClassSlot, Instructor};

use super::storage::{AttendanceStorage, StorageResult};

/// Records this close to a slot (before start / after end) belong to it
const CORRECTION_MARGIN_SECS: i64 = 30 * 60;

/// A title and/or instructor change for the slot at `time`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotCorrection {
    pub time: NaiveTime,
    pub duration: u32,
    pub old_title: String,
    pub old_instructor: Option<Instructor>,
    pub new_title: String,
    pub new_instructor: Option<Instructor>,
}

impl SlotCorrection {
    fn covers(&self, local_time: NaiveTime) -> bool {
        let start = i64::from(self.time.num_seconds_from_midnight());
        let end = start + i64::from(self.duration) * 60;
        let at = i64::from(local_time.num_seconds_from_midnight());
        start - CORRECTION_MARGIN_SECS <= at && at <= end + CORRECTION_MARGIN_SECS
    }

    fn still_old(&self, record: &AttendanceRecord) -> bool {
        record.class_name == self.old_title
            && same_instructor(record.instructor.as_ref(), self.old_instructor.as_ref())
    }

    /// Rewrite `record` if it falls in this slot and still holds the old value
    pub fn apply(&self, record: &mut AttendanceRecord) -> bool {
        if !self.covers(record.local_time) || !self.still_old(record) {
            return false;
        }
        record.class_name = self.new_title.clone();
        record.instructor = self.new_instructor.clone();
        true
    }
}

fn same_instructor(a: Option<&Instructor>, b: Option<&Instructor>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_as(b),
        _ => false,
    }
}

/// Pair slots by start time and collect title / instructor changes
pub fn diff_slots(old_slots: &[ClassSlot], new_slots: &[ClassSlot]) -> Vec<SlotCorrection> {
    old_slots
        .iter()
        .filter_map(|old| {
            let new = new_slots.iter().find(|s| s.time == old.time)?;
            let title_changed = old.title != new.title;
            let instructor_changed = !same_instructor(old.instructor.as_ref(), new.instructor.as_ref());
            if !title_changed && !instructor_changed {
                return None;
            }
            Some(SlotCorrection {
                time: old.time,
                duration: old.duration,
                old_title: old.title.clone(),
                old_instructor: old.instructor.clone(),
                new_title: new.title.clone(),
                new_instructor: new.instructor.clone(),
            })
        })
        .collect()
}

/// Apply corrections to a batch of records, returning the rewritten ones
///
/// Each record takes the first correction that matches.
pub fn apply_corrections(corrections: &[SlotCorrection], records: Vec<AttendanceRecord>) -> Vec<AttendanceRecord> {
    records
        .into_iter()
        .filter_map(|mut record| {
            corrections
                .iter()
                .any(|c| c.apply(&mut record))
                .then_some(record)
        })
        .collect()
}

/// `CorrectSchedule`: rewrite the day's records and return how many changed
pub fn correct_schedule(
    storage: &AttendanceStorage,
    branch_id: &str,
    date: NaiveDate,
    old_slots: &[ClassSlot],
    new_slots: &[ClassSlot],
) -> StorageResult<usize> {
    let corrections = diff_slots(old_slots, new_slots);
    if corrections.is_empty() {
        return Ok(0);
    }

    let records = storage.records_for_branch_day(branch_id, date)?;
    let updated = apply_corrections(&corrections, records);
    storage.update_records(&updated)?;

    tracing::info!(
        branch_id = %branch_id,
        date = %date,
        corrections = corrections.len(),
        updated = updated.len(),
        "Schedule correction applied"
    );
    Ok(updated.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::SyncMode;
    use shared::models::AttendanceStatus;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn record(id: &str, at: NaiveTime, class_name: &str, instructor: Option<&str>) -> AttendanceRecord {
        AttendanceRecord {
            id: id.to_string(),
            member_id: format!("member-{id}"),
            member_name: "Member".to_string(),
            branch_id: "gangnam".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            local_time: at,
            timestamp: 0,
            class_name: class_name.to_string(),
            instructor: instructor.map(|n| Instructor::LegacyName(n.to_string())),
            status: AttendanceStatus::Valid,
            denial_reason: None,
            is_multi_session: false,
            session_count: 1,
            sync_mode: SyncMode::Live,
            credits_after: None,
            created_at: 0,
        }
    }

    fn old_slots() -> Vec<ClassSlot> {
        vec![
            ClassSlot::new(t(10, 0), 60, "Flow").with_instructor(Instructor::LegacyName("Mina".into())),
            ClassSlot::new(t(19, 0), 60, "Yin"),
        ]
    }

    fn new_slots() -> Vec<ClassSlot> {
        vec![
            ClassSlot::new(t(10, 0), 60, "Vinyasa").with_instructor(Instructor::Profile {
                name: "Jiyoon".into(),
                phone: None,
                phone_last4: Some("5678".into()),
            }),
            ClassSlot::new(t(19, 0), 60, "Yin"),
        ]
    }

    #[test]
    fn test_diff_only_reports_changed_slots() {
        let corrections = diff_slots(&old_slots(), &new_slots());
        assert_eq!(corrections.len(), 1);
        assert_eq!(corrections[0].old_title, "Flow");
        assert_eq!(corrections[0].new_title, "Vinyasa");
        assert!(diff_slots(&old_slots(), &old_slots()).is_empty());
    }

    #[test]
    fn test_instructor_shape_change_is_not_a_correction() {
        let old = vec![ClassSlot::new(t(10, 0), 60, "Flow").with_instructor(Instructor::LegacyName("Mina".into()))];
        let new = vec![ClassSlot::new(t(10, 0), 60, "Flow").with_instructor(Instructor::Profile {
            name: "Mina".into(),
            phone: Some("010-0000-1111".into()),
            phone_last4: None,
        })];
        assert!(diff_slots(&old, &new).is_empty());
    }

    #[test]
    fn test_apply_respects_window_and_old_value_guard() {
        let corrections = diff_slots(&old_slots(), &new_slots());
        let records = vec![
            record("in-window", t(9, 35), "Flow", Some("Mina")),
            record("grace-end", t(11, 30), "Flow", Some("Mina")),
            record("too-late", t(11, 31), "Flow", Some("Mina")),
            record("manual-fix", t(10, 5), "Private", Some("Mina")),
            record("other-instructor", t(10, 5), "Flow", Some("Sora")),
        ];

        let updated = apply_corrections(&corrections, records);
        let ids: Vec<&str> = updated.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["in-window", "grace-end"]);
        assert_eq!(updated[0].class_name, "Vinyasa");
        assert_eq!(updated[0].instructor.as_ref().map(Instructor::name), Some("Jiyoon"));
    }

    #[test]
    fn test_correct_schedule_is_idempotent() {
        let storage = AttendanceStorage::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        storage.append_record(&record("r1", t(9, 50), "Flow", Some("Mina"))).unwrap();
        storage.append_record(&record("r2", t(19, 10), "Yin", None)).unwrap();

        let first = correct_schedule(&storage, "gangnam", date, &old_slots(), &new_slots()).unwrap();
        assert_eq!(first, 1);
        let second = correct_schedule(&storage, "gangnam", date, &old_slots(), &new_slots()).unwrap();
        assert_eq!(second, 0);

        let r1 = storage.get_record("r1").unwrap().unwrap();
        assert_eq!(r1.class_name, "Vinyasa");
        let r2 = storage.get_record("r2").unwrap().unwrap();
        assert_eq!(r2.class_name, "Yin");
    }
}
