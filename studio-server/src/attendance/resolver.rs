//! Schedule Resolver
//!
//! Pure functions mapping (schedule, venue-local time) to the class a
//! check-in is attributed to. No I/O, no clock access.
//!
//! Rules, first match wins (times relative to each slot's start/end):
//!
//! ```text
//! 1. Upcoming        [start-30m, start)
//! 2. In progress     [start, end)      → next slot if its pre-class window began
//! 3. Early bird      [start-60m, start-30m) and the previous slot is not running
//! 4. Post-class      [end, end+30m]    (latest slot first)
//! 5. Self-practice
//! ```

use chrono::{NaiveTime, Timelike};
use shared::models::ClassSlot;
use shared::{ResolveReason, ResolvedClass};

/// Pre-class window (seconds)
const PRE_CLASS_SECS: i64 = 30 * 60;
/// Early-bird window opens this long before start (seconds)
const EARLY_BIRD_SECS: i64 = 60 * 60;
/// Post-class grace (seconds)
const POST_CLASS_SECS: i64 = 30 * 60;

/// A non-cancelled slot with its bounds in seconds since midnight
struct Window<'a> {
    slot: &'a ClassSlot,
    start: i64,
    end: i64,
}

impl Window<'_> {
    fn running_at(&self, now: i64) -> bool {
        self.start <= now && now < self.end
    }

    fn pre_class_at(&self, now: i64) -> bool {
        self.start - PRE_CLASS_SECS <= now && now < self.start
    }

    fn early_bird_at(&self, now: i64) -> bool {
        self.start - EARLY_BIRD_SECS <= now && now < self.start - PRE_CLASS_SECS
    }

    fn grace_at(&self, now: i64) -> bool {
        self.end <= now && now <= self.end + POST_CLASS_SECS
    }
}

fn windows(slots: &[ClassSlot]) -> Vec<Window<'_>> {
    let mut windows: Vec<Window<'_>> = slots
        .iter()
        .filter(|s| !s.is_cancelled())
        .map(|slot| {
            let start = slot.start_minute() * 60;
            Window {
                slot,
                start,
                end: start + i64::from(slot.duration) * 60,
            }
        })
        .collect();
    windows.sort_by_key(|w| w.start);
    windows
}

/// Resolve the class for a check-in at venue-local `now`
pub fn resolve_class(slots: &[ClassSlot], now: NaiveTime) -> ResolvedClass {
    let now = i64::from(now.num_seconds_from_midnight());
    let windows = windows(slots);

    // 1. Upcoming
    if let Some(w) = windows.iter().find(|w| w.pre_class_at(now)) {
        return ResolvedClass::matched(w.slot.clone(), ResolveReason::Upcoming);
    }

    // 2. In progress, preferring the next slot once its pre-class window opened
    if let Some(i) = windows.iter().position(|w| w.running_at(now)) {
        if let Some(next) = windows.get(i + 1)
            && now >= next.start - PRE_CLASS_SECS
        {
            return ResolvedClass::matched(next.slot.clone(), ResolveReason::NextClassLookAhead);
        }
        return ResolvedClass::matched(windows[i].slot.clone(), ResolveReason::InProgress);
    }

    // 3. Early bird; a class still running already returned at rule 2
    if let Some(w) = windows.iter().find(|w| w.early_bird_at(now)) {
        return ResolvedClass::matched(w.slot.clone(), ResolveReason::EarlyBird);
    }

    // 4. Post-class grace, most recent first
    if let Some(w) = windows.iter().rev().find(|w| w.grace_at(now)) {
        return ResolvedClass::matched(w.slot.clone(), ResolveReason::PostClassGrace);
    }

    ResolvedClass::self_practice()
}

/// Look up a kiosk-selected class by title among non-cancelled slots
pub fn resolve_hint(slots: &[ClassSlot], hint: &str) -> Option<ResolvedClass> {
    let hint = hint.trim();
    if hint.is_empty() {
        return None;
    }
    slots
        .iter()
        .filter(|s| !s.is_cancelled())
        .find(|s| s.title.trim().eq_ignore_ascii_case(hint))
        .map(|slot| ResolvedClass::matched(slot.clone(), ResolveReason::Hinted))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn slot(h: u32, m: u32, duration: u32, title: &str) -> ClassSlot {
        ClassSlot::new(t(h, m), duration, title)
    }

    /// 10:00 Flow (60), 12:00 Core (50), 19:00 Yin (60)
    fn day_schedule() -> Vec<ClassSlot> {
        vec![
            slot(19, 0, 60, "Yin"),
            slot(10, 0, 60, "Flow"),
            slot(12, 0, 50, "Core"),
        ]
    }

    fn title(resolved: &ResolvedClass) -> &str {
        resolved.class_name()
    }

    #[test]
    fn test_pre_class_window() {
        let r = resolve_class(&day_schedule(), t(9, 40));
        assert_eq!(title(&r), "Flow");
        assert_eq!(r.reason, ResolveReason::Upcoming);

        // Exactly 30 minutes before counts
        let r = resolve_class(&day_schedule(), t(9, 30));
        assert_eq!(r.reason, ResolveReason::Upcoming);
    }

    #[test]
    fn test_in_progress() {
        let r = resolve_class(&day_schedule(), t(10, 20));
        assert_eq!(title(&r), "Flow");
        assert_eq!(r.reason, ResolveReason::InProgress);
    }

    #[test]
    fn test_early_bird() {
        let r = resolve_class(&day_schedule(), t(18, 5));
        assert_eq!(title(&r), "Yin");
        assert_eq!(r.reason, ResolveReason::EarlyBird);
    }

    #[test]
    fn test_running_class_wins_over_early_bird() {
        // 11:00-12:30 Long runs while 12:45 Core's early-bird window is open
        let slots = vec![slot(11, 0, 90, "Long"), slot(12, 45, 50, "Core")];
        let r = resolve_class(&slots, t(11, 50));
        assert_eq!(title(&r), "Long");
        assert_eq!(r.reason, ResolveReason::InProgress);
    }

    #[test]
    fn test_post_class_grace() {
        let r = resolve_class(&day_schedule(), t(20, 15));
        assert_eq!(title(&r), "Yin");
        assert_eq!(r.reason, ResolveReason::PostClassGrace);

        // Grace end is inclusive
        let r = resolve_class(&day_schedule(), t(20, 30));
        assert_eq!(r.reason, ResolveReason::PostClassGrace);
        assert!(resolve_class(&day_schedule(), t(20, 31)).is_self_practice());
    }

    #[test]
    fn test_early_bird_beats_grace() {
        // 11:15 is in Flow's grace and in Core's early-bird window
        let r = resolve_class(&day_schedule(), t(11, 15));
        assert_eq!(title(&r), "Core");
        assert_eq!(r.reason, ResolveReason::EarlyBird);
    }

    #[test]
    fn test_grace_prefers_latest_slot() {
        let slots = vec![slot(9, 0, 60, "Early"), slot(9, 20, 45, "Late")];
        // Early ended 10:00, Late ended 10:05; both in grace at 10:10
        let r = resolve_class(&slots, t(10, 10));
        assert_eq!(title(&r), "Late");
    }

    #[test]
    fn test_overlapping_slots_look_ahead() {
        // Second class starts while the first is still running
        let slots = vec![slot(10, 0, 90, "Long"), slot(11, 0, 60, "Next")];
        let r = resolve_class(&slots, t(11, 10));
        assert_eq!(title(&r), "Next");
        assert_eq!(r.reason, ResolveReason::NextClassLookAhead);
    }

    #[test]
    fn test_back_to_back_prefers_upcoming() {
        // 10:00-11:00 then 11:00; at 10:45 the next class's window is open
        let slots = vec![slot(10, 0, 60, "First"), slot(11, 0, 60, "Second")];
        let r = resolve_class(&slots, t(10, 45));
        assert_eq!(title(&r), "Second");
    }

    #[test]
    fn test_cancelled_slots_ignored() {
        let slots = vec![slot(10, 0, 60, "Flow").cancelled()];
        let r = resolve_class(&slots, t(9, 45));
        assert!(r.is_self_practice());
    }

    #[test]
    fn test_no_match_is_self_practice() {
        let r = resolve_class(&day_schedule(), t(15, 0));
        assert!(r.is_self_practice());
        assert_eq!(r.reason, ResolveReason::NoneMatched);
        assert_eq!(title(&r), shared::checkin::SELF_PRACTICE);

        assert!(resolve_class(&[], t(10, 0)).is_self_practice());
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let slots = day_schedule();
        for minute in (0..24 * 60).step_by(7) {
            let now = t(minute / 60, minute % 60);
            assert_eq!(resolve_class(&slots, now), resolve_class(&slots, now));
        }
    }

    #[test]
    fn test_hint_lookup() {
        let slots = vec![slot(10, 0, 60, "Flow"), slot(12, 0, 60, "Core").cancelled()];
        let r = resolve_hint(&slots, " flow ").unwrap();
        assert_eq!(title(&r), "Flow");
        assert_eq!(r.reason, ResolveReason::Hinted);
        assert!(resolve_hint(&slots, "Core").is_none());
        assert!(resolve_hint(&slots, "").is_none());
    }
}
