//! Membership rules
//!
//! Pure functions shared by the live transaction and the offline path:
//! validity, upcoming-membership activation, and the per-session ledger
//! update (credits, attendance count, streak).

use chrono::{Days, Months, NaiveDate};
use shared::DenialReason;
use shared::models::{Member, UpcomingMembership, UpcomingStart};

/// Outcome of a successful validity check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Current term covers the day
    Current,
    /// The queued term was activated to make the member eligible
    Activated,
}

/// Check the current term against `today` (venue-local)
///
/// Expiry is reported before an empty balance.
pub fn check_validity(member: &Member, today: NaiveDate) -> Result<(), DenialReason> {
    if let Some(end) = member.end_date
        && end < today
    {
        return Err(DenialReason::Expired);
    }
    if !member.credits.has_balance() {
        return Err(DenialReason::NoCredits);
    }
    Ok(())
}

/// Whether a queued term may start on `today`
pub fn upcoming_eligible(upcoming: &UpcomingMembership, today: NaiveDate) -> bool {
    match upcoming.start {
        UpcomingStart::On(start) => start <= today,
        // TBD terms start on first use
        UpcomingStart::Tbd => true,
    }
}

/// Promote the queued term into the primary fields and clear the queue
///
/// Returns `false` (member untouched) when nothing is queued or the queued
/// term cannot start yet.
pub fn activate_upcoming(member: &mut Member, today: NaiveDate) -> bool {
    let Some(upcoming) = member.upcoming_membership.as_ref() else {
        return false;
    };
    if !upcoming_eligible(upcoming, today) {
        return false;
    }

    let Some(upcoming) = member.upcoming_membership.take() else {
        return false;
    };
    let start = match upcoming.start {
        UpcomingStart::On(start) => start,
        UpcomingStart::Tbd => today,
    };
    let end = upcoming.end_date.or_else(|| {
        upcoming
            .duration_months
            .and_then(|months| start.checked_add_months(Months::new(months)))
            .and_then(|d| d.checked_sub_days(Days::new(1)))
    });

    tracing::info!(
        member_id = %member.id,
        membership_type = %upcoming.membership_type,
        start = %start,
        end = ?end,
        "Activating upcoming membership"
    );

    member.membership_type = upcoming.membership_type;
    member.start_date = Some(start);
    member.end_date = end;
    member.credits = upcoming.credits;
    true
}

/// Validity check with one activation retry
///
/// On success `member` may have been mutated by activation; on failure
/// the caller must discard the working copy.
pub fn ensure_eligible(member: &mut Member, today: NaiveDate) -> Result<Eligibility, DenialReason> {
    match check_validity(member, today) {
        Ok(()) => Ok(Eligibility::Current),
        Err(reason) => {
            if activate_upcoming(member, today) {
                check_validity(member, today).map(|()| Eligibility::Activated)
            } else {
                Err(reason)
            }
        }
    }
}

/// Streak after attending on `today`
pub fn next_streak(last_attendance: Option<NaiveDate>, streak: u32, today: NaiveDate) -> u32 {
    match last_attendance {
        Some(last) if last == today => streak.max(1),
        Some(last) if today.pred_opt() == Some(last) => streak + 1,
        _ => 1,
    }
}

/// Apply one consumed session to the member ledger
///
/// A session replayed for a day before `last_attendance` consumes its
/// credit but leaves the streak and last attendance untouched.
pub fn apply_session(member: &mut Member, today: NaiveDate) {
    member.credits = member.credits.consumed();
    member.attendance_count += 1;
    if member.last_attendance.is_some_and(|last| last > today) {
        return;
    }
    member.streak = next_streak(member.last_attendance, member.streak, today);
    member.last_attendance = Some(today);
}
