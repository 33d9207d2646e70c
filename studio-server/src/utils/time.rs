//! 时间工具函数: 场馆时区转换
//!
//! Check-in instants travel as UTC; calendar days and slot times are
//! always venue-local. Conversions happen here and nowhere else.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;

use super::{AppError, AppResult};

/// UTC instant → (venue-local day, venue-local time of day)
pub fn venue_local(instant: DateTime<Utc>, tz: Tz) -> (NaiveDate, NaiveTime) {
    let local = instant.with_timezone(&tz);
    (local.date_naive(), local.time())
}

/// Today in the venue time zone
pub fn venue_today(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

/// Venue-local day + time → UTC instant
///
/// DST gap fallback: 本地时间不存在时按 UTC 解释。
pub fn venue_instant(date: NaiveDate, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(time);
    naive
        .and_local_timezone(tz)
        .latest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

/// 解析日期字符串 (YYYY-MM-DD)
pub fn parse_date(date: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("Invalid date format: {}", date)))
}

/// 解析时间字符串 (HH:MM 或 HH:MM:SS)
pub fn parse_time(time: &str) -> AppResult<NaiveTime> {
    shared::models::serde_helpers::hhmm::parse(time).map_err(AppError::validation)
}

/// IANA zone name → `Tz`
pub fn parse_tz(name: &str) -> Result<Tz, String> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| format!("Unknown time zone: {}", name))
}
