//! Submission-time windows.
//!
//! arXiv announces on a US Eastern business calendar: the daily cutover for new
//! submissions is 14:00 America/New_York, not UTC midnight. A window therefore
//! ends at an anchor date's local cutover (converted to UTC) and reaches back a
//! whole number of days.

use crate::{Error, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::America::New_York;
use dailypapers_core::FetchWindow;

pub const CUTOVER_HOUR: u32 = 14;

/// UTC instant of `date` at the local cutover hour.
pub fn cutover_utc(date: NaiveDate) -> Result<DateTime<Utc>> {
    let local = date
        .and_hms_opt(CUTOVER_HOUR, 0, 0)
        .ok_or_else(|| Error::Config(format!("invalid cutover time for {date}")))?;
    let zoned = New_York
        .from_local_datetime(&local)
        .earliest()
        .ok_or_else(|| Error::Config(format!("{local} does not exist in America/New_York")))?;
    Ok(zoned.with_timezone(&Utc))
}

/// Window ending at `anchor`'s cutover and spanning `days` days.
pub fn window_ending_on(anchor: NaiveDate, days: u32) -> Result<FetchWindow> {
    if days == 0 {
        return Err(Error::Config("window duration must be at least one day".to_string()));
    }
    let end = cutover_utc(anchor)?;
    Ok(FetchWindow {
        start: end - Duration::days(i64::from(days)),
        end,
        anchor,
        days,
    })
}

/// Window from `from`'s cutover to `to`'s cutover (used by backfills).
pub fn window_between(from: NaiveDate, to: NaiveDate) -> Result<FetchWindow> {
    let days = (to - from).num_days();
    if days < 1 {
        return Err(Error::Config(format!(
            "backfill range must span at least one day (from {from} to {to})"
        )));
    }
    window_ending_on(to, days as u32)
}

/// Anchor date and lookback for a scheduler firing on `today`.
///
/// Papers are announced Monday through Friday, so:
/// - Sunday: the Thursday-to-Friday window (ends two days back).
/// - Monday: Friday to Monday, three days ending today.
/// - otherwise: the one day ending yesterday.
pub fn schedule_lookback(today: NaiveDate) -> (NaiveDate, u32) {
    match today.weekday() {
        Weekday::Sun => (today - Duration::days(2), 1),
        Weekday::Mon => (today, 3),
        _ => (today - Duration::days(1), 1),
    }
}

pub fn scheduled_window(today: NaiveDate) -> Result<FetchWindow> {
    let (anchor, days) = schedule_lookback(today);
    window_ending_on(anchor, days)
}
