//! Reporting intervals: MMWR epidemiological weeks.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use shared::domain::Interval;

/// Default reporting zone, West Africa Time.
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 1;

/// Sunday that starts week 1: the week holding at least four days of January.
fn week_one_start(year: i32) -> Option<NaiveDate> {
    let jan_first = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let from_sunday = i64::from(jan_first.weekday().num_days_from_sunday());
    if from_sunday <= 3 {
        Some(jan_first - Duration::days(from_sunday))
    } else {
        Some(jan_first + Duration::days(7 - from_sunday))
    }
}

pub fn epi_week(date: NaiveDate) -> Interval {
    let year = date.year();
    for candidate in [year + 1, year, year - 1] {
        if let Some(start) = week_one_start(candidate) {
            if start <= date {
                let week = (date - start).num_days() / 7 + 1;
                return Interval {
                    year: candidate,
                    week: week as u32,
                };
            }
        }
    }
    Interval { year, week: 1 }
}

/// Interval containing `now` as seen from the reporting zone.
pub fn interval_at(now: DateTime<Utc>, offset: FixedOffset) -> Interval {
    epi_week(now.with_timezone(&offset).date_naive())
}

/// Midnight of the interval's first Sunday in the reporting zone.
pub fn interval_start(interval: Interval, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let start = week_one_start(interval.year)?
        + Duration::weeks(i64::from(interval.week.saturating_sub(1)));
    let local = offset
        .from_local_datetime(&start.and_hms_opt(0, 0, 0)?)
        .single()?;
    Some(local.with_timezone(&Utc))
}

pub fn reporting_offset(hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(hours.checked_mul(3600)?)
}

#[cfg(test)]
#[path = "tests/interval_tests.rs"]
mod tests;
