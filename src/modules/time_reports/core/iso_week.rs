use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ISO-8601 week: Monday start, week 1 holds the year's first Thursday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WeekKey {
    pub year: i32,
    pub week: u32,
}

impl WeekKey {
    pub fn new(year: i32, week: u32) -> Self {
        Self { year, week }
    }

    /// Week of `timestamp` read in its own offset, not in UTC.
    pub fn of(timestamp: &DateTime<FixedOffset>) -> Self {
        let iso = timestamp.date_naive().iso_week();
        Self::new(iso.year(), iso.week())
    }

    pub fn monday(&self) -> Option<NaiveDate> {
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon)
    }

    /// First and last instant of the week, in UTC.
    pub fn bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let monday = self.monday()?;
        let sunday = NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Sun)?;
        let start = Utc.from_utc_datetime(&monday.and_hms_opt(0, 0, 0)?);
        let end = Utc.from_utc_datetime(&sunday.and_hms_milli_opt(23, 59, 59, 999)?);
        Some((start, end))
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

/// Signed number of ISO weeks from the anchor week to `target`.
///
/// Returns `None` when the anchor week does not exist in its year or either
/// week lies outside the supported calendar range. A target before the
/// anchor yields a negative count.
pub fn weeks_since_anchor(target: WeekKey, anchor_year: i32, anchor_week: u32) -> Option<i64> {
    let anchor = NaiveDate::from_isoywd_opt(anchor_year, anchor_week, Weekday::Mon)?;
    let target = target.monday()?;
    Some(target.signed_duration_since(anchor).num_weeks())
}
