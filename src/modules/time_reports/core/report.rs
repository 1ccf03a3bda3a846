use crate::modules::time_reports::core::financials::{WeekData, calculate_financials};
use crate::modules::time_reports::core::settings::BillingSettings;
use crate::modules::time_reports::core::time_entry::{ReferenceData, TimeEntry};
use crate::modules::time_reports::core::week_aggregator::group_by_week;
use chrono::{DateTime, Utc};

/// Raw entries to presentable weeks, most recent first.
pub fn build_weekly_report(
    entries: &[TimeEntry],
    reference_data: &ReferenceData,
    settings: &BillingSettings,
    now: DateTime<Utc>,
) -> Vec<WeekData> {
    let buckets = group_by_week(entries, &settings.excluded(), now);
    calculate_financials(&buckets, settings, reference_data)
}

/// Merges `incoming` into `current` by entry id. Incoming entries win.
pub fn upsert_entries(current: &[TimeEntry], incoming: &[TimeEntry]) -> Vec<TimeEntry> {
    let mut merged: std::collections::BTreeMap<_, _> =
        current.iter().map(|e| (e.id, e.clone())).collect();
    for entry in incoming {
        merged.insert(entry.id, entry.clone());
    }
    merged.into_values().collect()
}
