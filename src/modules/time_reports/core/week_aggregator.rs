// Week aggregator: bucket raw entries into ISO weeks.
//
// Purpose
// - Derive one WeekBucket per (ISO year, ISO week) found in the input.
//
// Responsibilities
// - Assign every entry to the week of its `begin`, even when `end` falls in
//   the next week.
// - Compute the elapsed minutes of every entry, live for running entries.
// - Flag tag-excluded entries without dropping them.
// - Return buckets most recent first. Downstream code treats the first bucket
//   as the current week.
//
// Boundaries
// - Pure. The caller passes `now` so a running entry is measured against a
//   single instant for the whole pass.

use crate::modules::time_reports::core::iso_week::WeekKey;
use crate::modules::time_reports::core::settings::ExcludedTags;
use crate::modules::time_reports::core::time_entry::TimeEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedEntry {
    #[serde(flatten)]
    pub entry: TimeEntry,
    pub duration_minutes: i64,
    pub is_running: bool,
    pub excluded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekBucket {
    pub week_key: String,
    pub year: i32,
    pub iso_week: u32,
    pub start_of_week: DateTime<Utc>,
    pub end_of_week: DateTime<Utc>,
    pub entries: Vec<EnrichedEntry>,
    pub raw_total_minutes: i64,
}

impl WeekBucket {
    pub fn key(&self) -> WeekKey {
        WeekKey::new(self.year, self.iso_week)
    }

    pub fn payable_entries(&self) -> impl Iterator<Item = &EnrichedEntry> {
        self.entries.iter().filter(|e| !e.excluded)
    }
}

pub fn group_by_week(
    entries: &[TimeEntry],
    excluded_tags: &ExcludedTags,
    now: DateTime<Utc>,
) -> Vec<WeekBucket> {
    let mut grouped: BTreeMap<WeekKey, Vec<EnrichedEntry>> = BTreeMap::new();
    for entry in entries {
        grouped
            .entry(WeekKey::of(&entry.begin))
            .or_default()
            .push(EnrichedEntry {
                entry: entry.clone(),
                duration_minutes: entry.duration_minutes(now),
                is_running: entry.is_running(),
                excluded: excluded_tags.matches(&entry.tags),
            });
    }

    grouped
        .into_iter()
        .rev()
        .filter_map(|(key, mut entries)| {
            let (start_of_week, end_of_week) = key.bounds()?;
            entries.sort_by(|a, b| {
                b.entry
                    .begin
                    .cmp(&a.entry.begin)
                    .then_with(|| b.entry.id.cmp(&a.entry.id))
            });
            let raw_total_minutes = entries.iter().map(|e| e.duration_minutes).sum();
            Some(WeekBucket {
                week_key: key.to_string(),
                year: key.year,
                iso_week: key.week,
                start_of_week,
                end_of_week,
                entries,
                raw_total_minutes,
            })
        })
        .collect()
}
