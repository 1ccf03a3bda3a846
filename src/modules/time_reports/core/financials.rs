// Financial calculator: turn week buckets into payable totals.
//
// Purpose
// - Per week totals, per (week, project) stats, weekly goals and multi-week
//   payment period progress.
//
// Responsibilities
// - Only payable minutes (entries not excluded by tag) reach an amount.
// - Payment periods are counted in ISO weeks from the project's anchor week;
//   weeks before the anchor take no part in period tracking.
// - A non-finite rate degrades to zero so no NaN ever reaches a total.
//
// Boundaries
// - Pure and stateless. Every call recomputes from the full bucket list,
//   because a settings change can move period boundaries retroactively.

use crate::modules::time_reports::core::iso_week::weeks_since_anchor;
use crate::modules::time_reports::core::settings::{BillingSettings, ProjectSettings};
use crate::modules::time_reports::core::time_entry::{ProjectId, ReferenceData};
use crate::modules::time_reports::core::week_aggregator::WeekBucket;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekData {
    #[serde(flatten)]
    pub bucket: WeekBucket,
    pub total_minutes: i64,
    pub total_hours: f64,
    pub total_amount: f64,
    pub project_stats: Vec<ProjectFinancialStat>,
    pub weekly_goals: Vec<WeeklyGoalProgress>,
    pub payment_periods: Vec<PaymentPeriodInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFinancialStat {
    pub project_id: Option<ProjectId>,
    pub name: String,
    pub minutes: i64,
    pub hours: f64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyGoalProgress {
    pub project_id: ProjectId,
    pub goal_hours: f64,
    pub hours: f64,
    pub remaining_hours: f64,
    pub over_goal: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentPeriodInfo {
    pub project_id: ProjectId,
    pub period_number: i64,
    pub week_in_period: i64,
    pub weeks_since_start: i64,
    /// Payable minutes of the whole period, across all its weeks.
    pub minutes: i64,
    pub hours: f64,
    pub goal_hours: Option<f64>,
    /// Amount earned on the project in this week alone.
    pub weekly_amount: f64,
    pub remaining_hours: Option<f64>,
    pub over_goal: Option<f64>,
}

/// Where a week sits inside a project's payment periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodPosition {
    pub weeks_since_start: i64,
    pub period_number: i64,
    pub week_in_period: i64,
}

pub fn period_position(bucket: &WeekBucket, settings: &ProjectSettings) -> Option<PeriodPosition> {
    if !settings.tracks_payment_periods() {
        return None;
    }
    let weeks_since_start =
        weeks_since_anchor(bucket.key(), settings.start_year, settings.start_week_number)?;
    if weeks_since_start < 0 {
        return None;
    }
    let length = i64::from(settings.payment_period_weeks);
    Some(PeriodPosition {
        weeks_since_start,
        period_number: weeks_since_start / length,
        week_in_period: weeks_since_start % length + 1,
    })
}

pub fn calculate_financials(
    weeks: &[WeekBucket],
    settings: &BillingSettings,
    reference_data: &ReferenceData,
) -> Vec<WeekData> {
    let rate = settings.effective_rate();
    let excluded = settings.excluded();

    let per_week_minutes: Vec<BTreeMap<Option<ProjectId>, i64>> = weeks
        .iter()
        .map(|bucket| {
            let mut minutes = BTreeMap::new();
            for enriched in &bucket.entries {
                if enriched.excluded || excluded.matches(&enriched.entry.tags) {
                    continue;
                }
                *minutes.entry(enriched.entry.project_id).or_insert(0) +=
                    enriched.duration_minutes;
            }
            minutes
        })
        .collect();

    let mut period_minutes: HashMap<(ProjectId, i64), i64> = HashMap::new();
    for (bucket, minutes) in weeks.iter().zip(&per_week_minutes) {
        for (project_id, project_settings) in &settings.project_settings {
            let Some(position) = period_position(bucket, project_settings) else {
                continue;
            };
            let spent = minutes.get(&Some(*project_id)).copied().unwrap_or(0);
            *period_minutes
                .entry((*project_id, position.period_number))
                .or_insert(0) += spent;
        }
    }

    weeks
        .iter()
        .zip(per_week_minutes)
        .map(|(bucket, minutes)| {
            let total_minutes: i64 = minutes.values().sum();

            let mut project_stats: Vec<ProjectFinancialStat> = minutes
                .iter()
                .map(|(project_id, &minutes)| ProjectFinancialStat {
                    project_id: *project_id,
                    name: reference_data.project_name(*project_id),
                    minutes,
                    hours: to_hours(minutes),
                    amount: minutes as f64 * rate,
                })
                .collect();
            project_stats.sort_by(|a, b| {
                b.minutes
                    .cmp(&a.minutes)
                    .then_with(|| a.name.cmp(&b.name))
            });

            let weekly_goals = settings
                .project_settings
                .iter()
                .filter_map(|(project_id, project_settings)| {
                    let goal_hours = project_settings.weekly_goal()?;
                    let spent = *minutes.get(&Some(*project_id))?;
                    let hours = to_hours(spent);
                    Some(WeeklyGoalProgress {
                        project_id: *project_id,
                        goal_hours,
                        hours,
                        remaining_hours: (goal_hours - hours).max(0.0),
                        over_goal: (hours - goal_hours).max(0.0),
                    })
                })
                .collect();

            let payment_periods = settings
                .project_settings
                .iter()
                .filter_map(|(project_id, project_settings)| {
                    let position = period_position(bucket, project_settings)?;
                    let spent_this_week = *minutes.get(&Some(*project_id))?;
                    let period_total = period_minutes
                        .get(&(*project_id, position.period_number))
                        .copied()
                        .unwrap_or(0);
                    let hours = to_hours(period_total);
                    let goal_hours = project_settings.period_goal(position.period_number);
                    Some(PaymentPeriodInfo {
                        project_id: *project_id,
                        period_number: position.period_number,
                        week_in_period: position.week_in_period,
                        weeks_since_start: position.weeks_since_start,
                        minutes: period_total,
                        hours,
                        goal_hours,
                        weekly_amount: spent_this_week as f64 * rate,
                        remaining_hours: goal_hours.map(|goal| (goal - hours).max(0.0)),
                        over_goal: goal_hours.map(|goal| (hours - goal).max(0.0)),
                    })
                })
                .collect();

            WeekData {
                bucket: bucket.clone(),
                total_minutes,
                total_hours: to_hours(total_minutes),
                total_amount: total_minutes as f64 * rate,
                project_stats,
                weekly_goals,
                payment_periods,
            }
        })
        .collect()
}

fn to_hours(minutes: i64) -> f64 {
    minutes as f64 / 60.0
}
