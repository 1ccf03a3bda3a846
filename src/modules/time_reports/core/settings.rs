// Billing inputs supplied by the settings collaborator.
//
// Purpose
// - Carry the hourly economics (rate, per-project goals and payment periods,
//   tag exclusions) into the financial calculator as one value.
//
// Boundaries
// - Never persisted by the core. The shell reads and writes the settings file.
// - Every numeric field that may originate from free text is sanitized before
//   it reaches a total.

use crate::modules::time_reports::core::time_entry::ProjectId;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingSettings {
    /// Accepts a number or free text such as `"12,5"`.
    #[serde(deserialize_with = "deserialize_rate")]
    pub rate_per_minute: f64,
    pub project_settings: BTreeMap<ProjectId, ProjectSettings>,
    pub excluded_tags: Vec<String>,
}

impl BillingSettings {
    pub fn with_rate(mut self, rate_per_minute: f64) -> Self {
        self.rate_per_minute = rate_per_minute;
        self
    }

    pub fn with_project(mut self, project_id: ProjectId, settings: ProjectSettings) -> Self {
        self.project_settings.insert(project_id, settings);
        self
    }

    pub fn with_excluded_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Rate with `NaN`, infinities and other garbage replaced by zero.
    pub fn effective_rate(&self) -> f64 {
        finite_or_zero(self.rate_per_minute)
    }

    pub fn excluded(&self) -> ExcludedTags {
        ExcludedTags::new(&self.excluded_tags)
    }

    /// Stable textual form used to tell whether a materialized cache was
    /// computed with these settings.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub enabled: bool,
    pub has_weekly_goal: bool,
    pub weekly_goal_hours: f64,
    pub has_payment_periods: bool,
    pub payment_period_weeks: u32,
    pub start_week_number: u32,
    pub start_year: i32,
    pub has_stages: bool,
    pub stages: Vec<Stage>,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            has_weekly_goal: false,
            weekly_goal_hours: 0.0,
            has_payment_periods: false,
            payment_period_weeks: 4,
            start_week_number: 1,
            start_year: 2024,
            has_stages: false,
            stages: Vec::new(),
        }
    }
}

impl ProjectSettings {
    pub fn weekly_goal(&self) -> Option<f64> {
        if !self.enabled || !self.has_weekly_goal {
            return None;
        }
        sanitize_goal(self.weekly_goal_hours)
    }

    pub fn tracks_payment_periods(&self) -> bool {
        self.enabled && self.has_payment_periods && self.payment_period_weeks > 0
    }

    /// Goal for the given period: the matching stage when stages are on (the
    /// last stage repeats), otherwise the weekly goal spread over the period.
    pub fn period_goal(&self, period_number: i64) -> Option<f64> {
        if self.has_stages && !self.stages.is_empty() {
            let index = usize::try_from(period_number)
                .unwrap_or(0)
                .min(self.stages.len() - 1);
            return sanitize_goal(self.stages[index].goal_hours);
        }
        self.weekly_goal()
            .map(|hours| hours * f64::from(self.payment_period_weeks))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Stage {
    pub name: String,
    pub goal_hours: f64,
}

/// Case-insensitive tag set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludedTags(BTreeSet<String>);

impl ExcludedTags {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            tags.into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        )
    }

    pub fn matches(&self, tags: &[String]) -> bool {
        !self.0.is_empty()
            && tags
                .iter()
                .any(|t| self.0.contains(&t.trim().to_lowercase()))
    }
}

/// Parses a rate typed into a free-text field. Accepts a decimal comma.
pub fn parse_rate(input: &str) -> f64 {
    input
        .trim()
        .replace(',', ".")
        .parse::<f64>()
        .map(finite_or_zero)
        .unwrap_or(0.0)
}

pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

fn deserialize_rate<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RateInput {
        Number(f64),
        Text(String),
        Null(Option<()>),
    }
    Ok(match RateInput::deserialize(deserializer)? {
        RateInput::Number(rate) => finite_or_zero(rate),
        RateInput::Text(text) => parse_rate(&text),
        RateInput::Null(_) => 0.0,
    })
}

fn sanitize_goal(hours: f64) -> Option<f64> {
    (hours.is_finite() && hours >= 0.0).then_some(hours)
}
