// Shared test fixtures for time entries and reference data.

use crate::modules::time_reports::core::time_entry::{
    Activity, ActivityId, EntryId, Project, ProjectId, TimeEntry,
};
use chrono::{DateTime, FixedOffset, Utc};

pub fn at(timestamp: &str) -> DateTime<Utc> {
    parse(timestamp).with_timezone(&Utc)
}

fn parse(timestamp: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(timestamp).unwrap()
}

pub struct TimeEntryBuilder {
    inner: TimeEntry,
}

impl Default for TimeEntryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(dead_code)]
impl TimeEntryBuilder {
    pub fn new() -> Self {
        Self {
            inner: TimeEntry {
                id: 1,
                begin: parse("2024-01-01T09:00:00+00:00"),
                end: Some(parse("2024-01-01T10:00:00+00:00")),
                project_id: Some(1),
                activity_id: Some(1),
                description: None,
                tags: Vec::new(),
            },
        }
    }

    pub fn id(mut self, v: EntryId) -> Self {
        self.inner.id = v;
        self
    }

    /// An `end` that would now precede `begin` moves to one hour after it.
    pub fn begin(mut self, v: &str) -> Self {
        self.inner.begin = parse(v);
        if self.inner.end.is_some_and(|end| end < self.inner.begin) {
            self.inner.end = Some(self.inner.begin + chrono::Duration::hours(1));
        }
        self
    }

    pub fn end(mut self, v: &str) -> Self {
        self.inner.end = Some(parse(v));
        self
    }

    pub fn running(mut self) -> Self {
        self.inner.end = None;
        self
    }

    pub fn project(mut self, v: ProjectId) -> Self {
        self.inner.project_id = Some(v);
        self
    }

    pub fn no_project(mut self) -> Self {
        self.inner.project_id = None;
        self
    }

    pub fn activity(mut self, v: ActivityId) -> Self {
        self.inner.activity_id = Some(v);
        self
    }

    pub fn description(mut self, v: impl Into<String>) -> Self {
        self.inner.description = Some(v.into());
        self
    }

    pub fn tags(mut self, v: &[&str]) -> Self {
        self.inner.tags = v.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn build(self) -> TimeEntry {
        self.inner
    }
}

pub fn acme_projects() -> Vec<Project> {
    vec![Project::new(1, "Acme"), Project::new(2, "Globex")]
}

pub fn development_activities() -> Vec<Activity> {
    vec![Activity::new(1, "Development"), Activity::new(2, "Meetings")]
}

#[cfg(test)]
mod time_entry_builder_tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn it_should_build_a_finished_one_hour_entry_by_default() {
        let entry = TimeEntryBuilder::default().build();
        assert_eq!(entry.id, 1);
        assert_eq!(entry.duration_minutes(at("2030-01-01T00:00:00+00:00")), 60);
        assert_eq!(entry.project_id, Some(1));
    }

    #[rstest]
    fn it_should_keep_the_entry_finished_when_only_begin_moves() {
        let entry = TimeEntryBuilder::new().begin("2024-01-16T09:00:00+00:00").build();
        assert_eq!(entry.end, Some(parse("2024-01-16T10:00:00+00:00")));
    }
}
