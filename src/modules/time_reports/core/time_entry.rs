// Raw entities mirrored from the remote time-tracking service.
//
// Purpose
// - TimeEntry, Project and Activity exactly as the entity store keeps them.
//
// Boundaries
// - No input or output. Durations are derived here but never written back.
//
// Timestamps
// - `begin` and `end` keep the UTC offset the service reported, so week
//   membership follows the wall clock of whoever booked the entry.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type EntryId = i64;
pub type ProjectId = i64;
pub type ActivityId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: EntryId,
    pub begin: DateTime<FixedOffset>,
    pub end: Option<DateTime<FixedOffset>>,
    pub project_id: Option<ProjectId>,
    pub activity_id: Option<ActivityId>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TimeEntry {
    pub fn is_running(&self) -> bool {
        self.end.is_none()
    }

    /// Whole elapsed minutes, measured against `now` while the entry is running.
    /// Negative spans (clock skew, end before begin) collapse to zero.
    pub fn duration_minutes(&self, now: DateTime<Utc>) -> i64 {
        let end = match self.end {
            Some(end) => end.with_timezone(&Utc),
            None => now,
        };
        let elapsed = end.signed_duration_since(self.begin.with_timezone(&Utc));
        elapsed.num_minutes().max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Project {
    pub fn new(id: ProjectId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub name: String,
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Activity {
    pub fn new(id: ActivityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            project_id: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Lookup tables used to put names on project and activity references.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    projects: HashMap<ProjectId, Project>,
    activities: HashMap<ActivityId, Activity>,
}

impl ReferenceData {
    pub fn new(projects: Vec<Project>, activities: Vec<Activity>) -> Self {
        Self {
            projects: projects.into_iter().map(|p| (p.id, p)).collect(),
            activities: activities.into_iter().map(|a| (a.id, a)).collect(),
        }
    }

    pub fn project(&self, id: ProjectId) -> Option<&Project> {
        self.projects.get(&id)
    }

    pub fn activity(&self, id: ActivityId) -> Option<&Activity> {
        self.activities.get(&id)
    }

    pub fn project_name(&self, id: Option<ProjectId>) -> String {
        match id {
            None => NO_PROJECT_NAME.to_string(),
            Some(id) => self
                .project(id)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| format!("Project #{id}")),
        }
    }
}

pub const NO_PROJECT_NAME: &str = "No project";
