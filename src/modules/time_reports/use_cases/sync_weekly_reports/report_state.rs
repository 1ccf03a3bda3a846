use crate::modules::time_reports::core::financials::WeekData;
use crate::modules::time_reports::core::sync_status::SyncStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure shown to the user next to whatever weeks are still on display.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ReportError {
    #[error("The time-tracking service rejected the credentials. Check the API URL and token: {0}")]
    Authentication(String),

    #[error("No cached data is available and the time-tracking service could not be reached: {0}")]
    NoCachedData(String),

    #[error("Local storage failed: {0}")]
    Store(String),
}

/// Everything a reader needs to render the weekly reports.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ReportState {
    /// Most recent week first.
    pub weeks: Vec<WeekData>,
    pub loading: bool,
    pub syncing: bool,
    pub error: Option<ReportError>,
    pub status: SyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Bumped on every publish.
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sync coordinator is no longer running")]
pub struct CoordinatorClosed;
