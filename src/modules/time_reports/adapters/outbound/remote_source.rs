use crate::modules::time_reports::core::time_entry::{Activity, Project, TimeEntry};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use thiserror::Error;
use tracing::warn;

pub const PAGE_SIZE: usize = 50;
/// Upper bound on pages per fetch, so a misbehaving server cannot loop us.
pub const MAX_PAGES: usize = 200;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote rejected the credentials (HTTP {0})")]
    Unauthorized(u16),

    #[error("remote returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("could not decode remote payload: {0}")]
    Decode(String),

    #[error("remote source not configured: {0}")]
    NotConfigured(String),
}

impl RemoteError {
    /// Needs the user to fix credentials or configuration; retrying is useless.
    pub fn is_auth(&self) -> bool {
        matches!(self, RemoteError::Unauthorized(_) | RemoteError::NotConfigured(_))
    }

    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Network(_) | RemoteError::Timeout => true,
            RemoteError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Time range requested from the remote, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    pub fn last_days(now: DateTime<Utc>, days: i64) -> Self {
        Self {
            start: now - Duration::days(days),
            end: now,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// Local wall-clock form the timesheet API expects in query strings.
    pub fn query_bounds(&self) -> (String, String) {
        const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
        (
            self.start.format(FORMAT).to_string(),
            self.end.format(FORMAT).to_string(),
        )
    }
}

/// Read side of the remote time-tracking service.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch_entries(&self, window: &FetchWindow) -> Result<Vec<TimeEntry>, RemoteError>;
    async fn fetch_projects(&self) -> Result<Vec<Project>, RemoteError>;
    async fn fetch_activities(&self) -> Result<Vec<Activity>, RemoteError>;
    /// Cheapest request that proves the service is reachable and accepts us.
    async fn ping(&self) -> Result<(), RemoteError>;
}

/// Walks pages starting at 1 until a page comes back short or empty. A page
/// larger than `PAGE_SIZE` means the server ignored paging and sent it all.
pub async fn collect_pages<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>, RemoteError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Vec<T>, RemoteError>>,
{
    let mut collected = Vec::new();
    for page in 1..=MAX_PAGES {
        let items = fetch_page(page).await?;
        let count = items.len();
        collected.extend(items);
        if count != PAGE_SIZE {
            return Ok(collected);
        }
    }
    warn!(max_pages = MAX_PAGES, "stopped paginating at the page cap");
    Ok(collected)
}
