use crate::modules::time_reports::core::financials::WeekData;
use crate::modules::time_reports::core::time_entry::{Activity, Project, TimeEntry};
use async_trait::async_trait;
use thiserror::Error;

/// Metadata key holding the RFC 3339 instant of the last successful refresh.
pub const LAST_SYNC_KEY: &str = "lastSyncTimestamp";
/// Metadata key holding the settings fingerprint of the materialized weeks.
pub const CACHED_WEEKS_SETTINGS_KEY: &str = "cachedWeeksSettings";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entity store not initialized")]
    NotInitialized,

    #[error("entity store backend: {0}")]
    Backend(String),

    #[error("schema migration failed: {0}")]
    Migration(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Local faults that no retry or network state will fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::NotInitialized | StoreError::Migration(_))
    }
}

/// Durable home of raw entities, metadata and the materialized week cache.
///
/// Saves are upserts keyed by id. `save_cached_weeks` replaces the whole
/// cache atomically. Reads hand out owned copies.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn init(&self) -> Result<(), StoreError>;

    async fn get_entries(&self) -> Result<Vec<TimeEntry>, StoreError>;
    async fn save_entries(&self, entries: &[TimeEntry]) -> Result<(), StoreError>;

    async fn get_projects(&self) -> Result<Vec<Project>, StoreError>;
    async fn save_projects(&self, projects: &[Project]) -> Result<(), StoreError>;

    async fn get_activities(&self) -> Result<Vec<Activity>, StoreError>;
    async fn save_activities(&self, activities: &[Activity]) -> Result<(), StoreError>;

    async fn get_metadata(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn save_metadata(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Most recent week first.
    async fn get_cached_weeks(&self) -> Result<Vec<WeekData>, StoreError>;
    async fn save_cached_weeks(&self, weeks: &[WeekData]) -> Result<(), StoreError>;

    async fn clear_all(&self) -> Result<(), StoreError>;
}
