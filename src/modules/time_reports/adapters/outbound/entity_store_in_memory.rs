// In memory implementation of the EntityStore port.
//
// Purpose
// - Exercise the sync coordinator and the HTTP shell without a database.
//
// Responsibilities
// - Keep entities in ordered maps keyed by id.
// - Refuse every call until `init` ran, like the durable store.
// - Simulate an unavailable backend with `toggle_offline`.

use crate::modules::time_reports::adapters::outbound::entity_store::{EntityStore, StoreError};
use crate::modules::time_reports::core::financials::WeekData;
use crate::modules::time_reports::core::time_entry::{
    Activity, ActivityId, EntryId, Project, ProjectId, TimeEntry,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    entries: BTreeMap<EntryId, TimeEntry>,
    projects: BTreeMap<ProjectId, Project>,
    activities: BTreeMap<ActivityId, Activity>,
    metadata: HashMap<String, String>,
    cached_weeks: Vec<WeekData>,
}

#[derive(Default)]
pub struct InMemoryEntityStore {
    tables: RwLock<Tables>,
    initialized: AtomicBool,
    is_offline: AtomicBool,
    cached_weeks_writes: AtomicUsize,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_offline(&self) {
        self.is_offline.fetch_xor(true, Ordering::SeqCst);
    }

    /// Number of successful `save_cached_weeks` calls.
    pub fn cached_weeks_writes(&self) -> usize {
        self.cached_weeks_writes.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(StoreError::NotInitialized);
        }
        if self.is_offline.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("Entity store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn init(&self) -> Result<(), StoreError> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn get_entries(&self) -> Result<Vec<TimeEntry>, StoreError> {
        self.ensure_available()?;
        Ok(self.tables.read().await.entries.values().cloned().collect())
    }

    async fn save_entries(&self, entries: &[TimeEntry]) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut guard = self.tables.write().await;
        for entry in entries {
            guard.entries.insert(entry.id, entry.clone());
        }
        Ok(())
    }

    async fn get_projects(&self) -> Result<Vec<Project>, StoreError> {
        self.ensure_available()?;
        Ok(self.tables.read().await.projects.values().cloned().collect())
    }

    async fn save_projects(&self, projects: &[Project]) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut guard = self.tables.write().await;
        for project in projects {
            guard.projects.insert(project.id, project.clone());
        }
        Ok(())
    }

    async fn get_activities(&self) -> Result<Vec<Activity>, StoreError> {
        self.ensure_available()?;
        Ok(self.tables.read().await.activities.values().cloned().collect())
    }

    async fn save_activities(&self, activities: &[Activity]) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut guard = self.tables.write().await;
        for activity in activities {
            guard.activities.insert(activity.id, activity.clone());
        }
        Ok(())
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.ensure_available()?;
        Ok(self.tables.read().await.metadata.get(key).cloned())
    }

    async fn save_metadata(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.ensure_available()?;
        self.tables
            .write()
            .await
            .metadata
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_cached_weeks(&self) -> Result<Vec<WeekData>, StoreError> {
        self.ensure_available()?;
        let mut weeks = self.tables.read().await.cached_weeks.clone();
        weeks.sort_by(|a, b| b.bucket.key().cmp(&a.bucket.key()));
        Ok(weeks)
    }

    async fn save_cached_weeks(&self, weeks: &[WeekData]) -> Result<(), StoreError> {
        self.ensure_available()?;
        self.tables.write().await.cached_weeks = weeks.to_vec();
        self.cached_weeks_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        self.ensure_available()?;
        *self.tables.write().await = Tables::default();
        Ok(())
    }
}
