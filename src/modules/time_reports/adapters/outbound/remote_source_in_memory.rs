// In memory implementation of the RemoteSource port.
//
// Purpose
// - Drive the sync coordinator through success, failure and slow-network
//   paths without a server.
//
// Responsibilities
// - Serve entries whose begin falls inside the requested window.
// - Simulate an unreachable service (`toggle_offline`), rejected credentials
//   (`toggle_unauthorized`) and latency (`set_delay_ms`).
// - Count entry fetches so tests can assert that no network call happened.

use crate::modules::time_reports::adapters::outbound::remote_source::{
    FetchWindow, RemoteError, RemoteSource,
};
use crate::modules::time_reports::core::time_entry::{Activity, Project, TimeEntry};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryRemoteSource {
    entries: RwLock<Vec<TimeEntry>>,
    projects: RwLock<Vec<Project>>,
    activities: RwLock<Vec<Activity>>,
    is_offline: AtomicBool,
    is_unauthorized: AtomicBool,
    delay_ms: AtomicU64,
    entry_fetches: AtomicUsize,
}

impl InMemoryRemoteSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<TimeEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
            ..Self::default()
        }
    }

    pub async fn set_entries(&self, entries: Vec<TimeEntry>) {
        *self.entries.write().await = entries;
    }

    pub async fn set_reference_data(&self, projects: Vec<Project>, activities: Vec<Activity>) {
        *self.projects.write().await = projects;
        *self.activities.write().await = activities;
    }

    pub fn toggle_offline(&self) {
        self.is_offline.fetch_xor(true, Ordering::SeqCst);
    }

    pub fn toggle_unauthorized(&self) {
        self.is_unauthorized.fetch_xor(true, Ordering::SeqCst);
    }

    pub fn set_delay_ms(&self, ms: u64) {
        self.delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn entry_fetches(&self) -> usize {
        self.entry_fetches.load(Ordering::SeqCst)
    }

    fn availability(&self) -> Result<(), RemoteError> {
        if self.is_offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("Remote source offline".into()));
        }
        if self.is_unauthorized.load(Ordering::SeqCst) {
            return Err(RemoteError::Unauthorized(401));
        }
        Ok(())
    }

    async fn simulate_latency(&self) {
        let ms = self.delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl RemoteSource for InMemoryRemoteSource {
    async fn fetch_entries(&self, window: &FetchWindow) -> Result<Vec<TimeEntry>, RemoteError> {
        self.entry_fetches.fetch_add(1, Ordering::SeqCst);
        // Answer reflects the data as it was when the request went out.
        let outcome = self.availability();
        let snapshot: Vec<TimeEntry> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| window.contains(e.begin.with_timezone(&Utc)))
            .cloned()
            .collect();
        self.simulate_latency().await;
        outcome.map(|_| snapshot)
    }

    async fn fetch_projects(&self) -> Result<Vec<Project>, RemoteError> {
        self.availability()?;
        Ok(self.projects.read().await.clone())
    }

    async fn fetch_activities(&self) -> Result<Vec<Activity>, RemoteError> {
        self.availability()?;
        Ok(self.activities.read().await.clone())
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        self.availability()
    }
}
