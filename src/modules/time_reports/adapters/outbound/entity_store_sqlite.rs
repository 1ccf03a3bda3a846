// SQLite implementation of the EntityStore port.
//
// Purpose
// - Keep the last known data on disk so the reports open offline and after
//   a restart.
//
// Responsibilities
// - Own one connection, opened by `init` and migrated to the latest schema.
// - Run every statement on the blocking pool.
// - Store entities as JSON payloads next to the columns the schema indexes.
//   Indexed timestamps are UTC text so they sort; payloads keep the offset.

use crate::modules::time_reports::adapters::outbound::entity_store::{EntityStore, StoreError};
use crate::modules::time_reports::core::financials::WeekData;
use crate::modules::time_reports::core::time_entry::{Activity, Project, TimeEntry};
use crate::shared::infrastructure::sqlite_migrations::{MIGRATIONS, run_migrations};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub enum StoreLocation {
    File(PathBuf),
    Memory,
}

pub struct SqliteEntityStore {
    location: StoreLocation,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteEntityStore {
    pub fn new(location: StoreLocation) -> Self {
        Self {
            location,
            conn: Arc::new(Mutex::new(None)),
        }
    }

    pub fn open_at(path: impl Into<PathBuf>) -> Self {
        Self::new(StoreLocation::File(path.into()))
    }

    pub fn in_memory() -> Self {
        Self::new(StoreLocation::Memory)
    }

    async fn with_connection<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Backend("connection lock poisoned".into()))?;
            let conn = guard.as_mut().ok_or(StoreError::NotInitialized)?;
            f(conn)
        })
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
    }
}

fn open_connection(location: &StoreLocation) -> Result<Connection, StoreError> {
    let conn = match location {
        StoreLocation::Memory => Connection::open_in_memory()?,
        StoreLocation::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Migration(format!("Failed to create database directory: {e}"))
                })?;
            }
            Connection::open(path)?
        }
    };
    Ok(conn)
}

fn read_payloads<T: DeserializeOwned>(conn: &Connection, sql: &str) -> Result<Vec<T>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let payloads = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    payloads
        .iter()
        .map(|payload| serde_json::from_str(payload).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl EntityStore for SqliteEntityStore {
    async fn init(&self) -> Result<(), StoreError> {
        let location = self.location.clone();
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Backend("connection lock poisoned".into()))?;
            if guard.is_some() {
                return Ok(());
            }
            let mut connection = open_connection(&location)?;
            let applied =
                run_migrations(&mut connection, MIGRATIONS).map_err(StoreError::Migration)?;
            info!(?location, applied, "entity store ready");
            *guard = Some(connection);
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
    }

    async fn get_entries(&self) -> Result<Vec<TimeEntry>, StoreError> {
        self.with_connection(|conn| {
            read_payloads(conn, "SELECT payload FROM entries ORDER BY begin_at DESC, id DESC")
        })
        .await
    }

    async fn save_entries(&self, entries: &[TimeEntry]) -> Result<(), StoreError> {
        let entries = entries.to_vec();
        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO entries (id, begin_at, end_at, project_id, payload)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for entry in &entries {
                    stmt.execute(params![
                        entry.id,
                        entry.begin.with_timezone(&Utc).to_rfc3339(),
                        entry.end.map(|end| end.with_timezone(&Utc).to_rfc3339()),
                        entry.project_id,
                        serde_json::to_string(entry)?,
                    ])?;
                }
            }
            tx.commit()?;
            debug!(count = entries.len(), "saved entries");
            Ok(())
        })
        .await
    }

    async fn get_projects(&self) -> Result<Vec<Project>, StoreError> {
        self.with_connection(|conn| read_payloads(conn, "SELECT payload FROM projects ORDER BY id"))
            .await
    }

    async fn save_projects(&self, projects: &[Project]) -> Result<(), StoreError> {
        let projects = projects.to_vec();
        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO projects (id, name, payload) VALUES (?1, ?2, ?3)",
                )?;
                for project in &projects {
                    stmt.execute(params![
                        project.id,
                        project.name,
                        serde_json::to_string(project)?
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_activities(&self) -> Result<Vec<Activity>, StoreError> {
        self.with_connection(|conn| {
            read_payloads(conn, "SELECT payload FROM activities ORDER BY id")
        })
        .await
    }

    async fn save_activities(&self, activities: &[Activity]) -> Result<(), StoreError> {
        let activities = activities.to_vec();
        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO activities (id, name, payload) VALUES (?1, ?2, ?3)",
                )?;
                for activity in &activities {
                    stmt.execute(params![
                        activity.id,
                        activity.name,
                        serde_json::to_string(activity)?
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        self.with_connection(move |conn| {
            let value = conn
                .query_row("SELECT value FROM metadata WHERE key = ?1", [&key], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn save_metadata(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_cached_weeks(&self) -> Result<Vec<WeekData>, StoreError> {
        self.with_connection(|conn| {
            read_payloads(
                conn,
                "SELECT payload FROM cached_weeks ORDER BY year DESC, iso_week DESC",
            )
        })
        .await
    }

    async fn save_cached_weeks(&self, weeks: &[WeekData]) -> Result<(), StoreError> {
        let weeks = weeks.to_vec();
        self.with_connection(move |conn| {
            let computed_at = Utc::now().to_rfc3339();
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM cached_weeks", [])?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO cached_weeks (week_key, year, iso_week, payload, computed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for week in &weeks {
                    stmt.execute(params![
                        week.bucket.week_key,
                        week.bucket.year,
                        week.bucket.iso_week,
                        serde_json::to_string(week)?,
                        computed_at,
                    ])?;
                }
            }
            tx.commit()?;
            debug!(count = weeks.len(), "replaced cached weeks");
            Ok(())
        })
        .await
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "DELETE FROM entries;
                 DELETE FROM projects;
                 DELETE FROM activities;
                 DELETE FROM metadata;
                 DELETE FROM cached_weeks;",
            )?;
            Ok(())
        })
        .await
    }
}
