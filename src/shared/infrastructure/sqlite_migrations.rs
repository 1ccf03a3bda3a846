//! Versioned schema migrations for the local SQLite cache.
//!
//! Numbered SQL files are embedded at compile time. Each runs exactly once,
//! tracked by the `schema_version` table. Migrations are additive only.

use rusqlite::Connection;
use tracing::info;

pub struct Migration {
    pub version: i32,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("migrations/001_baseline.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("migrations/002_cached_weeks.sql"),
    },
];

fn ensure_schema_version_table(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("Failed to create schema_version table: {e}"))
}

pub fn current_version(conn: &Connection) -> Result<i32, String> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| format!("Failed to read schema version: {e}"))
}

/// Applies every pending migration and returns how many ran.
///
/// A database written by a newer build (higher version than any known
/// migration) is rejected rather than touched.
pub fn run_migrations(conn: &mut Connection, migrations: &[Migration]) -> Result<usize, String> {
    ensure_schema_version_table(conn)?;

    let current = current_version(conn)?;
    let max_known = migrations.last().map(|m| m.version).unwrap_or(0);
    if current > max_known {
        return Err(format!(
            "Database schema version ({current}) is newer than this build supports ({max_known})"
        ));
    }

    let pending: Vec<&Migration> = migrations.iter().filter(|m| m.version > current).collect();
    for migration in &pending {
        let tx = conn
            .transaction()
            .map_err(|e| format!("Failed to begin migration v{}: {e}", migration.version))?;
        tx.execute_batch(migration.sql)
            .map_err(|e| format!("Migration v{} failed: {e}", migration.version))?;
        tx.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [migration.version],
        )
        .map_err(|e| format!("Failed to record migration v{}: {e}", migration.version))?;
        tx.commit()
            .map_err(|e| format!("Failed to commit migration v{}: {e}", migration.version))?;
        info!(version = migration.version, "applied schema migration");
    }

    Ok(pending.len())
}
