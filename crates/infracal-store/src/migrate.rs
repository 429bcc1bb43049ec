//! Migration runner: applies named schema-change units exactly once.
//!
//! Each unit runs inside its own `BEGIN IMMEDIATE` transaction and is recorded
//! in the `migrations` table by filename. The tracking row is re-checked after
//! the write lock is held, so two processes starting against the same file
//! serialize instead of applying a unit twice.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::schema::{EMBEDDED_MIGRATIONS, MIGRATIONS_TABLE_SQL, REQUIRED_COLUMNS};
use infracal_core::{Error, Result};

/// One schema-change unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub filename: String,
    pub sql: String,
}

impl Migration {
    pub fn new(filename: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            sql: sql.into(),
        }
    }
}

/// A row of the tracking table.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedMigration {
    pub id: i64,
    pub filename: String,
    pub applied_at: String,
}

/// What a single `run` did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
}

/// Ordered set of units with unique filenames.
#[derive(Debug, Clone)]
pub struct Migrator {
    units: Vec<Migration>,
}

impl Migrator {
    /// Build a runner over `units`, sorted ascending by filename.
    ///
    /// Duplicate or empty filenames are rejected before anything touches a database.
    pub fn new(mut units: Vec<Migration>) -> Result<Self> {
        let mut seen = HashSet::new();
        for unit in &units {
            if unit.filename.trim().is_empty() {
                return Err(Error::Migration {
                    filename: unit.filename.clone(),
                    reason: "empty filename".into(),
                });
            }
            if !seen.insert(unit.filename.as_str()) {
                return Err(Error::Migration {
                    filename: unit.filename.clone(),
                    reason: "duplicate filename in unit list".into(),
                });
            }
        }
        units.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(Self { units })
    }

    /// The units compiled in from `migrations/`.
    pub fn embedded() -> Self {
        let mut units: Vec<Migration> = EMBEDDED_MIGRATIONS
            .iter()
            .map(|(filename, sql)| Migration::new(*filename, *sql))
            .collect();
        units.sort_by(|a, b| a.filename.cmp(&b.filename));
        Self { units }
    }

    pub fn units(&self) -> &[Migration] {
        &self.units
    }

    /// Apply every unit not yet recorded, in order. Halts on the first failure.
    pub fn run(&self, conn: &mut Connection) -> Result<MigrationReport> {
        conn.execute_batch(MIGRATIONS_TABLE_SQL)
            .map_err(|e| Error::Migration {
                filename: "migrations".into(),
                reason: format!("cannot create tracking table: {e}"),
            })?;

        let mut report = MigrationReport::default();
        for unit in &self.units {
            if apply_unit(conn, unit)? {
                info!("Applied migration {}", unit.filename);
                report.applied.push(unit.filename.clone());
            } else {
                debug!("Migration {} already applied", unit.filename);
                report.skipped.push(unit.filename.clone());
            }
        }
        Ok(report)
    }

    /// Filenames not yet recorded in `conn`.
    pub fn pending(&self, conn: &Connection) -> Result<Vec<String>> {
        let done: HashSet<String> = if table_exists(conn, "migrations")
            .map_err(|e| Error::Database(e.to_string()))?
        {
            applied(conn)?.into_iter().map(|m| m.filename).collect()
        } else {
            HashSet::new()
        };
        Ok(self
            .units
            .iter()
            .filter(|u| !done.contains(&u.filename))
            .map(|u| u.filename.clone())
            .collect())
    }
}

/// Returns `Ok(false)` when the unit was already recorded.
fn apply_unit(conn: &mut Connection, unit: &Migration) -> Result<bool> {
    let fail = |e: rusqlite::Error| {
        error!("Migration {} failed: {}", unit.filename, e);
        Error::Migration {
            filename: unit.filename.clone(),
            reason: e.to_string(),
        }
    };

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(fail)?;

    let recorded = tx
        .query_row(
            "SELECT id FROM migrations WHERE filename = ?1",
            params![unit.filename],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map_err(fail)?;
    if recorded.is_some() {
        return Ok(false);
    }

    // Dropping `tx` on any error below rolls the unit back.
    tx.execute_batch(&unit.sql).map_err(fail)?;
    tx.execute(
        "INSERT INTO migrations (filename) VALUES (?1)",
        params![unit.filename],
    )
    .map_err(fail)?;
    tx.commit().map_err(fail)?;
    Ok(true)
}

/// All recorded units in application order.
pub fn applied(conn: &Connection) -> Result<Vec<AppliedMigration>> {
    let mut stmt = conn
        .prepare("SELECT id, filename, applied_at FROM migrations ORDER BY id")
        .map_err(|e| Error::Database(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(AppliedMigration {
                id: row.get(0)?,
                filename: row.get(1)?,
                applied_at: row.get(2)?,
            })
        })
        .map_err(|e| Error::Database(e.to_string()))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Database(e.to_string()))
}

// ---------------------------------------------------------------
// Schema validation
// ---------------------------------------------------------------

/// Result of checking an existing database against the expected schema.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaReport {
    pub db_path: PathBuf,
    pub pages: i64,
    pub events: i64,
    pub valid_events: i64,
    pub applied_migrations: Vec<String>,
    pub pending_migrations: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl SchemaReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Open `db_path` read-only and report missing tables, missing columns,
/// pending units and orphaned events. Never writes.
pub fn validate_schema(db_path: &Path) -> SchemaReport {
    let mut report = SchemaReport {
        db_path: db_path.to_path_buf(),
        ..Default::default()
    };

    if !db_path.exists() {
        report
            .errors
            .push(format!("Database not found: {}", db_path.display()));
        return report;
    }

    let conn = match Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY) {
        Ok(c) => c,
        Err(e) => {
            report.errors.push(format!("Failed to open database: {}", e));
            return report;
        }
    };

    for (table, columns) in REQUIRED_COLUMNS {
        match table_exists(&conn, table) {
            Ok(true) => {
                let present = get_column_names(&conn, table);
                for col in *columns {
                    if !present.iter().any(|p| p == col) {
                        report
                            .errors
                            .push(format!("{} table missing column: {}", table, col));
                    }
                }
            }
            Ok(false) => report
                .errors
                .push(format!("Missing required table: {}", table)),
            Err(e) => report
                .errors
                .push(format!("Error checking table {}: {}", table, e)),
        }
    }

    match Migrator::embedded().pending(&conn) {
        Ok(pending) => {
            for filename in &pending {
                report
                    .warnings
                    .push(format!("Migration not applied: {}", filename));
            }
            report.pending_migrations = pending;
        }
        Err(e) => report.errors.push(e.to_string()),
    }
    if let Ok(done) = applied(&conn) {
        report.applied_migrations = done.into_iter().map(|m| m.filename).collect();
    }

    if !report.errors.is_empty() {
        return report;
    }

    report.pages = count_rows(&conn, "pages").unwrap_or(0);
    report.events = count_rows(&conn, "events").unwrap_or(0);
    report.valid_events = conn
        .query_row("SELECT COUNT(*) FROM events WHERE is_valid = 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    if let Ok(orphans) = conn.query_row(
        "SELECT COUNT(*) FROM events WHERE page_id NOT IN (SELECT page_id FROM pages)",
        [],
        |row| row.get::<_, i64>(0),
    ) {
        if orphans > 0 {
            report
                .errors
                .push(format!("{} events reference missing pages", orphans));
        }
    }

    if let Ok(unhashed) = conn.query_row(
        "SELECT COUNT(*) FROM events WHERE content_hash IS NULL",
        [],
        |row| row.get::<_, i64>(0),
    ) {
        if unhashed > 0 {
            report
                .warnings
                .push(format!("{} events have no content hash", unhashed));
        }
    }

    report
}

// Internal helpers

fn table_exists(conn: &Connection, table: &str) -> std::result::Result<bool, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn get_column_names(conn: &Connection, table: &str) -> Vec<String> {
    // Table names come from REQUIRED_COLUMNS only.
    let query = format!("PRAGMA table_info({})", table);
    let mut names = Vec::new();
    if let Ok(mut stmt) = conn.prepare(&query) {
        if let Ok(rows) = stmt.query_map([], |row| row.get::<_, String>(1)) {
            names.extend(rows.flatten());
        }
    }
    names
}

fn count_rows(conn: &Connection, table: &str) -> std::result::Result<i64, rusqlite::Error> {
    let query = format!("SELECT COUNT(*) FROM {}", table);
    conn.query_row(&query, [], |row| row.get(0))
}
