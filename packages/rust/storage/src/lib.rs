//! libSQL storage layer for the experimental results database.
//!
//! The [`Storage`] struct wraps a local libSQL database holding reagents,
//! experiments, candidate assemblies, processed NMR and MS data, their
//! interpretations, and the ledger of ingested raw data files.
//!
//! **Access rules:**
//! - CLI commands that write: read-write via [`Storage::open`]
//! - Reporting commands: read-only via [`Storage::open_readonly`]

mod experiments;
mod migrations;
mod ms;
mod nmr;
mod raw_data;
mod reagents;

use std::future::Future;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use libsql::{Connection, Database, Row, params};
use supramol_shared::{Result, SupramolError};

pub use experiments::ExperimentSummary;
pub use reagents::DescriptorValue;

/// Storage format for naive timestamps (experiment dates).
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Storage format for calendar dates (raw data acquisition dates).
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Tables reported by [`Storage::table_counts`], in schema order.
pub const TABLES: &[&str] = &[
    "ion",
    "reagent",
    "descriptor",
    "reagent_descriptor",
    "experiment",
    "topology",
    "assembly",
    "nmr_processing_params",
    "nmr_processed_data",
    "nmr_peaks_ppm",
    "nmr_decision_params",
    "nmr_interpretation",
    "ms_processing_params",
    "ms_processed_data",
    "mz_observed",
    "mz_predicted",
    "mz_tolerance",
    "mz_match",
    "ms_decision_params",
    "ms_interpretation",
    "raw_data_file",
];

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SupramolError::io(parent, e))?;
        }

        let storage = Self::connect(path, false).await?;
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SupramolError::Storage(format!(
                "database {} does not exist",
                path.display()
            )));
        }
        Self::connect(path, true).await
    }

    async fn connect(path: &Path, readonly: bool) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .await
            .map_err(storage_err)?;

        Ok(Self { db, conn, readonly })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        SupramolError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    pub async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(SupramolError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Run an `INSERT` and return the new row id.
    async fn insert(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<i64> {
        self.check_writable()?;
        self.conn.execute(sql, params).await.map_err(storage_err)?;
        Ok(self.conn.last_insert_rowid())
    }

    // -----------------------------------------------------------------------
    // Savepoints
    // -----------------------------------------------------------------------

    /// Open a savepoint. Outside a transaction this starts one.
    ///
    /// `name` must be a plain SQL identifier.
    pub async fn savepoint(&self, name: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute_batch(&format!("SAVEPOINT {name};"))
            .await
            .map(|_| ())
            .map_err(storage_err)
    }

    /// Commit everything written since the matching [`Storage::savepoint`].
    pub async fn release(&self, name: &str) -> Result<()> {
        self.conn
            .execute_batch(&format!("RELEASE {name};"))
            .await
            .map(|_| ())
            .map_err(storage_err)
    }

    /// Discard everything written since the matching [`Storage::savepoint`].
    pub async fn rollback_to(&self, name: &str) -> Result<()> {
        self.conn
            .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};"))
            .await
            .map(|_| ())
            .map_err(storage_err)
    }

    /// Run `f` inside a savepoint: released on success, rolled back on error.
    pub async fn in_savepoint<T, F, Fut>(&self, name: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.savepoint(name).await?;
        match f().await {
            Ok(value) => {
                self.release(name).await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.rollback_to(name).await {
                    tracing::warn!(savepoint = name, error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Summary
    // -----------------------------------------------------------------------

    /// Row counts for every table in [`TABLES`].
    pub async fn table_counts(&self) -> Result<Vec<(&'static str, i64)>> {
        let mut counts = Vec::with_capacity(TABLES.len());
        for table in TABLES {
            let mut rows = self
                .conn
                .query(&format!("SELECT COUNT(*) FROM {table}"), params![])
                .await
                .map_err(storage_err)?;
            let count = match rows.next().await.map_err(storage_err)? {
                Some(row) => col_i64(&row, 0)?,
                None => 0,
            };
            counts.push((*table, count));
        }
        Ok(counts)
    }
}

// ---------------------------------------------------------------------------
// Row and error helpers
// ---------------------------------------------------------------------------

/// Convert a libSQL error, singling out constraint violations.
pub(crate) fn storage_err(e: libsql::Error) -> SupramolError {
    let message = e.to_string();
    if message.contains("constraint failed") {
        SupramolError::Integrity(message)
    } else {
        SupramolError::Storage(message)
    }
}

pub(crate) fn col_i64(row: &Row, idx: i32) -> Result<i64> {
    row.get::<i64>(idx).map_err(storage_err)
}

pub(crate) fn col_f64(row: &Row, idx: i32) -> Result<f64> {
    row.get::<f64>(idx).map_err(storage_err)
}

pub(crate) fn col_string(row: &Row, idx: i32) -> Result<String> {
    row.get::<String>(idx).map_err(storage_err)
}

pub(crate) fn col_bool(row: &Row, idx: i32) -> Result<bool> {
    Ok(col_i64(row, idx)? != 0)
}

/// Nullable column; NULL reads as `None`.
pub(crate) fn col_opt_string(row: &Row, idx: i32) -> Option<String> {
    row.get::<String>(idx).ok()
}

/// Nullable column; NULL reads as `None`.
pub(crate) fn col_opt_i64(row: &Row, idx: i32) -> Option<i64> {
    row.get::<i64>(idx).ok()
}

pub(crate) fn col_datetime(row: &Row, idx: i32) -> Result<NaiveDateTime> {
    let s = col_string(row, idx)?;
    NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT)
        .map_err(|e| SupramolError::Storage(format!("invalid date '{s}': {e}")))
}

pub(crate) fn col_date(row: &Row, idx: i32) -> Result<NaiveDate> {
    let s = col_string(row, idx)?;
    NaiveDate::parse_from_str(&s, DATE_FORMAT)
        .map_err(|e| SupramolError::Storage(format!("invalid date '{s}': {e}")))
}

pub(crate) fn col_timestamp(row: &Row, idx: i32) -> Result<DateTime<Utc>> {
    let s = col_string(row, idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SupramolError::Storage(format!("invalid timestamp '{s}': {e}")))
}

pub(crate) fn fmt_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

pub(crate) fn fmt_date(d: &NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Storage;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    pub(crate) async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("supramol_test_{}.db", Uuid::new_v4()));
        Storage::open(&tmp).await.expect("open test db")
    }
}
