//! Database Connection Management
//!
//! This module provides the database connection and schema initialization
//! for the embedded libsql/Turso backend.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf
//! - **WAL mode**: Write-Ahead Logging for better concurrency
//! - **Foreign keys**: `parent_id` references `ingredients(id)`
//! - **Path index**: `materialized_path` is indexed (default BINARY collation)
//!   and descendant lookups query the half-open range `[prefix, successor)`,
//!   which SQLite serves from the index; `LIKE` would not use it
//!
//! # Database Connection Patterns
//!
//! **ALWAYS use `connect_with_timeout()` in async functions** so concurrent
//! writers wait on the busy timeout instead of failing with `SQLITE_BUSY`.
//!
//! ```no_run
//! # use barshelf_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/barshelf.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::db::error::StoreError;
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Database service for managing the libsql connection and schema
#[derive(Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

impl std::fmt::Debug for DatabaseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseService")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, StoreError> {
        let is_new_database = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        StoreError::permission_denied(db_path.clone())
                    } else {
                        StoreError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| StoreError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema(is_new_database).await?;

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), StoreError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            StoreError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            StoreError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// Idempotent: safe to call on an existing database.
    ///
    /// # Schema
    ///
    /// - `ingredients` table: hierarchy fields plus domain attributes
    /// - Indexes: `materialized_path`, `parent_id`, `name`
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), StoreError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS ingredients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                parent_id INTEGER,
                -- Ancestors root-first, e.g. '.3.17.'; NULL for roots
                materialized_path TEXT,
                name TEXT NOT NULL,
                description TEXT,
                strength REAL,
                origin TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                -- Children are reparented before a delete, never cascaded
                FOREIGN KEY (parent_id) REFERENCES ingredients(id) ON DELETE RESTRICT
            )",
            (),
        )
        .await
        .map_err(|e| {
            StoreError::initialization_failed(format!("Failed to create ingredients table: {}", e))
        })?;

        for (name, column) in [
            ("idx_ingredients_path", "materialized_path"),
            ("idx_ingredients_parent", "parent_id"),
            ("idx_ingredients_name", "name"),
        ] {
            conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS {} ON ingredients({})",
                    name, column
                ),
                (),
            )
            .await
            .map_err(|e| {
                StoreError::initialization_failed(format!("Failed to create {}: {}", name, e))
            })?;
        }

        // Flush schema to disk for fresh files so rapid reopen in tests sees it
        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    /// Synchronous connect; prefer `connect_with_timeout()` in async code
    pub fn connect(&self) -> Result<libsql::Connection, StoreError> {
        self.db.connect().map_err(StoreError::LibsqlError)
    }

    /// Get an async connection with busy timeout and foreign keys configured
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, StoreError> {
        let conn = self.connect()?;

        // Wait up to 5s on a locked database instead of failing immediately
        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;

        // Per-connection setting in SQLite
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }
}
