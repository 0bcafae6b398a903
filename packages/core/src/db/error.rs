//! Store Error Types
//!
//! This module defines error types for repository operations, providing
//! clear error handling for connection, query, transaction and row-decoding
//! failures. Hierarchy-level errors are handled by `services::HierarchyError`.

use crate::models::PathError;
use std::path::PathBuf;
use thiserror::Error;

/// Repository operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to establish database connection
    #[cfg(feature = "turso")]
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[cfg(feature = "turso")]
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// A stored row could not be turned into an `IngredientNode`
    #[error("Corrupt ingredient row {id}: {reason}")]
    CorruptRow { id: i64, reason: String },

    /// A stored materialized path does not parse
    #[error("Ingredient {id} has a malformed path: {source}")]
    MalformedPath { id: i64, source: PathError },

    /// Save/delete targeted a record that does not exist
    #[error("Ingredient {id} does not exist")]
    NotFound { id: i64 },

    /// Begin/commit/rollback failed
    #[error("Transaction failed: {context}")]
    TransactionFailed { context: String },

    /// Failure injected by `MemoryStore::fail_after_writes`
    #[error("Injected store failure after {writes} writes")]
    Injected { writes: usize },
}

impl StoreError {
    /// Create a connection failed error
    #[cfg(feature = "turso")]
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    pub fn corrupt_row(id: i64, reason: impl Into<String>) -> Self {
        Self::CorruptRow {
            id,
            reason: reason.into(),
        }
    }

    pub fn transaction_failed(context: impl Into<String>) -> Self {
        Self::TransactionFailed {
            context: context.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
