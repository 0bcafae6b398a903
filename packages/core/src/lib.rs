//! Barshelf Core - Ingredient Hierarchy
//!
//! This crate maintains the ingredient classification tree of a bar
//! (e.g. "Spirit > Whiskey > Bourbon") using materialized paths, so that
//! "every variant of Whiskey" is a single prefix query.
//!
//! # Architecture
//!
//! - **Materialized paths**: each node stores its ancestors as `.3.17.`
//! - **Transactional moves**: a move rewrites its whole subtree or nothing
//! - **Pluggable stores**: in-memory (tests, embedders) and libsql/Turso
//! - **Domain events**: committed changes are broadcast for observers
//!
//! # Modules
//!
//! - [`models`] - Data structures (IngredientNode, MaterializedPath, prices)
//! - [`db`] - Store traits, in-memory store and libsql integration
//! - [`services`] - HierarchyService and ShelfService
//! - [`config`] - Service configuration

pub mod config;
pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::HierarchyConfig;
pub use models::*;
pub use services::*;
