//! Database Layer
//!
//! Repository interface and implementations for the ingredient hierarchy:
//!
//! - `HierarchyStore` / `HierarchyTransaction` - the repository contract
//! - `MemoryStore` - in-memory backend with serialised transactions
//! - `TursoStore` - embedded libsql backend (feature `turso`, default)
//! - Domain events broadcast after committed hierarchy changes
//!
//! # Architecture
//!
//! The hierarchy service never touches a connection directly: every read and
//! write goes through a transaction handle, and atomicity of a subtree move is
//! whatever the backend's transaction provides.

mod error;
pub mod events;
mod memory_store;
mod store;

#[cfg(feature = "turso")]
mod database;
#[cfg(feature = "turso")]
mod turso_store;

pub use error::{StoreError, StoreResult};
pub use events::DomainEvent;
pub use memory_store::{MemoryStore, MemoryTransaction};
pub use store::{HierarchyStore, HierarchyTransaction, StoredPlacement};

#[cfg(feature = "turso")]
pub use database::DatabaseService;
#[cfg(feature = "turso")]
pub use turso_store::{TursoStore, TursoTransaction};
