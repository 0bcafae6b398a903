//! HierarchyStore Trait - Repository Abstraction Layer
//!
//! This module defines the repository interface `HierarchyService` runs
//! against. Storage internals are out of scope for the hierarchy logic; any
//! transactional backend can implement these two traits.
//!
//! # Architecture
//!
//! - **`HierarchyStore`**: shared handle, only opens transactions
//! - **`HierarchyTransaction`**: every read and write of a hierarchy operation
//!   goes through one transaction handle, so the transaction scope is explicit
//!   in the type system instead of being probed at runtime
//!
//! # Design Decisions
//!
//! 1. **Async-First**: All methods are async so embedded (libsql) and in-memory
//!    backends share one interface
//! 2. **Commit consumes the handle**: `commit(self)`/`rollback(self)` end the
//!    transaction; dropping an uncommitted handle discards its writes
//! 3. **Prefix queries**: `find_by_path_prefix` is the `LIKE 'prefix%'`
//!    primitive descendant sets are built on
//! 4. **Isolation is the backend's job**: no in-memory locking happens in the
//!    service layer
//!
//! # Examples
//!
//! ```rust
//! use barshelf_core::db::{HierarchyStore, HierarchyTransaction, MemoryStore};
//! use barshelf_core::models::NewIngredient;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//!
//! let mut tx = store.begin().await?;
//! let spirit = tx.insert(NewIngredient::new("Spirit"), None).await?;
//! tx.commit().await?;
//!
//! let mut tx = store.begin().await?;
//! assert_eq!(tx.load(spirit.id).await?.unwrap().name, "Spirit");
//! # Ok(())
//! # }
//! ```

use crate::db::error::StoreResult;
use crate::models::{IngredientId, IngredientNode, MaterializedPath, NewIngredient, PathError};
use async_trait::async_trait;

/// Hierarchy columns of a stored row, read without validating the path
///
/// Repair walks use this to reach rows whose stored path no longer parses;
/// every other read surfaces such rows as `StoreError::MalformedPath`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPlacement {
    pub id: IngredientId,
    pub parent_id: Option<IngredientId>,
    pub materialized_path: Result<Option<MaterializedPath>, PathError>,
}

impl StoredPlacement {
    /// Whether the stored path is exactly `expected`
    pub fn has_path(&self, expected: Option<&MaterializedPath>) -> bool {
        matches!(&self.materialized_path, Ok(stored) if stored.as_ref() == expected)
    }
}

/// Opens transactions against the backing store
///
/// Implementations must be `Send + Sync` so a service holding one can be
/// shared across tasks.
#[async_trait]
pub trait HierarchyStore: Send + Sync {
    type Transaction: HierarchyTransaction;

    /// Begin a transaction
    ///
    /// Writes made through the returned handle become visible to other
    /// transactions only after `commit`.
    async fn begin(&self) -> StoreResult<Self::Transaction>;
}

/// One unit of work against the store
#[async_trait]
pub trait HierarchyTransaction: Send {
    /// Load a node by id
    ///
    /// - `Ok(Some(node))` if the node exists
    /// - `Ok(None)` if it doesn't (not an error)
    async fn load(&mut self, id: IngredientId) -> StoreResult<Option<IngredientNode>>;

    /// All nodes whose path starts with `prefix`
    ///
    /// Order is unspecified.
    async fn find_by_path_prefix(
        &mut self,
        prefix: &MaterializedPath,
    ) -> StoreResult<Vec<IngredientNode>>;

    /// Direct children of `parent_id` (by `parent_id`, not by path)
    async fn find_children(&mut self, parent_id: IngredientId) -> StoreResult<Vec<IngredientNode>>;

    /// All nodes with no parent
    async fn find_roots(&mut self) -> StoreResult<Vec<IngredientNode>>;

    /// Direct children of `parent_id`, tolerating unparseable paths
    async fn find_children_raw(
        &mut self,
        parent_id: IngredientId,
    ) -> StoreResult<Vec<StoredPlacement>>;

    /// All roots, tolerating unparseable paths
    async fn find_roots_raw(&mut self) -> StoreResult<Vec<StoredPlacement>>;

    /// Overwrite only `parent_id` and `materialized_path` of a node
    ///
    /// Works on rows whose stored path is malformed, which `save` cannot
    /// reach because such rows never load.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if no node with `id` exists
    async fn set_placement(
        &mut self,
        id: IngredientId,
        parent_id: Option<IngredientId>,
        path: Option<&MaterializedPath>,
    ) -> StoreResult<()>;

    /// Insert a new node and assign its id
    ///
    /// `path` must already be derived from the parent; the store does not
    /// validate hierarchy invariants.
    async fn insert(
        &mut self,
        node: NewIngredient,
        path: Option<MaterializedPath>,
    ) -> StoreResult<IngredientNode>;

    /// Persist every field of an existing node
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if no node with `node.id` exists
    async fn save(&mut self, node: &IngredientNode) -> StoreResult<()>;

    /// Delete a node record (never cascades)
    ///
    /// Returns whether the node existed. Deleting a missing node succeeds.
    async fn delete(&mut self, id: IngredientId) -> StoreResult<bool>;

    /// Make all writes of this transaction visible
    async fn commit(self) -> StoreResult<()>;

    /// Discard all writes of this transaction
    async fn rollback(self) -> StoreResult<()>;

    /// Whether writes through this handle are atomic
    ///
    /// Handles that write straight through (e.g. a caller-managed connection
    /// already inside a larger unit of work, or an autocommit handle) return
    /// `false`; the hierarchy service then reports a transaction precondition
    /// warning before multi-row rewrites.
    fn is_transactional(&self) -> bool {
        true
    }
}
