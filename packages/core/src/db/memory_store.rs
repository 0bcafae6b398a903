//! MemoryStore - In-Memory HierarchyStore
//!
//! A `BTreeMap`-backed store with real transaction semantics:
//!
//! - `begin()` takes the store-wide lock and stages writes on a copy of the
//!   data; `commit()` publishes the copy, `rollback()`/drop discards it
//! - Transactions are serialised by the lock, which gives the strongest
//!   isolation level (a move's descendant snapshot can't go stale mid-move)
//! - `direct()` hands out a write-through, non-transactional handle
//!
//! Used by the test suites and by embedders that keep the catalogue in
//! memory. Fault injection (`fail_after_writes`) lets tests break a move
//! partway through its descendant rewrites.

use crate::db::error::{StoreError, StoreResult};
use crate::db::store::{HierarchyStore, HierarchyTransaction, StoredPlacement};
use crate::models::{IngredientId, IngredientNode, MaterializedPath, NewIngredient};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

const NO_FAULT: usize = usize::MAX;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    nodes: BTreeMap<IngredientId, IngredientNode>,
    last_id: i64,
}

/// In-memory store with serialised transactions
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    /// Fail the N-th write (0-based) of every transaction; `NO_FAULT` disables
    fail_after: Arc<AtomicUsize>,
    /// Writes attempted through any handle since creation
    write_count: Arc<AtomicUsize>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            fail_after: Arc::new(AtomicUsize::new(NO_FAULT)),
            write_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make every transaction fail once it has performed `writes` writes
    ///
    /// `fail_after_writes(0)` fails the first write.
    pub fn fail_after_writes(&self, writes: usize) {
        self.fail_after.store(writes, Ordering::SeqCst);
    }

    pub fn clear_failures(&self) {
        self.fail_after.store(NO_FAULT, Ordering::SeqCst);
    }

    /// Total writes attempted (insert/save/delete) across all handles
    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }

    /// Committed state, ordered by id
    pub async fn snapshot(&self) -> Vec<IngredientNode> {
        self.state.lock().await.nodes.values().cloned().collect()
    }

    /// Write a record verbatim, bypassing all hierarchy rules
    ///
    /// Simulates bulk external mutation (restores from partial data, manual
    /// fixes) so repair paths can be exercised.
    pub async fn put_raw(&self, node: IngredientNode) {
        let mut state = self.state.lock().await;
        state.last_id = state.last_id.max(node.id.0);
        state.nodes.insert(node.id, node);
    }

    /// Write-through handle that is not transactional
    ///
    /// Writes are visible immediately and `rollback` cannot undo them.
    pub async fn direct(&self) -> MemoryTransaction {
        MemoryTransaction {
            guard: self.state.clone().lock_owned().await,
            staged: None,
            writes: 0,
            fail_after: self.fail_after.load(Ordering::SeqCst),
            write_count: self.write_count.clone(),
        }
    }
}

#[async_trait]
impl HierarchyStore for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> StoreResult<MemoryTransaction> {
        let guard = self.state.clone().lock_owned().await;
        let staged = Some(guard.clone());
        Ok(MemoryTransaction {
            guard,
            staged,
            writes: 0,
            fail_after: self.fail_after.load(Ordering::SeqCst),
            write_count: self.write_count.clone(),
        })
    }
}

/// Transaction handle for [`MemoryStore`]
///
/// Holds the store lock until committed, rolled back or dropped.
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    /// `None` for write-through handles
    staged: Option<MemoryState>,
    writes: usize,
    fail_after: usize,
    write_count: Arc<AtomicUsize>,
}

impl MemoryTransaction {
    fn state(&self) -> &MemoryState {
        match &self.staged {
            Some(staged) => staged,
            None => &*self.guard,
        }
    }

    fn state_mut(&mut self) -> &mut MemoryState {
        match &mut self.staged {
            Some(staged) => staged,
            None => &mut *self.guard,
        }
    }

    fn record_write(&mut self) -> StoreResult<()> {
        self.write_count.fetch_add(1, Ordering::SeqCst);
        if self.writes >= self.fail_after {
            return Err(StoreError::Injected {
                writes: self.writes,
            });
        }
        self.writes += 1;
        Ok(())
    }

    fn collect<F>(&self, predicate: F) -> Vec<IngredientNode>
    where
        F: Fn(&IngredientNode) -> bool,
    {
        self.state()
            .nodes
            .values()
            .filter(|n| predicate(n))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl HierarchyTransaction for MemoryTransaction {
    async fn load(&mut self, id: IngredientId) -> StoreResult<Option<IngredientNode>> {
        Ok(self.state().nodes.get(&id).cloned())
    }

    async fn find_by_path_prefix(
        &mut self,
        prefix: &MaterializedPath,
    ) -> StoreResult<Vec<IngredientNode>> {
        Ok(self.collect(|n| {
            n.materialized_path
                .as_ref()
                .is_some_and(|p| p.starts_with(prefix))
        }))
    }

    async fn find_children(&mut self, parent_id: IngredientId) -> StoreResult<Vec<IngredientNode>> {
        Ok(self.collect(|n| n.parent_id == Some(parent_id)))
    }

    async fn find_roots(&mut self) -> StoreResult<Vec<IngredientNode>> {
        Ok(self.collect(|n| n.parent_id.is_none()))
    }

    // Paths are typed here, so raw reads never see a malformed one
    async fn find_children_raw(
        &mut self,
        parent_id: IngredientId,
    ) -> StoreResult<Vec<StoredPlacement>> {
        Ok(self
            .collect(|n| n.parent_id == Some(parent_id))
            .into_iter()
            .map(placement_of)
            .collect())
    }

    async fn find_roots_raw(&mut self) -> StoreResult<Vec<StoredPlacement>> {
        Ok(self
            .collect(|n| n.parent_id.is_none())
            .into_iter()
            .map(placement_of)
            .collect())
    }

    async fn set_placement(
        &mut self,
        id: IngredientId,
        parent_id: Option<IngredientId>,
        path: Option<&MaterializedPath>,
    ) -> StoreResult<()> {
        self.record_write()?;

        let node = self
            .state_mut()
            .nodes
            .get_mut(&id)
            .ok_or(StoreError::NotFound { id: id.0 })?;
        node.parent_id = parent_id;
        node.materialized_path = path.cloned();
        node.updated_at = Utc::now();
        Ok(())
    }

    async fn insert(
        &mut self,
        node: NewIngredient,
        path: Option<MaterializedPath>,
    ) -> StoreResult<IngredientNode> {
        self.record_write()?;

        let state = self.state_mut();
        state.last_id += 1;
        let now = Utc::now();
        let created = IngredientNode {
            id: IngredientId(state.last_id),
            parent_id: node.parent_id,
            materialized_path: path,
            name: node.name,
            description: node.description,
            strength: node.strength,
            origin: node.origin,
            created_at: now,
            updated_at: now,
        };
        state.nodes.insert(created.id, created.clone());
        Ok(created)
    }

    async fn save(&mut self, node: &IngredientNode) -> StoreResult<()> {
        self.record_write()?;

        match self.state_mut().nodes.get_mut(&node.id) {
            Some(existing) => {
                *existing = node.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound { id: node.id.0 }),
        }
    }

    async fn delete(&mut self, id: IngredientId) -> StoreResult<bool> {
        self.record_write()?;
        Ok(self.state_mut().nodes.remove(&id).is_some())
    }

    async fn commit(self) -> StoreResult<()> {
        let MemoryTransaction {
            mut guard, staged, ..
        } = self;
        if let Some(staged) = staged {
            *guard = staged;
        }
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        // Staged copy is dropped with the handle
        Ok(())
    }

    fn is_transactional(&self) -> bool {
        self.staged.is_some()
    }
}

fn placement_of(node: IngredientNode) -> StoredPlacement {
    StoredPlacement {
        id: node.id,
        parent_id: node.parent_id,
        materialized_path: Ok(node.materialized_path),
    }
}
