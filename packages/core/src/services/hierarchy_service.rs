//! Hierarchy Service - Ingredient Tree Operations
//!
//! This module provides the business logic layer for the ingredient tree:
//!
//! - CRUD operations (create, read, update, delete with reparenting)
//! - Ancestor/descendant queries over materialized paths
//! - Subtree moves with cycle detection
//! - Recursive rebuild of corrupted paths
//!
//! # Transaction Boundaries
//!
//! Every public method except the `*_in` variants is its own transaction:
//! it begins, runs the primitive from `services::hierarchy`, then commits or
//! rolls back. Callers that already hold a transaction (to combine a move
//! with other writes) use `move_node_in`, which never commits.
//!
//! # Staleness
//!
//! Returned `IngredientNode` values are snapshots. After any move, reload
//! nodes (including the new parent) before reusing them.

use crate::config::HierarchyConfig;
use crate::db::{DomainEvent, HierarchyStore, HierarchyTransaction};
use crate::db::events::MoveRecord;
use crate::models::{
    sort_by_name, DeleteResult, IngredientId, IngredientNode, IngredientTree, IngredientUpdate,
    NewIngredient,
};
use crate::services::collaborators::AttachmentCleaner;
use crate::services::error::{HierarchyError, HierarchyResult};
use crate::services::hierarchy::{self, MoveOutcome, RebuildReport};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Ingredient hierarchy service
///
/// # Examples
///
/// ```rust
/// use barshelf_core::db::MemoryStore;
/// use barshelf_core::models::NewIngredient;
/// use barshelf_core::services::HierarchyService;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let service = HierarchyService::new(Arc::new(MemoryStore::new()));
///
/// let spirit = service.create_node(NewIngredient::new("Spirit")).await?;
/// let whiskey = service
///     .create_node(NewIngredient::new("Whiskey").with_parent(spirit.id))
///     .await?;
/// assert_eq!(whiskey.materialized_path.unwrap().as_str(), ".1.");
///
/// // Detach Whiskey to become a root of its own
/// let whiskey = service.move_node(whiskey.id, None).await?;
/// assert!(whiskey.materialized_path.is_none());
/// # Ok(())
/// # }
/// ```
pub struct HierarchyService<S: HierarchyStore> {
    store: Arc<S>,

    config: HierarchyConfig,

    /// Broadcast channel for domain events
    event_tx: broadcast::Sender<DomainEvent>,

    /// Releases attachments of deleted ingredients
    attachments: Option<Arc<dyn AttachmentCleaner>>,
}

// Manual Clone: S itself need not be Clone
impl<S: HierarchyStore> Clone for HierarchyService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            event_tx: self.event_tx.clone(),
            attachments: self.attachments.clone(),
        }
    }
}

impl<S: HierarchyStore> HierarchyService<S> {
    /// Create a service with the default configuration
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, HierarchyConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: HierarchyConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));
        Self {
            store,
            config,
            event_tx,
            attachments: None,
        }
    }

    /// Release attachments through `cleaner` whenever a node is deleted
    pub fn with_attachment_cleaner(mut self, cleaner: Arc<dyn AttachmentCleaner>) -> Self {
        self.attachments = Some(cleaner);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    /// Subscribe to domain events (emitted only after commit)
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.event_tx.subscribe()
    }

    /// Ignores send errors: having no subscribers is normal
    fn emit_event(&self, event: DomainEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Commit on success, roll back on error
    async fn finish<R>(
        &self,
        tx: S::Transaction,
        result: HierarchyResult<R>,
    ) -> HierarchyResult<R> {
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("Rollback after '{}' failed: {}", err, rollback_err);
                }
                Err(err)
            }
        }
    }

    //
    // CRUD
    //

    /// Create an ingredient, as a root or under an existing parent
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty name or out-of-range strength
    /// - `NodeNotFound` if the parent does not exist
    pub async fn create_node(&self, new_node: NewIngredient) -> HierarchyResult<IngredientNode> {
        let mut tx = self.store.begin().await?;
        let result = hierarchy::create_node(&mut tx, new_node).await;
        let node = self.finish(tx, result).await?;

        tracing::debug!("Created ingredient {} ({})", node.id, node.name);
        self.emit_event(DomainEvent::NodeCreated { node: node.clone() });
        Ok(node)
    }

    pub async fn get_node(&self, id: IngredientId) -> HierarchyResult<Option<IngredientNode>> {
        let mut tx = self.store.begin().await?;
        let result = tx.load(id).await.map_err(HierarchyError::from);
        self.finish(tx, result).await
    }

    /// Update domain attributes; hierarchy fields are untouched
    pub async fn update_node(
        &self,
        id: IngredientId,
        update: IngredientUpdate,
    ) -> HierarchyResult<IngredientNode> {
        update.validate()?;

        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<_> = async {
            let mut node = hierarchy::require_node(&mut tx, id).await?;
            if update.is_empty() {
                return Ok((node, false));
            }
            update.apply_to(&mut node);
            node.updated_at = Utc::now();
            tx.save(&node).await?;
            Ok((node, true))
        }
        .await;
        let (node, changed) = self.finish(tx, result).await?;

        if changed {
            self.emit_event(DomainEvent::NodeUpdated { node: node.clone() });
        }
        Ok(node)
    }

    /// Delete an ingredient, moving its direct children to its parent first
    ///
    /// Deleting a missing id succeeds with `existed: false`. Attachment
    /// release runs after the commit; its failure is logged, not returned.
    pub async fn delete_node(&self, id: IngredientId) -> HierarchyResult<DeleteResult> {
        let mut tx = self.store.begin().await?;
        let result =
            hierarchy::delete_reparenting(&mut tx, id, self.config.strict_transactions).await;
        let Some(reparented) = self.finish(tx, result).await? else {
            return Ok(DeleteResult::not_found());
        };

        tracing::info!(
            "Deleted ingredient {} ({} children reparented)",
            id,
            reparented.len()
        );

        if let Some(cleaner) = &self.attachments {
            if let Err(e) = cleaner.release(id).await {
                tracing::warn!("Attachment cleanup for ingredient {} failed: {}", id, e);
            }
        }

        self.emit_event(DomainEvent::NodeDeleted {
            id,
            reparented: reparented.clone(),
        });

        Ok(DeleteResult {
            existed: true,
            reparented,
        })
    }

    //
    // QUERIES
    //

    /// Ancestors of `id`, root-first
    ///
    /// # Errors
    ///
    /// `BrokenPathReference` if the stored path names a missing node
    pub async fn ancestors_of(&self, id: IngredientId) -> HierarchyResult<Vec<IngredientNode>> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<_> = async {
            let node = hierarchy::require_node(&mut tx, id).await?;
            hierarchy::ancestors_of(&mut tx, &node).await
        }
        .await;
        self.finish(tx, result).await
    }

    /// Every descendant of `id`, in no particular order
    pub async fn descendants_of(&self, id: IngredientId) -> HierarchyResult<Vec<IngredientNode>> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<_> = async {
            let node = hierarchy::require_node(&mut tx, id).await?;
            hierarchy::descendants_of(&mut tx, &node).await
        }
        .await;
        self.finish(tx, result).await
    }

    /// Descendants of `id` sorted by name
    pub async fn descendants_sorted_by_name(
        &self,
        id: IngredientId,
    ) -> HierarchyResult<Vec<IngredientNode>> {
        let mut descendants = self.descendants_of(id).await?;
        sort_by_name(&mut descendants);
        Ok(descendants)
    }

    /// Direct children of `id` sorted by name
    pub async fn children_of(&self, id: IngredientId) -> HierarchyResult<Vec<IngredientNode>> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<_> = async {
            hierarchy::require_node(&mut tx, id).await?;
            Ok(tx.find_children(id).await?)
        }
        .await;
        let mut children = self.finish(tx, result).await?;
        sort_by_name(&mut children);
        Ok(children)
    }

    /// All current roots sorted by name
    pub async fn roots(&self) -> HierarchyResult<Vec<IngredientNode>> {
        let mut tx = self.store.begin().await?;
        let result = tx.find_roots().await.map_err(HierarchyError::from);
        let mut roots = self.finish(tx, result).await?;
        sort_by_name(&mut roots);
        Ok(roots)
    }

    /// Whether `a` is a strict descendant of `b` (prefix test, no I/O)
    pub fn is_descendant_of(&self, a: &IngredientNode, b: &IngredientNode) -> bool {
        hierarchy::is_descendant_of(a, b)
    }

    /// Nested tree rooted at `id`, built from one descendant query
    ///
    /// Returns `None` if `id` does not exist.
    pub async fn subtree(&self, id: IngredientId) -> HierarchyResult<Option<IngredientTree>> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<_> = async {
            let Some(root) = tx.load(id).await? else {
                return Ok(None);
            };
            let descendants = hierarchy::descendants_of(&mut tx, &root).await?;
            Ok(Some((root, descendants)))
        }
        .await;
        let Some((root, descendants)) = self.finish(tx, result).await? else {
            return Ok(None);
        };

        // Adjacency list keyed by parent
        let mut by_parent: HashMap<IngredientId, Vec<IngredientNode>> = HashMap::new();
        for node in descendants {
            if let Some(parent_id) = node.parent_id {
                by_parent.entry(parent_id).or_default().push(node);
            }
        }
        Ok(Some(build_tree(root, &mut by_parent)))
    }

    //
    // MOVES
    //

    /// Move `node_id` (with its subtree) under `new_parent`, or to root
    ///
    /// Runs in its own transaction: either every path in the subtree is
    /// rewritten or none is.
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` for an unknown node or parent
    /// - `CyclicMove` when `new_parent` is the node or one of its descendants
    /// - `Persistence` when the store fails (the transaction is rolled back)
    pub async fn move_node(
        &self,
        node_id: IngredientId,
        new_parent: Option<IngredientId>,
    ) -> HierarchyResult<IngredientNode> {
        let mut tx = self.store.begin().await?;
        let result = hierarchy::append_as_child_of(
            &mut tx,
            node_id,
            new_parent,
            self.config.strict_transactions,
        )
        .await;
        let outcome = self.finish(tx, result).await?;

        if outcome.changed {
            tracing::info!(
                "Moved ingredient {} from {:?} to {:?} ({} descendants rewritten)",
                node_id,
                outcome.old_parent_id,
                new_parent,
                outcome.rewritten
            );
            self.emit_event(DomainEvent::NodeMoved {
                record: MoveRecord {
                    node_id,
                    old_parent_id: outcome.old_parent_id,
                    new_parent_id: new_parent,
                    rewritten: outcome.rewritten,
                },
            });
        }

        Ok(outcome.node)
    }

    /// Move inside a caller-owned transaction
    ///
    /// Nothing is committed or rolled back here and no event is emitted; the
    /// caller decides the fate of `tx`.
    pub async fn move_node_in<T: HierarchyTransaction>(
        &self,
        tx: &mut T,
        node_id: IngredientId,
        new_parent: Option<IngredientId>,
    ) -> HierarchyResult<MoveOutcome> {
        hierarchy::append_as_child_of(tx, node_id, new_parent, self.config.strict_transactions)
            .await
    }

    //
    // REPAIR
    //

    /// Re-derive every path below `root_id` from live parents
    ///
    /// Idempotent: a consistent subtree is left untouched.
    pub async fn rebuild_subtree(&self, root_id: IngredientId) -> HierarchyResult<RebuildReport> {
        let mut tx = self.store.begin().await?;
        let result = hierarchy::rebuild_subtree(
            &mut tx,
            root_id,
            self.config.max_depth,
            self.config.strict_transactions,
        )
        .await;
        let report = self.finish(tx, result).await?;

        tracing::info!(
            "Rebuilt subtree of {}: {} visited, {} rewritten",
            root_id,
            report.visited,
            report.rewritten
        );
        Ok(report)
    }

    /// Rebuild every tree in the store
    ///
    /// Roots carrying a stale path are reset to root first. Stored paths that
    /// no longer parse are overwritten with the derived path.
    pub async fn rebuild_all(&self) -> HierarchyResult<RebuildReport> {
        let mut tx = self.store.begin().await?;
        let result = hierarchy::rebuild_forest(
            &mut tx,
            self.config.max_depth,
            self.config.strict_transactions,
        )
        .await;
        let report = self.finish(tx, result).await?;

        tracing::info!(
            "Rebuilt all paths: {} visited, {} rewritten",
            report.visited,
            report.rewritten
        );
        Ok(report)
    }
}

fn build_tree(
    node: IngredientNode,
    by_parent: &mut HashMap<IngredientId, Vec<IngredientNode>>,
) -> IngredientTree {
    let mut children = by_parent.remove(&node.id).unwrap_or_default();
    sort_by_name(&mut children);
    IngredientTree {
        children: children
            .into_iter()
            .map(|child| build_tree(child, by_parent))
            .collect(),
        node,
    }
}

// Behaviour tests in a separate module
#[cfg(test)]
#[path = "hierarchy_service_test.rs"]
mod hierarchy_service_test;
