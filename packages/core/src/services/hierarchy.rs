//! Hierarchy Primitives
//!
//! Plain functions over a `HierarchyTransaction`: ancestor/descendant
//! queries, the subtree move (`append_as_child_of`), recursive rebuild and
//! reparenting delete. They take and return plain data, never cache, and
//! never open or finish transactions themselves; `HierarchyService` wraps
//! them in transaction boundaries.
//!
//! # Subtree Prefix
//!
//! The descendants of N are the nodes whose path starts with
//! `append(path(N), N.id)`, the "subtree prefix" of N. Moving N rewrites each
//! descendant by splicing N's old subtree prefix for its new one; the part of
//! the path below N is kept component for component.

use crate::db::{HierarchyTransaction, StoredPlacement};
use crate::models::{path, IngredientId, IngredientNode, MaterializedPath, NewIngredient};
use crate::services::error::{HierarchyError, HierarchyResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Result of a move
#[derive(Debug, Clone, PartialEq)]
pub struct MoveOutcome {
    /// The moved node as persisted
    pub node: IngredientNode,
    pub old_parent_id: Option<IngredientId>,
    /// Descendant paths rewritten
    pub rewritten: usize,
    /// Whether anything was written at all
    pub changed: bool,
}

/// Counters from a rebuild walk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
    /// Nodes whose placement was re-derived
    pub visited: usize,
    /// Nodes whose stored path or parent actually changed
    pub rewritten: usize,
}

/// Path prefix shared by every descendant of `node`
pub fn subtree_prefix(node: &IngredientNode) -> MaterializedPath {
    path::append(node.materialized_path.as_ref(), node.id)
}

/// Path a child of `parent` must have
pub fn child_path(parent: &IngredientNode) -> MaterializedPath {
    subtree_prefix(parent)
}

/// Whether `a` is a strict descendant of `b`
///
/// Pure prefix test on `a`'s path; loads nothing.
pub fn is_descendant_of(a: &IngredientNode, b: &IngredientNode) -> bool {
    match &a.materialized_path {
        Some(path) => path.starts_with(&subtree_prefix(b)),
        None => false,
    }
}

/// `a == b` or `a` is a descendant of `b`
pub fn is_descendant_or_self(a: &IngredientNode, b: &IngredientNode) -> bool {
    a.id == b.id || is_descendant_of(a, b)
}

/// Load a node or fail with `NodeNotFound`
pub async fn require_node<T: HierarchyTransaction>(
    tx: &mut T,
    id: IngredientId,
) -> HierarchyResult<IngredientNode> {
    tx.load(id)
        .await?
        .ok_or_else(|| HierarchyError::node_not_found(id))
}

/// Ancestors of `node`, root-first
///
/// Every id in the path must resolve; a missing one is reported as
/// `BrokenPathReference`, not skipped.
pub async fn ancestors_of<T: HierarchyTransaction>(
    tx: &mut T,
    node: &IngredientNode,
) -> HierarchyResult<Vec<IngredientNode>> {
    let Some(path) = &node.materialized_path else {
        return Ok(Vec::new());
    };

    let ids = path.ids();
    let mut ancestors = Vec::with_capacity(ids.len());
    for id in ids {
        let ancestor = tx
            .load(id)
            .await?
            .ok_or_else(|| HierarchyError::broken_path_reference(node.id, id))?;
        ancestors.push(ancestor);
    }
    Ok(ancestors)
}

/// All descendants of `node` (unordered)
pub async fn descendants_of<T: HierarchyTransaction>(
    tx: &mut T,
    node: &IngredientNode,
) -> HierarchyResult<Vec<IngredientNode>> {
    Ok(tx.find_by_path_prefix(&subtree_prefix(node)).await?)
}

/// Insert a new node, deriving its path from the parent
pub async fn create_node<T: HierarchyTransaction>(
    tx: &mut T,
    new_node: NewIngredient,
) -> HierarchyResult<IngredientNode> {
    new_node.validate()?;

    let path = match new_node.parent_id {
        Some(parent_id) => Some(child_path(&require_node(tx, parent_id).await?)),
        None => None,
    };
    Ok(tx.insert(new_node, path).await?)
}

/// Reparent `node_id` under `new_parent_id` (root when `None`), rewriting
/// the paths of its whole subtree
///
/// Node and parent are re-read through `tx`; copies held by the caller are
/// never trusted. On error nothing is rolled back here: the caller owns the
/// transaction and must roll it back.
///
/// # Errors
///
/// - `NodeNotFound` for an unknown node or parent
/// - `CyclicMove` if the parent is the node itself or one of its descendants
/// - `TransactionRequired` if `tx` is not transactional and
///   `strict_transactions` is set
/// - `Persistence` if any read or write fails
pub async fn append_as_child_of<T: HierarchyTransaction>(
    tx: &mut T,
    node_id: IngredientId,
    new_parent_id: Option<IngredientId>,
    strict_transactions: bool,
) -> HierarchyResult<MoveOutcome> {
    let mut node = require_node(tx, node_id).await?;
    let old_parent_id = node.parent_id;

    let parent = match new_parent_id {
        Some(parent_id) => Some(require_node(tx, parent_id).await?),
        None => None,
    };

    // Root to root: nothing to do
    if parent.is_none() && node.parent_id.is_none() && node.materialized_path.is_none() {
        return Ok(MoveOutcome {
            node,
            old_parent_id,
            rewritten: 0,
            changed: false,
        });
    }

    if let Some(parent) = &parent {
        // The prefix test covers a consistent tree; `contains` also catches a
        // parent whose own path lists the node after a partial corruption
        let parent_lists_node = parent
            .materialized_path
            .as_ref()
            .is_some_and(|p| p.contains(node.id));
        if is_descendant_or_self(parent, &node) || parent_lists_node {
            return Err(HierarchyError::cyclic_move(node.id, parent.id));
        }
    }

    // Snapshot before touching the node: membership is by the OLD prefix
    let old_prefix = subtree_prefix(&node);
    let descendants = tx.find_by_path_prefix(&old_prefix).await?;

    let new_path = parent.as_ref().map(child_path);
    let node_changed = node.parent_id != new_parent_id || node.materialized_path != new_path;

    ensure_transactional(tx, node_id, strict_transactions, "Moving")?;

    if node_changed {
        node.parent_id = new_parent_id;
        node.materialized_path = new_path;
        node.updated_at = Utc::now();
        tx.save(&node).await?;
    }

    let new_prefix = subtree_prefix(&node);
    let mut rewritten = 0;
    if new_prefix != old_prefix {
        for mut descendant in descendants {
            let Some(current) = &descendant.materialized_path else {
                continue;
            };
            let Some(rebased) = current.rebase(&old_prefix, &new_prefix) else {
                continue;
            };
            tracing::debug!(
                "Rewriting path of ingredient {}: {} -> {}",
                descendant.id,
                current,
                rebased
            );
            descendant.materialized_path = Some(rebased);
            descendant.updated_at = Utc::now();
            tx.save(&descendant).await?;
            rewritten += 1;
        }
    }

    Ok(MoveOutcome {
        node,
        old_parent_id,
        rewritten,
        changed: node_changed || rewritten > 0,
    })
}

/// Fail in strict mode, warn otherwise, when `tx` writes straight through
fn ensure_transactional<T: HierarchyTransaction>(
    tx: &T,
    node_id: IngredientId,
    strict_transactions: bool,
    operation: &str,
) -> HierarchyResult<()> {
    if tx.is_transactional() {
        return Ok(());
    }
    if strict_transactions {
        return Err(HierarchyError::TransactionRequired { node_id });
    }
    tracing::warn!(
        node_id = %node_id,
        "{} ingredient {} outside a transaction; a failure can leave the subtree partially rewritten",
        operation,
        node_id
    );
    Ok(())
}

/// Re-derive every path below `root_id` from live parents, top-down
///
/// Reads placements raw, so descendants whose stored path no longer parses
/// are overwritten instead of aborting the walk. Running it on a consistent
/// tree writes nothing. The root's own path must be readable; use
/// [`rebuild_forest`] to repair roots.
///
/// # Errors
///
/// `HierarchyViolation` if the walk exceeds `max_depth` or reaches a node
/// twice (a `parent_id` cycle in the stored data).
pub async fn rebuild_subtree<T: HierarchyTransaction>(
    tx: &mut T,
    root_id: IngredientId,
    max_depth: usize,
    strict_transactions: bool,
) -> HierarchyResult<RebuildReport> {
    let root = require_node(tx, root_id).await?;
    rebuild_below(tx, root.id, subtree_prefix(&root), max_depth, strict_transactions).await
}

/// Rebuild every tree in the store, resetting stale root paths to `None`
pub async fn rebuild_forest<T: HierarchyTransaction>(
    tx: &mut T,
    max_depth: usize,
    strict_transactions: bool,
) -> HierarchyResult<RebuildReport> {
    let mut report = RebuildReport::default();
    for root in tx.find_roots_raw().await? {
        report.visited += 1;
        if !root.has_path(None) {
            repair_placement(tx, &root, None, None, strict_transactions).await?;
            report.rewritten += 1;
        }

        let below = rebuild_below(
            tx,
            root.id,
            path::append(None, root.id),
            max_depth,
            strict_transactions,
        )
        .await?;
        report.visited += below.visited;
        report.rewritten += below.rewritten;
    }
    Ok(report)
}

async fn rebuild_below<T: HierarchyTransaction>(
    tx: &mut T,
    root_id: IngredientId,
    root_prefix: MaterializedPath,
    max_depth: usize,
    strict_transactions: bool,
) -> HierarchyResult<RebuildReport> {
    let mut report = RebuildReport::default();
    let mut seen = HashSet::from([root_id]);
    let mut stack = vec![(root_id, root_prefix, 0usize)];

    while let Some((parent_id, prefix, depth)) = stack.pop() {
        let children = tx.find_children_raw(parent_id).await?;
        if !children.is_empty() && depth + 1 > max_depth {
            return Err(HierarchyError::hierarchy_violation(format!(
                "Rebuild below {} exceeded max depth {}",
                root_id, max_depth
            )));
        }

        for child in children {
            if !seen.insert(child.id) {
                return Err(HierarchyError::hierarchy_violation(format!(
                    "Ingredient {} reached twice while rebuilding {} (parent cycle)",
                    child.id, root_id
                )));
            }

            report.visited += 1;
            if !child.has_path(Some(&prefix)) {
                repair_placement(tx, &child, Some(parent_id), Some(&prefix), strict_transactions)
                    .await?;
                report.rewritten += 1;
            }
            let child_prefix = path::append(Some(&prefix), child.id);
            stack.push((child.id, child_prefix, depth + 1));
        }
    }

    Ok(report)
}

async fn repair_placement<T: HierarchyTransaction>(
    tx: &mut T,
    placement: &StoredPlacement,
    parent_id: Option<IngredientId>,
    path: Option<&MaterializedPath>,
    strict_transactions: bool,
) -> HierarchyResult<()> {
    ensure_transactional(tx, placement.id, strict_transactions, "Rebuilding")?;

    let derived = path.map_or("(root)", |p| p.as_str());
    match &placement.materialized_path {
        Ok(stale) => tracing::debug!(
            "Rewriting path of ingredient {}: {} -> {}",
            placement.id,
            stale.as_ref().map_or("(root)", |p| p.as_str()),
            derived
        ),
        Err(e) => tracing::warn!(
            "Replacing malformed path of ingredient {} with {}: {}",
            placement.id,
            derived,
            e
        ),
    }

    tx.set_placement(placement.id, parent_id, path).await?;
    Ok(())
}

/// Delete `node_id` after moving its direct children to its parent
///
/// Returns the reparented children, or `None` if the node did not exist.
pub async fn delete_reparenting<T: HierarchyTransaction>(
    tx: &mut T,
    node_id: IngredientId,
    strict_transactions: bool,
) -> HierarchyResult<Option<Vec<IngredientId>>> {
    let Some(node) = tx.load(node_id).await? else {
        return Ok(None);
    };

    let children = tx.find_children(node.id).await?;
    let mut reparented = Vec::with_capacity(children.len());
    for child in children {
        append_as_child_of(tx, child.id, node.parent_id, strict_transactions).await?;
        reparented.push(child.id);
    }

    tx.delete(node.id).await?;
    Ok(Some(reparented))
}
