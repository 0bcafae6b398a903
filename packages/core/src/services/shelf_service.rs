//! Shelf Service - Category Queries Against Membership Sets
//!
//! Answers "what does this bar stock under Whiskey?" style questions by
//! intersecting a category's subtree with a membership id set supplied by
//! a `MembershipSource`. The hierarchy side is a single prefix query; the
//! membership side is opaque.

use crate::db::{HierarchyStore, HierarchyTransaction};
use crate::models::{sort_by_name, IngredientId, IngredientNode, IngredientPrice, Unit};
use crate::services::collaborators::{MembershipScope, MembershipSource, UnitConverter};
use crate::services::error::{HierarchyError, HierarchyResult};
use crate::services::hierarchy;
use std::collections::HashSet;
use std::sync::Arc;

pub struct ShelfService<S: HierarchyStore> {
    store: Arc<S>,
    membership: Arc<dyn MembershipSource>,
    converter: Arc<dyn UnitConverter>,
}

impl<S: HierarchyStore> Clone for ShelfService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            membership: self.membership.clone(),
            converter: self.converter.clone(),
        }
    }
}

impl<S: HierarchyStore> ShelfService<S> {
    pub fn new(
        store: Arc<S>,
        membership: Arc<dyn MembershipSource>,
        converter: Arc<dyn UnitConverter>,
    ) -> Self {
        Self {
            store,
            membership,
            converter,
        }
    }

    /// Category node plus all its descendants, read in one transaction
    async fn category_with_descendants(
        &self,
        category: IngredientId,
    ) -> HierarchyResult<(IngredientNode, Vec<IngredientNode>)> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<_> = async {
            let node = hierarchy::require_node(&mut tx, category).await?;
            let descendants = hierarchy::descendants_of(&mut tx, &node).await?;
            Ok((node, descendants))
        }
        .await;
        // Read-only: always roll back
        tx.rollback().await?;
        result
    }

    async fn members(&self, scope: MembershipScope) -> HierarchyResult<HashSet<IngredientId>> {
        self.membership
            .membership_ids(scope)
            .await
            .map_err(|e| HierarchyError::membership_unavailable(e.to_string()))
    }

    /// Whether the category itself or any of its variants is in `scope`
    pub async fn has_stocked_variant(
        &self,
        category: IngredientId,
        scope: MembershipScope,
    ) -> HierarchyResult<bool> {
        let (node, descendants) = self.category_with_descendants(category).await?;
        let members = self.members(scope).await?;

        Ok(members.contains(&node.id) || descendants.iter().any(|d| members.contains(&d.id)))
    }

    /// Variants of `category` that are in `scope`, sorted by name
    ///
    /// The category node itself is never included.
    pub async fn shelf_variants(
        &self,
        category: IngredientId,
        scope: MembershipScope,
    ) -> HierarchyResult<Vec<IngredientNode>> {
        let (_, descendants) = self.category_with_descendants(category).await?;
        let members = self.members(scope).await?;

        let mut stocked: Vec<IngredientNode> = descendants
            .into_iter()
            .filter(|d| members.contains(&d.id))
            .collect();
        sort_by_name(&mut stocked);
        Ok(stocked)
    }

    /// All variants of `category`, sorted by name
    pub async fn variants(&self, category: IngredientId) -> HierarchyResult<Vec<IngredientNode>> {
        let (_, mut descendants) = self.category_with_descendants(category).await?;
        sort_by_name(&mut descendants);
        Ok(descendants)
    }

    /// Re-express `price` in `to`, keeping the total price unchanged
    pub fn price_in(&self, price: &IngredientPrice, to: &Unit) -> HierarchyResult<IngredientPrice> {
        if &price.unit == to {
            return Ok(price.clone());
        }
        let amount = self.converter.convert(price.amount, &price.unit, to)?;
        Ok(IngredientPrice {
            amount,
            unit: to.clone(),
            ..price.clone()
        })
    }
}

#[cfg(test)]
#[path = "shelf_service_test.rs"]
mod shelf_service_test;
