//! External Collaborators
//!
//! Interfaces the hierarchy core consumes but does not implement:
//!
//! - `MembershipSource` - shelf / shopping-list membership as id sets
//! - `UnitConverter` - price unit conversion
//! - `AttachmentCleaner` - releases images/files attached to a deleted node

use crate::models::{IngredientId, Unit};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Whose membership list to read
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ownerId", rename_all = "camelCase")]
pub enum MembershipScope {
    /// Ingredients stocked on a bar's shelf
    Shelf(i64),
    /// Ingredients on a user's shopping list
    ShoppingList(i64),
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Membership source failed: {0}")]
pub struct MembershipError(pub String);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("Unsupported conversion from {from} to {to}")]
    UnsupportedConversion { from: Unit, to: Unit },
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Failed to release attachments of ingredient {id}: {reason}")]
pub struct AttachmentError {
    pub id: IngredientId,
    pub reason: String,
}

/// Shelf / shopping-list membership, consumed as plain id sets
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MembershipSource: Send + Sync {
    async fn membership_ids(
        &self,
        scope: MembershipScope,
    ) -> Result<HashSet<IngredientId>, MembershipError>;
}

/// Opaque unit conversion
#[cfg_attr(test, mockall::automock)]
pub trait UnitConverter: Send + Sync {
    fn convert(&self, amount: f64, from: &Unit, to: &Unit) -> Result<f64, ConversionError>;
}

/// Releases non-hierarchy resources of a deleted ingredient
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttachmentCleaner: Send + Sync {
    async fn release(&self, id: IngredientId) -> Result<(), AttachmentError>;
}
