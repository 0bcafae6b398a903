//! Ingredient Data Structures
//!
//! This module defines `IngredientNode`, one entry of the ingredient
//! classification tree (e.g. "Spirit > Whiskey > Bourbon"), and the payloads
//! used to create and update it.
//!
//! # Hierarchy Fields
//!
//! - `parent_id`: `None` means the node is a root
//! - `materialized_path`: ancestors root-first, `None` for roots
//!
//! Both fields are written only by `HierarchyService` (create, move, delete).
//! Everything else on the node is domain payload the hierarchy logic ignores,
//! except `name`, which orders sibling and variant listings.
//!
//! # Examples
//!
//! ```rust
//! use barshelf_core::models::{IngredientId, NewIngredient};
//!
//! let bourbon = NewIngredient::new("Bourbon")
//!     .with_parent(IngredientId(2))
//!     .with_strength(45.0);
//! assert!(bourbon.validate().is_ok());
//! ```

use crate::models::path::MaterializedPath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Validation errors for ingredient payloads
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Strength must be between 0 and 100 (ABV %), got {0}")]
    InvalidStrength(f64),

    #[error("Invalid hierarchy state for node {id}: {reason}")]
    InvalidHierarchy { id: IngredientId, reason: String },
}

/// Store-assigned ingredient identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct IngredientId(pub i64);

impl fmt::Display for IngredientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for IngredientId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// One entry of the ingredient hierarchy
///
/// Plain data: no cached relations, no lazy loading. A value loaded before a
/// move is stale once the move commits and must be reloaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientNode {
    /// Unique identifier, immutable once assigned
    pub id: IngredientId,

    /// Parent ingredient (`None` = root)
    pub parent_id: Option<IngredientId>,

    /// Ancestors root-first, excluding this node (`None` = root)
    pub materialized_path: Option<MaterializedPath>,

    /// Display name, used for lexical ordering of listings
    pub name: String,

    pub description: Option<String>,

    /// Alcohol by volume, percent
    pub strength: Option<f64>,

    pub origin: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl IngredientNode {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Check the local hierarchy invariants of this single node
    ///
    /// - parent and path are both present or both absent
    /// - the node is not its own ancestor
    /// - the last path component is the parent
    pub fn check_hierarchy(&self) -> Result<(), ValidationError> {
        match (self.parent_id, &self.materialized_path) {
            (None, None) => Ok(()),
            (Some(_), None) | (None, Some(_)) => Err(ValidationError::InvalidHierarchy {
                id: self.id,
                reason: "parent_id and materialized_path must both be set or both be empty"
                    .to_string(),
            }),
            (Some(parent_id), Some(path)) => {
                if path.contains(self.id) {
                    return Err(ValidationError::InvalidHierarchy {
                        id: self.id,
                        reason: format!("node appears in its own path {}", path),
                    });
                }
                if path.ids().last() != Some(&parent_id) {
                    return Err(ValidationError::InvalidHierarchy {
                        id: self.id,
                        reason: format!("path {} does not end with parent {}", path, parent_id),
                    });
                }
                Ok(())
            }
        }
    }
}

/// Creation payload; the store assigns `id` and timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIngredient {
    pub name: String,
    pub description: Option<String>,
    pub strength: Option<f64>,
    pub origin: Option<String>,
    pub parent_id: Option<IngredientId>,
}

impl NewIngredient {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            strength: None,
            origin: None,
            parent_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: IngredientId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = Some(strength);
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name".to_string()));
        }
        validate_strength(self.strength)
    }
}

/// Sparse update of domain attributes
///
/// Hierarchy fields are deliberately absent: parent and path change only
/// through `HierarchyService::move_node`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientUpdate {
    pub name: Option<String>,
    /// `Some(None)` clears the description
    pub description: Option<Option<String>>,
    pub strength: Option<Option<f64>>,
    pub origin: Option<Option<String>>,
}

impl IngredientUpdate {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ValidationError::MissingField("name".to_string()));
            }
        }
        if let Some(strength) = self.strength {
            validate_strength(strength)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.strength.is_none()
            && self.origin.is_none()
    }

    /// Apply the present fields to `node`
    pub fn apply_to(self, node: &mut IngredientNode) {
        if let Some(name) = self.name {
            node.name = name;
        }
        if let Some(description) = self.description {
            node.description = description;
        }
        if let Some(strength) = self.strength {
            node.strength = strength;
        }
        if let Some(origin) = self.origin {
            node.origin = origin;
        }
    }
}

fn validate_strength(strength: Option<f64>) -> Result<(), ValidationError> {
    match strength {
        Some(s) if !(0.0..=100.0).contains(&s) || s.is_nan() => {
            Err(ValidationError::InvalidStrength(s))
        }
        _ => Ok(()),
    }
}

/// Result of a delete operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    /// Whether the node existed before the delete
    pub existed: bool,
    /// Direct children moved to the deleted node's parent
    pub reparented: Vec<IngredientId>,
}

impl DeleteResult {
    pub fn not_found() -> Self {
        Self {
            existed: false,
            reparented: Vec::new(),
        }
    }
}

/// Nested view of a subtree, children sorted by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientTree {
    pub node: IngredientNode,
    pub children: Vec<IngredientTree>,
}

impl IngredientTree {
    /// Total number of nodes in this tree, including the root
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(IngredientTree::node_count)
            .sum::<usize>()
    }
}

/// Sort ingredients by name, ties broken by id so listings are stable
pub fn sort_by_name(nodes: &mut [IngredientNode]) {
    nodes.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
}
