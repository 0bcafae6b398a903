//! Service Layer Error Types
//!
//! This module defines error types for hierarchy operations. Every variant
//! that concerns a specific node carries its id (and the attempted parent for
//! moves) so callers can log or display the failure without extra lookups.

use crate::db::StoreError;
use crate::models::{IngredientId, PathError, ValidationError};
use crate::services::collaborators::ConversionError;
use thiserror::Error;

/// Hierarchy operation errors
#[derive(Error, Debug)]
pub enum HierarchyError {
    /// A stored path does not parse (index/data corruption)
    ///
    /// `node_id` is set whenever the path was read from a stored row.
    #[error("Malformed materialized path{}: {source}", on_node(.node_id))]
    MalformedPath {
        node_id: Option<IngredientId>,
        source: PathError,
    },

    /// An ancestor id in a path does not resolve to a node
    #[error("Broken path reference: node {node_id} lists missing ancestor {missing_id}")]
    BrokenPathReference {
        node_id: IngredientId,
        missing_id: IngredientId,
    },

    /// The move would make a node its own descendant
    #[error("Cannot move node {node_id} under {new_parent_id}: target is the node itself or one of its descendants")]
    CyclicMove {
        node_id: IngredientId,
        new_parent_id: IngredientId,
    },

    /// Node not found by id
    #[error("Ingredient not found: {id}")]
    NodeNotFound { id: IngredientId },

    /// Payload validation failed
    #[error("Ingredient validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Structural limit exceeded (e.g. rebuild depth on a corrupted parent chain)
    #[error("Hierarchy constraint violated: {0}")]
    HierarchyViolation(String),

    /// A multi-row rewrite was attempted without a transaction in strict mode
    #[error("Operation on node {node_id} requires a transaction")]
    TransactionRequired { node_id: IngredientId },

    /// Backing store failed a read, write or commit
    #[error("Persistence failed: {0}")]
    Persistence(StoreError),

    /// Membership source could not answer
    #[error("Membership lookup failed: {0}")]
    MembershipUnavailable(String),

    /// Unit conversion failed
    #[error("Price conversion failed: {0}")]
    Conversion(#[from] ConversionError),
}

impl From<StoreError> for HierarchyError {
    fn from(err: StoreError) -> Self {
        match err {
            // Corrupt paths surface as path errors, never as generic I/O
            StoreError::MalformedPath { id, source } => Self::MalformedPath {
                node_id: Some(IngredientId(id)),
                source,
            },
            other => Self::Persistence(other),
        }
    }
}

impl From<PathError> for HierarchyError {
    fn from(source: PathError) -> Self {
        Self::MalformedPath {
            node_id: None,
            source,
        }
    }
}

fn on_node(node_id: &Option<IngredientId>) -> String {
    node_id.map(|id| format!(" on node {}", id)).unwrap_or_default()
}

impl HierarchyError {
    /// Create a node not found error
    pub fn node_not_found(id: IngredientId) -> Self {
        Self::NodeNotFound { id }
    }

    /// Create a cyclic move error
    pub fn cyclic_move(node_id: IngredientId, new_parent_id: IngredientId) -> Self {
        Self::CyclicMove {
            node_id,
            new_parent_id,
        }
    }

    /// Create a broken path reference error
    pub fn broken_path_reference(node_id: IngredientId, missing_id: IngredientId) -> Self {
        Self::BrokenPathReference {
            node_id,
            missing_id,
        }
    }

    /// Create a hierarchy violation error
    pub fn hierarchy_violation(msg: impl Into<String>) -> Self {
        Self::HierarchyViolation(msg.into())
    }

    pub fn membership_unavailable(msg: impl Into<String>) -> Self {
        Self::MembershipUnavailable(msg.into())
    }

    /// Whether the error indicates stored data is inconsistent
    ///
    /// Corruption is reported, never repaired implicitly; `rebuild_all`
    /// is the explicit repair path.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::MalformedPath { .. } | Self::BrokenPathReference { .. }
        )
    }
}

pub type HierarchyResult<T> = Result<T, HierarchyError>;
