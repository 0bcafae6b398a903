//! Domain Events for the Ingredient Hierarchy
//!
//! `HierarchyService` emits these events after a hierarchy change commits,
//! so other parts of the system (search indexing, caches of category
//! listings) can react without coupling to the store.
//!
//! # Architecture
//!
//! Events are sent on a tokio broadcast channel. Nothing is emitted for
//! rolled-back work, and observers that lag simply miss events; they should
//! reload state rather than replay history.

use crate::models::{IngredientId, IngredientNode};
use serde::{Deserialize, Serialize};

/// Hierarchy relationship after a move
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    pub node_id: IngredientId,
    pub old_parent_id: Option<IngredientId>,
    pub new_parent_id: Option<IngredientId>,
    /// Number of descendant paths rewritten by the move
    pub rewritten: usize,
}

/// Domain events emitted by `HierarchyService`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomainEvent {
    /// A new ingredient was created
    NodeCreated { node: IngredientNode },

    /// Domain attributes of an ingredient changed
    NodeUpdated { node: IngredientNode },

    /// An ingredient (and its subtree) moved to a new parent
    NodeMoved { record: MoveRecord },

    /// An ingredient was deleted; its children moved to its parent
    NodeDeleted {
        id: IngredientId,
        reparented: Vec<IngredientId>,
    },
}

impl DomainEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &str {
        match self {
            DomainEvent::NodeCreated { .. } => "ingredient:created",
            DomainEvent::NodeUpdated { .. } => "ingredient:updated",
            DomainEvent::NodeMoved { .. } => "ingredient:moved",
            DomainEvent::NodeDeleted { .. } => "ingredient:deleted",
        }
    }
}
