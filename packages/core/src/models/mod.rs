//! Data Models
//!
//! This module contains the core data structures of the ingredient hierarchy:
//!
//! - `IngredientNode` - One entry of the classification tree
//! - `MaterializedPath` - Validated ancestor path (`.3.17.`) and its codec
//! - Creation/update payloads (`NewIngredient`, `IngredientUpdate`)
//! - `IngredientPrice` - Price payload consumed by shelf listings
//!
//! Hierarchy fields (`parent_id`, `materialized_path`) are plain data; the
//! rules that keep them consistent live in `services::HierarchyService`.

mod ingredient;
pub mod path;
mod price;

pub use ingredient::{
    sort_by_name, DeleteResult, IngredientId, IngredientNode, IngredientTree, IngredientUpdate,
    NewIngredient, ValidationError,
};
pub use path::{MaterializedPath, PathError, PATH_SEPARATOR};
pub use price::{IngredientPrice, Unit};
