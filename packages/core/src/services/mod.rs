//! Business Services
//!
//! This module contains the ingredient hierarchy business logic:
//!
//! - `HierarchyService` - CRUD, moves, queries and repair of the ingredient tree
//! - `ShelfService` - Category queries against shelf / shopping-list membership
//! - `hierarchy` - Transaction-agnostic primitives both services build on
//! - `collaborators` - Interfaces for membership, unit conversion and attachments
//!
//! Services coordinate between the store layer and application logic,
//! owning transaction boundaries and emitting domain events.

pub mod collaborators;
pub mod error;
pub mod hierarchy;
pub mod hierarchy_service;
pub mod shelf_service;

pub use collaborators::{
    AttachmentCleaner, AttachmentError, ConversionError, MembershipError, MembershipScope,
    MembershipSource, UnitConverter,
};
pub use error::{HierarchyError, HierarchyResult};
pub use hierarchy::{MoveOutcome, RebuildReport};
pub use hierarchy_service::HierarchyService;
pub use shelf_service::ShelfService;
