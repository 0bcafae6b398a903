//! Hierarchy configuration
use serde::{Deserialize, Serialize};
use std::env;

/// Deepest tree `rebuild_subtree` will walk before assuming a parent cycle
const DEFAULT_MAX_DEPTH: usize = 1000;

/// Broadcast channel capacity for domain events.
///
/// Every committed create, update, move and delete emits one event; 128 gives headroom while
/// keeping memory bounded. Lagging observers only miss events.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Configuration for `HierarchyService`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HierarchyConfig {
    /// Maximum depth walked by recursive rebuilds
    pub max_depth: usize,

    /// Capacity of the domain event channel
    pub event_channel_capacity: usize,

    /// Reject multi-row rewrites on non-transactional handles instead of warning
    pub strict_transactions: bool,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            strict_transactions: false,
        }
    }
}

impl HierarchyConfig {
    /// Defaults overridden by `BARSHELF_MAX_DEPTH`,
    /// `BARSHELF_EVENT_CHANNEL_CAPACITY` and `BARSHELF_STRICT_TRANSACTIONS`
    ///
    /// Unparseable values fall back to the default with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_depth: env_or("BARSHELF_MAX_DEPTH", defaults.max_depth),
            event_channel_capacity: env_or(
                "BARSHELF_EVENT_CHANNEL_CAPACITY",
                defaults.event_channel_capacity,
            )
            .max(1),
            strict_transactions: env_or(
                "BARSHELF_STRICT_TRANSACTIONS",
                defaults.strict_transactions,
            ),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
