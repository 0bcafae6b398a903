//! Path Rebuild Binary
//!
//! Re-derives every materialized path in a libsql ingredient database from
//! the stored `parent_id` links. Run it after bulk imports or manual edits
//! that may have left paths stale.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin rebuild-paths -- ./barshelf.db
//!
//! # Or via environment
//! BARSHELF_DB_PATH=./barshelf.db RUST_LOG=debug cargo run --bin rebuild-paths
//! ```
//!
//! # Environment Variables
//!
//! - `BARSHELF_DB_PATH`: Database file (used when no argument is given)
//! - `BARSHELF_MAX_DEPTH`: Depth guard for the rebuild walk (default: 1000)
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "trace")
//!
//! The report is printed to stdout as JSON.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use barshelf_core::db::TursoStore;
use barshelf_core::{HierarchyConfig, HierarchyService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let db_path: PathBuf = env::args()
        .nth(1)
        .or_else(|| env::var("BARSHELF_DB_PATH").ok())
        .map(PathBuf::from)
        .ok_or_else(|| {
            anyhow::anyhow!("Usage: rebuild-paths <db-path> (or set BARSHELF_DB_PATH)")
        })?;

    tracing::info!("Rebuilding materialized paths in {}", db_path.display());

    let store = Arc::new(TursoStore::open(db_path).await?);
    let service = HierarchyService::with_config(store, HierarchyConfig::from_env());

    let report = service.rebuild_all().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
