//! TursoStore - HierarchyStore Implementation for the libsql Backend
//!
//! Each transaction owns one connection and runs inside
//! `BEGIN IMMEDIATE ... COMMIT`, so a move takes the write lock before it
//! reads the descendant snapshot and concurrent movers queue behind it.
//!
//! Dropping an uncommitted transaction closes its connection, and SQLite
//! rolls back whatever the connection had open.
//!
//! # Examples
//!
//! ```rust,no_run
//! use barshelf_core::db::{HierarchyStore, HierarchyTransaction, TursoStore};
//! use barshelf_core::models::NewIngredient;
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = TursoStore::open(PathBuf::from("./data/barshelf.db")).await?;
//!
//!     let mut tx = store.begin().await?;
//!     let spirit = tx.insert(NewIngredient::new("Spirit"), None).await?;
//!     tx.commit().await?;
//!
//!     println!("Created ingredient {}", spirit.id);
//!     Ok(())
//! }
//! ```

use crate::db::database::DatabaseService;
use crate::db::error::{StoreError, StoreResult};
use crate::db::store::{HierarchyStore, HierarchyTransaction, StoredPlacement};
use crate::models::{IngredientId, IngredientNode, MaterializedPath, NewIngredient, PATH_SEPARATOR};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Row, Value};
use std::path::PathBuf;
use std::sync::Arc;

const SELECT_COLUMNS: &str = "SELECT id, parent_id, materialized_path, name, description, strength, origin, created_at, updated_at FROM ingredients";

const SELECT_PLACEMENT: &str = "SELECT id, parent_id, materialized_path FROM ingredients";

/// HierarchyStore over an embedded libsql database
#[derive(Debug, Clone)]
pub struct TursoStore {
    db: Arc<DatabaseService>,
}

impl TursoStore {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Open (or create) the database at `db_path` and wrap it
    pub async fn open(db_path: PathBuf) -> StoreResult<Self> {
        Ok(Self::new(Arc::new(DatabaseService::new(db_path).await?)))
    }

    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }
}

#[async_trait]
impl HierarchyStore for TursoStore {
    type Transaction = TursoTransaction;

    async fn begin(&self) -> StoreResult<TursoTransaction> {
        let conn = self.db.connect_with_timeout().await?;
        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            StoreError::transaction_failed(format!("Failed to begin transaction: {}", e))
        })?;
        Ok(TursoTransaction { conn })
    }
}

/// Transaction handle for [`TursoStore`]
pub struct TursoTransaction {
    conn: libsql::Connection,
}

impl TursoTransaction {
    async fn query_nodes(
        &self,
        sql: &str,
        params: Vec<Value>,
    ) -> StoreResult<Vec<IngredientNode>> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| StoreError::sql_execution(format!("Failed to execute query: {}", e)))?;

        let mut nodes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::sql_execution(e.to_string()))?
        {
            nodes.push(row_to_node(&row)?);
        }
        Ok(nodes)
    }

    async fn query_placements(
        &self,
        sql: &str,
        params: Vec<Value>,
    ) -> StoreResult<Vec<StoredPlacement>> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| StoreError::sql_execution(format!("Failed to execute query: {}", e)))?;

        let mut placements = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::sql_execution(e.to_string()))?
        {
            placements.push(row_to_placement(&row)?);
        }
        Ok(placements)
    }
}

#[async_trait]
impl HierarchyTransaction for TursoTransaction {
    async fn load(&mut self, id: IngredientId) -> StoreResult<Option<IngredientNode>> {
        let sql = format!("{} WHERE id = ?", SELECT_COLUMNS);
        let mut nodes = self.query_nodes(&sql, vec![Value::Integer(id.0)]).await?;
        Ok(nodes.pop())
    }

    async fn find_by_path_prefix(
        &mut self,
        prefix: &MaterializedPath,
    ) -> StoreResult<Vec<IngredientNode>> {
        // Half-open range over the path index (BINARY collation)
        let sql = format!(
            "{} WHERE materialized_path >= ? AND materialized_path < ?",
            SELECT_COLUMNS
        );
        self.query_nodes(
            &sql,
            vec![
                Value::Text(prefix.as_str().to_string()),
                Value::Text(prefix_upper_bound(prefix)),
            ],
        )
        .await
    }

    async fn find_children(&mut self, parent_id: IngredientId) -> StoreResult<Vec<IngredientNode>> {
        let sql = format!("{} WHERE parent_id = ?", SELECT_COLUMNS);
        self.query_nodes(&sql, vec![Value::Integer(parent_id.0)])
            .await
    }

    async fn find_roots(&mut self) -> StoreResult<Vec<IngredientNode>> {
        let sql = format!("{} WHERE parent_id IS NULL", SELECT_COLUMNS);
        self.query_nodes(&sql, Vec::new()).await
    }

    async fn find_children_raw(
        &mut self,
        parent_id: IngredientId,
    ) -> StoreResult<Vec<StoredPlacement>> {
        let sql = format!("{} WHERE parent_id = ?", SELECT_PLACEMENT);
        self.query_placements(&sql, vec![Value::Integer(parent_id.0)])
            .await
    }

    async fn find_roots_raw(&mut self) -> StoreResult<Vec<StoredPlacement>> {
        let sql = format!("{} WHERE parent_id IS NULL", SELECT_PLACEMENT);
        self.query_placements(&sql, Vec::new()).await
    }

    async fn set_placement(
        &mut self,
        id: IngredientId,
        parent_id: Option<IngredientId>,
        path: Option<&MaterializedPath>,
    ) -> StoreResult<()> {
        let affected = self
            .conn
            .execute(
                "UPDATE ingredients SET parent_id = ?, materialized_path = ?, updated_at = ? WHERE id = ?",
                vec![
                    id_value(parent_id),
                    path_value(path),
                    Value::Text(Utc::now().to_rfc3339()),
                    Value::Integer(id.0),
                ],
            )
            .await
            .map_err(|e| {
                StoreError::sql_execution(format!("Failed to place ingredient {}: {}", id, e))
            })?;

        if affected == 0 {
            return Err(StoreError::NotFound { id: id.0 });
        }
        Ok(())
    }

    async fn insert(
        &mut self,
        node: NewIngredient,
        path: Option<MaterializedPath>,
    ) -> StoreResult<IngredientNode> {
        let now = Utc::now();
        self.conn
            .execute(
                "INSERT INTO ingredients (parent_id, materialized_path, name, description, strength, origin, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                vec![
                    id_value(node.parent_id),
                    path_value(path.as_ref()),
                    Value::Text(node.name.clone()),
                    text_value(node.description.as_deref()),
                    real_value(node.strength),
                    text_value(node.origin.as_deref()),
                    Value::Text(now.to_rfc3339()),
                    Value::Text(now.to_rfc3339()),
                ],
            )
            .await
            .map_err(|e| StoreError::sql_execution(format!("Failed to insert ingredient: {}", e)))?;

        let id = IngredientId(self.conn.last_insert_rowid());
        Ok(IngredientNode {
            id,
            parent_id: node.parent_id,
            materialized_path: path,
            name: node.name,
            description: node.description,
            strength: node.strength,
            origin: node.origin,
            created_at: now,
            updated_at: now,
        })
    }

    async fn save(&mut self, node: &IngredientNode) -> StoreResult<()> {
        let affected = self
            .conn
            .execute(
                "UPDATE ingredients SET parent_id = ?, materialized_path = ?, name = ?, description = ?, strength = ?, origin = ?, updated_at = ?
                 WHERE id = ?",
                vec![
                    id_value(node.parent_id),
                    path_value(node.materialized_path.as_ref()),
                    Value::Text(node.name.clone()),
                    text_value(node.description.as_deref()),
                    real_value(node.strength),
                    text_value(node.origin.as_deref()),
                    Value::Text(node.updated_at.to_rfc3339()),
                    Value::Integer(node.id.0),
                ],
            )
            .await
            .map_err(|e| {
                StoreError::sql_execution(format!("Failed to update ingredient {}: {}", node.id, e))
            })?;

        if affected == 0 {
            return Err(StoreError::NotFound { id: node.id.0 });
        }
        Ok(())
    }

    async fn delete(&mut self, id: IngredientId) -> StoreResult<bool> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM ingredients WHERE id = ?",
                vec![Value::Integer(id.0)],
            )
            .await
            .map_err(|e| {
                StoreError::sql_execution(format!("Failed to delete ingredient {}: {}", id, e))
            })?;
        Ok(affected > 0)
    }

    async fn commit(self) -> StoreResult<()> {
        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            let _rollback = self.conn.execute("ROLLBACK", ()).await;
            return Err(StoreError::transaction_failed(format!(
                "Failed to commit transaction: {}",
                e
            )));
        }
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.conn.execute("ROLLBACK", ()).await.map_err(|e| {
            StoreError::transaction_failed(format!("Failed to roll back transaction: {}", e))
        })?;
        Ok(())
    }
}

/// Smallest string greater than every path starting with `prefix`
///
/// Paths end with the separator, so bumping that last character to its
/// successor ('.' -> '/') closes the range.
fn prefix_upper_bound(prefix: &MaterializedPath) -> String {
    let stem = prefix
        .as_str()
        .strip_suffix(PATH_SEPARATOR)
        .unwrap_or(prefix.as_str());
    let successor = char::from_u32(PATH_SEPARATOR as u32 + 1).unwrap_or(char::MAX);
    format!("{}{}", stem, successor)
}

fn id_value(id: Option<IngredientId>) -> Value {
    id.map_or(Value::Null, |id| Value::Integer(id.0))
}

fn path_value(path: Option<&MaterializedPath>) -> Value {
    path.map_or(Value::Null, |p| Value::Text(p.as_str().to_string()))
}

fn text_value(text: Option<&str>) -> Value {
    text.map_or(Value::Null, |t| Value::Text(t.to_string()))
}

fn real_value(real: Option<f64>) -> Value {
    real.map_or(Value::Null, Value::Real)
}

/// Parse timestamp from database - handles both RFC3339 and SQLite formats
///
/// Rows written by this store use RFC3339; rows written by hand through
/// `CURRENT_TIMESTAMP` use "YYYY-MM-DD HH:MM:SS".
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Hierarchy columns of a row; a bad path is returned, not raised
fn row_to_placement(row: &Row) -> StoreResult<StoredPlacement> {
    let id: i64 = row
        .get(0)
        .map_err(|e| StoreError::corrupt_row(0, format!("Failed to get id: {}", e)))?;
    let parent_id: Option<i64> = row
        .get(1)
        .map_err(|e| StoreError::corrupt_row(id, format!("Failed to get parent_id: {}", e)))?;
    let raw_path: Option<String> = row.get(2).map_err(|e| {
        StoreError::corrupt_row(id, format!("Failed to get materialized_path: {}", e))
    })?;

    Ok(StoredPlacement {
        id: IngredientId(id),
        parent_id: parent_id.map(IngredientId),
        materialized_path: raw_path.map(|raw| MaterializedPath::parse(&raw)).transpose(),
    })
}

/// Convert a libsql row into an `IngredientNode`
///
/// A stored path that does not parse is reported as a corrupt row rather
/// than read as root.
///
/// # Row Format
///
/// id, parent_id, materialized_path, name, description, strength, origin,
/// created_at, updated_at (see `SELECT_COLUMNS`)
fn row_to_node(row: &Row) -> StoreResult<IngredientNode> {
    let id: i64 = row
        .get(0)
        .map_err(|e| StoreError::corrupt_row(0, format!("Failed to get id: {}", e)))?;
    let corrupt = |field: &str, e: libsql::Error| {
        StoreError::corrupt_row(id, format!("Failed to get {}: {}", field, e))
    };

    let parent_id: Option<i64> = row.get(1).map_err(|e| corrupt("parent_id", e))?;
    let raw_path: Option<String> = row.get(2).map_err(|e| corrupt("materialized_path", e))?;
    let name: String = row.get(3).map_err(|e| corrupt("name", e))?;
    let description: Option<String> = row.get(4).map_err(|e| corrupt("description", e))?;
    let strength: Option<f64> = row.get(5).map_err(|e| corrupt("strength", e))?;
    let origin: Option<String> = row.get(6).map_err(|e| corrupt("origin", e))?;
    let created_at_str: String = row.get(7).map_err(|e| corrupt("created_at", e))?;
    let updated_at_str: String = row.get(8).map_err(|e| corrupt("updated_at", e))?;

    let materialized_path = raw_path
        .map(|raw| MaterializedPath::parse(&raw))
        .transpose()
        .map_err(|source| StoreError::MalformedPath { id, source })?;

    let created_at = parse_timestamp(&created_at_str).ok_or_else(|| {
        StoreError::corrupt_row(id, format!("unparseable created_at '{}'", created_at_str))
    })?;
    let updated_at = parse_timestamp(&updated_at_str).ok_or_else(|| {
        StoreError::corrupt_row(id, format!("unparseable updated_at '{}'", updated_at_str))
    })?;

    Ok(IngredientNode {
        id: IngredientId(id),
        parent_id: parent_id.map(IngredientId),
        materialized_path,
        name,
        description,
        strength,
        origin,
        created_at,
        updated_at,
    })
}
