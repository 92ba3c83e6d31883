//! PostgreSQL storage for production use.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)
//!
//! Cascades (rows under a detail, edges and details under a node, versions
//! under an area) live in the schema's foreign keys, so deletes here are
//! single statements.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row, Transaction};
use uuid::Uuid;

use super::{AuditStore, GraphStore, GraphTransaction};
use crate::types::{
    ActionType, Area, AreaId, AuditEntry, AuditId, AuditQuery, ChangeSet, CountryId, DetailId,
    Edge, EdgeId, EntityType, Handler, MapVersion, Measured, Node, NodeDetail, NodeId, NodeRecord,
    NodeType, Position, RowId, Snapshot, TableRow, UserId, VersionId, VisualState,
};

/// DDL applied by [`PostgresGraphStore::ensure_schema`]. Every statement is idempotent.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS areas (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        country_id UUID NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS nodes (
        id UUID PRIMARY KEY,
        node_type TEXT NOT NULL,
        position_x DOUBLE PRECISION NOT NULL,
        position_y DOUBLE PRECISION NOT NULL,
        measured JSONB,
        parent_id UUID REFERENCES nodes(id) ON DELETE SET NULL,
        area_id UUID REFERENCES areas(id) ON DELETE SET NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS nodes_area_idx ON nodes (area_id)",
    r#"
    CREATE TABLE IF NOT EXISTS node_details (
        id UUID PRIMARY KEY,
        node_id UUID NOT NULL UNIQUE REFERENCES nodes(id) ON DELETE CASCADE,
        label TEXT NOT NULL,
        handlers JSONB NOT NULL DEFAULT '[]'::jsonb,
        locked BOOLEAN NOT NULL DEFAULT FALSE,
        visual_state JSONB
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS table_rows (
        id UUID PRIMARY KEY,
        detail_id UUID NOT NULL REFERENCES node_details(id) ON DELETE CASCADE,
        protection_name TEXT NOT NULL,
        excerpt TEXT NOT NULL,
        source TEXT NOT NULL,
        triggering_algorithm TEXT NOT NULL,
        triggering_conditions TEXT NOT NULL,
        "order" INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS table_rows_detail_idx ON table_rows (detail_id)",
    r#"
    CREATE TABLE IF NOT EXISTS edges (
        id UUID PRIMARY KEY,
        source UUID NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
        target UUID NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
        source_handle TEXT,
        target_handle TEXT,
        edge_type TEXT NOT NULL,
        style JSONB NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS edges_source_idx ON edges (source)",
    "CREATE INDEX IF NOT EXISTS edges_target_idx ON edges (target)",
    r#"
    CREATE TABLE IF NOT EXISTS map_versions (
        id UUID PRIMARY KEY,
        area_id UUID NOT NULL REFERENCES areas(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        description TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        created_by UUID NOT NULL,
        snapshot JSONB NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS map_versions_area_idx ON map_versions (area_id, created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS audit_entries (
        seq BIGSERIAL,
        id UUID PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL,
        user_id UUID NOT NULL,
        entity_type TEXT NOT NULL,
        entity_id UUID NOT NULL,
        action_type TEXT NOT NULL,
        changes JSONB NOT NULL,
        description TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS audit_entity_idx ON audit_entries (entity_type, entity_id)",
    "CREATE INDEX IF NOT EXISTS audit_user_idx ON audit_entries (user_id)",
    "CREATE INDEX IF NOT EXISTS audit_created_idx ON audit_entries (created_at DESC)",
];

const NODE_SELECT: &str = r#"
    SELECT n.id, n.node_type, n.position_x, n.position_y, n.measured, n.parent_id, n.area_id,
           d.id AS detail_id, d.label, d.handlers, d.locked, d.visual_state
    FROM nodes n
    LEFT JOIN node_details d ON d.node_id = n.id
"#;

const AUDIT_COLUMNS: &str =
    "id, created_at, user_id, entity_type, entity_id, action_type, changes, description";

const AUDIT_ORDER: &str = " ORDER BY created_at DESC, seq DESC";

/// Configuration for PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800).
    pub max_lifetime_secs: u64,
}

impl PostgresConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(key: &str, default: T) -> T {
            std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
        }

        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/area_graph".to_string()),
            max_connections: var("DB_MAX_CONNECTIONS", 10),
            min_connections: var("DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: var("DB_CONNECT_TIMEOUT_SECS", 10),
            idle_timeout_secs: var("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: var("DB_MAX_LIFETIME_SECS", 1800),
        }
    }

    /// Override the connection URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Error type for PostgreSQL stores.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A stored value could not be mapped back to a domain type.
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    /// Current pool size.
    pub size: u32,
    /// Number of idle connections.
    pub idle: usize,
    /// Maximum pool size.
    pub max: u32,
}

/// PostgreSQL graph store.
#[derive(Debug, Clone)]
pub struct PostgresGraphStore {
    pool: PgPool,
}

impl PostgresGraphStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, sqlx::Error> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Audit store sharing this store's pool.
    pub fn audit_store(&self) -> PostgresAuditStore {
        PostgresAuditStore::new(self.pool.clone())
    }

    /// Create tables and indexes if they are missing.
    pub async fn ensure_schema(&self) -> Result<(), PostgresError> {
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!(statements = SCHEMA_STATEMENTS.len(), "Schema ensured");
        Ok(())
    }

    /// Check if the database is reachable.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    /// Get pool statistics for monitoring.
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max: self.pool.options().get_max_connections(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

fn parse_node_row(row: &PgRow) -> Result<(Node, Option<NodeDetail>), PostgresError> {
    let id = NodeId::new(row.try_get("id")?);
    let type_str: String = row.try_get("node_type")?;
    let node_type = NodeType::from_str(&type_str)
        .ok_or_else(|| PostgresError::Decode(format!("unknown node type {type_str:?}")))?;
    let measured: Option<Json<Measured>> = row.try_get("measured")?;
    let parent_id: Option<Uuid> = row.try_get("parent_id")?;
    let area_id: Option<Uuid> = row.try_get("area_id")?;

    let node = Node {
        id,
        node_type,
        position: Position::new(row.try_get("position_x")?, row.try_get("position_y")?),
        measured: measured.map(|m| m.0),
        parent_id: parent_id.map(NodeId::new),
        area_id: area_id.map(AreaId::new),
    };

    let detail_id: Option<Uuid> = row.try_get("detail_id")?;
    let detail = match detail_id {
        Some(detail_id) => {
            let handlers: Json<Vec<Handler>> = row.try_get("handlers")?;
            let visual_state: Option<Json<VisualState>> = row.try_get("visual_state")?;
            Some(NodeDetail {
                id: DetailId::new(detail_id),
                node_id: id,
                label: row.try_get("label")?,
                handlers: handlers.0,
                locked: row.try_get("locked")?,
                visual_state: visual_state.map(|v| v.0),
            })
        }
        None => None,
    };

    Ok((node, detail))
}

fn parse_table_row(row: &PgRow) -> Result<TableRow, PostgresError> {
    Ok(TableRow {
        id: RowId::new(row.try_get("id")?),
        detail_id: DetailId::new(row.try_get("detail_id")?),
        protection_name: row.try_get("protection_name")?,
        excerpt: row.try_get("excerpt")?,
        source: row.try_get("source")?,
        triggering_algorithm: row.try_get("triggering_algorithm")?,
        triggering_conditions: row.try_get("triggering_conditions")?,
        order: row.try_get("order")?,
    })
}

fn parse_edge_row(row: &PgRow) -> Result<Edge, PostgresError> {
    let style: Value = row.try_get("style")?;
    Ok(Edge {
        id: EdgeId::new(row.try_get("id")?),
        source: NodeId::new(row.try_get("source")?),
        target: NodeId::new(row.try_get("target")?),
        source_handle: row.try_get("source_handle")?,
        target_handle: row.try_get("target_handle")?,
        edge_type: row.try_get("edge_type")?,
        style,
    })
}

fn parse_area_row(row: &PgRow) -> Result<Area, PostgresError> {
    Ok(Area {
        id: AreaId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        country_id: CountryId::new(row.try_get("country_id")?),
    })
}

fn parse_version_row(row: &PgRow) -> Result<MapVersion, PostgresError> {
    let snapshot: Json<Snapshot> = row.try_get("snapshot")?;
    Ok(MapVersion {
        id: VersionId::new(row.try_get("id")?),
        area_id: AreaId::new(row.try_get("area_id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        created_by: UserId::new(row.try_get("created_by")?),
        snapshot: snapshot.0,
    })
}

fn parse_audit_row(row: &PgRow) -> Result<AuditEntry, PostgresError> {
    let entity_str: String = row.try_get("entity_type")?;
    let action_str: String = row.try_get("action_type")?;
    let changes: Json<ChangeSet> = row.try_get("changes")?;
    Ok(AuditEntry {
        id: AuditId::new(row.try_get("id")?),
        created_at: row.try_get("created_at")?,
        user_id: UserId::new(row.try_get("user_id")?),
        entity_type: EntityType::from_str(&entity_str)
            .ok_or_else(|| PostgresError::Decode(format!("unknown entity type {entity_str:?}")))?,
        entity_id: row.try_get("entity_id")?,
        action_type: ActionType::from_str(&action_str)
            .ok_or_else(|| PostgresError::Decode(format!("unknown action type {action_str:?}")))?,
        changes: changes.0,
        description: row.try_get("description")?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared queries (pool connection or transaction)
// ─────────────────────────────────────────────────────────────────────────────

async fn attach_rows(
    conn: &mut PgConnection,
    nodes: Vec<(Node, Option<NodeDetail>)>,
) -> Result<Vec<NodeRecord>, PostgresError> {
    let detail_ids: Vec<Uuid> = nodes
        .iter()
        .filter_map(|(_, d)| d.as_ref().map(|d| d.id.as_uuid()))
        .collect();

    let mut by_detail: HashMap<DetailId, Vec<TableRow>> = HashMap::new();
    if !detail_ids.is_empty() {
        let rows = sqlx::query(
            r#"
            SELECT id, detail_id, protection_name, excerpt, source,
                   triggering_algorithm, triggering_conditions, "order"
            FROM table_rows
            WHERE detail_id = ANY($1)
            ORDER BY "order", id
            "#,
        )
        .bind(&detail_ids)
        .fetch_all(&mut *conn)
        .await?;

        for row in &rows {
            let row = parse_table_row(row)?;
            by_detail.entry(row.detail_id).or_default().push(row);
        }
    }

    Ok(nodes
        .into_iter()
        .map(|(node, detail)| {
            let rows = detail
                .as_ref()
                .and_then(|d| by_detail.remove(&d.id))
                .unwrap_or_default();
            NodeRecord { node, detail, rows }
        })
        .collect())
}

async fn fetch_node(conn: &mut PgConnection, id: NodeId) -> Result<Option<NodeRecord>, PostgresError> {
    let row = sqlx::query(&format!("{NODE_SELECT} WHERE n.id = $1"))
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(ref r) => {
            let parsed = parse_node_row(r)?;
            Ok(attach_rows(conn, vec![parsed]).await?.pop())
        }
        None => Ok(None),
    }
}

async fn fetch_area_nodes(conn: &mut PgConnection, area: AreaId) -> Result<Vec<NodeRecord>, PostgresError> {
    let rows = sqlx::query(&format!("{NODE_SELECT} WHERE n.area_id = $1 ORDER BY n.id"))
        .bind(area.as_uuid())
        .fetch_all(&mut *conn)
        .await?;

    let nodes = rows.iter().map(parse_node_row).collect::<Result<Vec<_>, _>>()?;
    attach_rows(conn, nodes).await
}

async fn fetch_area(conn: &mut PgConnection, id: AreaId) -> Result<Option<Area>, PostgresError> {
    let row = sqlx::query("SELECT id, name, country_id FROM areas WHERE id = $1")
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(parse_area_row).transpose()
}

async fn fetch_version(conn: &mut PgConnection, id: VersionId) -> Result<Option<MapVersion>, PostgresError> {
    let row = sqlx::query(
        r#"
        SELECT id, area_id, name, description, created_at, created_by, snapshot
        FROM map_versions
        WHERE id = $1
        "#,
    )
    .bind(id.as_uuid())
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(parse_version_row).transpose()
}

fn id_column(row: &PgRow) -> Result<Uuid, PostgresError> {
    Ok(row.try_get("id")?)
}

fn uuids<T: Copy>(ids: &[T], f: impl Fn(T) -> Uuid) -> Vec<Uuid> {
    ids.iter().copied().map(f).collect()
}

#[async_trait]
impl GraphStore for PostgresGraphStore {
    type Error = PostgresError;
    type Transaction = PostgresTransaction;

    async fn begin(&self) -> Result<Self::Transaction, Self::Error> {
        Ok(PostgresTransaction {
            tx: self.pool.begin().await?,
        })
    }

    async fn get_area(&self, id: AreaId) -> Result<Option<Area>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_area(&mut *conn, id).await
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<NodeRecord>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_node(&mut *conn, id).await
    }

    async fn nodes_in_area(&self, area: AreaId) -> Result<Vec<NodeRecord>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_area_nodes(&mut *conn, area).await
    }

    async fn incident_edge_ids(&self, node: NodeId) -> Result<Vec<EdgeId>, Self::Error> {
        let rows = sqlx::query("SELECT id FROM edges WHERE source = $1 OR target = $1 ORDER BY id")
            .bind(node.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| id_column(r).map(EdgeId::new))
            .collect()
    }

    async fn row_ids_for_node(&self, node: NodeId) -> Result<Vec<RowId>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT r.id
            FROM table_rows r
            JOIN node_details d ON d.id = r.detail_id
            WHERE d.node_id = $1
            ORDER BY r."order", r.id
            "#,
        )
        .bind(node.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| id_column(r).map(RowId::new))
            .collect()
    }

    async fn get_version(&self, id: VersionId) -> Result<Option<MapVersion>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_version(&mut *conn, id).await
    }

    async fn list_versions(&self, area: AreaId) -> Result<Vec<MapVersion>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, area_id, name, description, created_at, created_by, snapshot
            FROM map_versions
            WHERE area_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(area.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_version_row).collect()
    }
}

/// Transaction over a [`PostgresGraphStore`].
///
/// Dropping it without `commit` rolls back.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl GraphTransaction for PostgresTransaction {
    type Error = PostgresError;

    async fn get_area(&mut self, id: AreaId) -> Result<Option<Area>, Self::Error> {
        fetch_area(&mut *self.tx, id).await
    }

    async fn insert_area(&mut self, area: &Area) -> Result<(), Self::Error> {
        sqlx::query("INSERT INTO areas (id, name, country_id) VALUES ($1, $2, $3)")
            .bind(area.id.as_uuid())
            .bind(&area.name)
            .bind(area.country_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_area(&mut self, area: &Area) -> Result<(), Self::Error> {
        sqlx::query("UPDATE areas SET name = $2, country_id = $3 WHERE id = $1")
            .bind(area.id.as_uuid())
            .bind(&area.name)
            .bind(area.country_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_area(&mut self, id: AreaId) -> Result<bool, Self::Error> {
        let result = sqlx::query("DELETE FROM areas WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_node(&mut self, id: NodeId) -> Result<Option<NodeRecord>, Self::Error> {
        fetch_node(&mut *self.tx, id).await
    }

    async fn nodes_in_area(&mut self, area: AreaId) -> Result<Vec<NodeRecord>, Self::Error> {
        fetch_area_nodes(&mut *self.tx, area).await
    }

    async fn insert_node(&mut self, node: &Node, detail: &NodeDetail) -> Result<(), Self::Error> {
        sqlx::query(
            r#"
            INSERT INTO nodes (id, node_type, position_x, position_y, measured, parent_id, area_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(node.id.as_uuid())
        .bind(node.node_type.to_string())
        .bind(node.position.x)
        .bind(node.position.y)
        .bind(node.measured.map(Json))
        .bind(node.parent_id.map(|p| p.as_uuid()))
        .bind(node.area_id.map(|a| a.as_uuid()))
        .execute(&mut *self.tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO node_details (id, node_id, label, handlers, locked, visual_state)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(detail.id.as_uuid())
        .bind(node.id.as_uuid())
        .bind(&detail.label)
        .bind(Json(&detail.handlers))
        .bind(detail.locked)
        .bind(detail.visual_state.as_ref().map(Json))
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_node(&mut self, node: &Node, detail: &NodeDetail) -> Result<(), Self::Error> {
        sqlx::query(
            r#"
            UPDATE nodes
            SET node_type = $2, position_x = $3, position_y = $4, measured = $5,
                parent_id = $6, area_id = $7
            WHERE id = $1
            "#,
        )
        .bind(node.id.as_uuid())
        .bind(node.node_type.to_string())
        .bind(node.position.x)
        .bind(node.position.y)
        .bind(node.measured.map(Json))
        .bind(node.parent_id.map(|p| p.as_uuid()))
        .bind(node.area_id.map(|a| a.as_uuid()))
        .execute(&mut *self.tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO node_details (id, node_id, label, handlers, locked, visual_state)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET label = EXCLUDED.label, handlers = EXCLUDED.handlers,
                locked = EXCLUDED.locked, visual_state = EXCLUDED.visual_state
            "#,
        )
        .bind(detail.id.as_uuid())
        .bind(node.id.as_uuid())
        .bind(&detail.label)
        .bind(Json(&detail.handlers))
        .bind(detail.locked)
        .bind(detail.visual_state.as_ref().map(Json))
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<(), Self::Error> {
        sqlx::query("UPDATE nodes SET parent_id = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(parent.map(|p| p.as_uuid()))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_node(&mut self, id: NodeId) -> Result<bool, Self::Error> {
        let result = sqlx::query("DELETE FROM nodes WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_nodes_in_area(&mut self, area: AreaId) -> Result<Vec<NodeId>, Self::Error> {
        let rows = sqlx::query("DELETE FROM nodes WHERE area_id = $1 RETURNING id")
            .bind(area.as_uuid())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter()
            .map(|r| id_column(r).map(NodeId::new))
            .collect()
    }

    async fn edges_within(&mut self, nodes: &[NodeId]) -> Result<Vec<Edge>, Self::Error> {
        let ids = uuids(nodes, |n| n.as_uuid());
        let rows = sqlx::query(
            r#"
            SELECT id, source, target, source_handle, target_handle, edge_type, style
            FROM edges
            WHERE source = ANY($1) AND target = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(parse_edge_row).collect()
    }

    async fn delete_edges_touching(&mut self, nodes: &[NodeId]) -> Result<u64, Self::Error> {
        let ids = uuids(nodes, |n| n.as_uuid());
        let result = sqlx::query("DELETE FROM edges WHERE source = ANY($1) OR target = ANY($1)")
            .bind(&ids)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_edge(&mut self, id: EdgeId) -> Result<Option<Edge>, Self::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, source, target, source_handle, target_handle, edge_type, style
            FROM edges
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(parse_edge_row).transpose()
    }

    async fn insert_edge(&mut self, edge: &Edge) -> Result<(), Self::Error> {
        sqlx::query(
            r#"
            INSERT INTO edges (id, source, target, source_handle, target_handle, edge_type, style)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(edge.id.as_uuid())
        .bind(edge.source.as_uuid())
        .bind(edge.target.as_uuid())
        .bind(&edge.source_handle)
        .bind(&edge.target_handle)
        .bind(&edge.edge_type)
        .bind(&edge.style)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_edge(&mut self, edge: &Edge) -> Result<(), Self::Error> {
        sqlx::query(
            r#"
            UPDATE edges
            SET source = $2, target = $3, source_handle = $4, target_handle = $5,
                edge_type = $6, style = $7
            WHERE id = $1
            "#,
        )
        .bind(edge.id.as_uuid())
        .bind(edge.source.as_uuid())
        .bind(edge.target.as_uuid())
        .bind(&edge.source_handle)
        .bind(&edge.target_handle)
        .bind(&edge.edge_type)
        .bind(&edge.style)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_edge(&mut self, id: EdgeId) -> Result<bool, Self::Error> {
        let result = sqlx::query("DELETE FROM edges WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_table_row(&mut self, id: RowId) -> Result<Option<TableRow>, Self::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, detail_id, protection_name, excerpt, source,
                   triggering_algorithm, triggering_conditions, "order"
            FROM table_rows
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(parse_table_row).transpose()
    }

    async fn insert_table_row(&mut self, row: &TableRow) -> Result<(), Self::Error> {
        sqlx::query(
            r#"
            INSERT INTO table_rows (id, detail_id, protection_name, excerpt, source,
                                    triggering_algorithm, triggering_conditions, "order")
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(row.id.as_uuid())
        .bind(row.detail_id.as_uuid())
        .bind(&row.protection_name)
        .bind(&row.excerpt)
        .bind(&row.source)
        .bind(&row.triggering_algorithm)
        .bind(&row.triggering_conditions)
        .bind(row.order)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_table_row(&mut self, row: &TableRow) -> Result<(), Self::Error> {
        sqlx::query(
            r#"
            UPDATE table_rows
            SET protection_name = $2, excerpt = $3, source = $4, triggering_algorithm = $5,
                triggering_conditions = $6, "order" = $7
            WHERE id = $1
            "#,
        )
        .bind(row.id.as_uuid())
        .bind(&row.protection_name)
        .bind(&row.excerpt)
        .bind(&row.source)
        .bind(&row.triggering_algorithm)
        .bind(&row.triggering_conditions)
        .bind(row.order)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_table_row(&mut self, id: RowId) -> Result<bool, Self::Error> {
        let result = sqlx::query("DELETE FROM table_rows WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_version(&mut self, id: VersionId) -> Result<Option<MapVersion>, Self::Error> {
        fetch_version(&mut *self.tx, id).await
    }

    async fn insert_version(&mut self, version: &MapVersion) -> Result<(), Self::Error> {
        sqlx::query(
            r#"
            INSERT INTO map_versions (id, area_id, name, description, created_at, created_by, snapshot)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(version.id.as_uuid())
        .bind(version.area_id.as_uuid())
        .bind(&version.name)
        .bind(&version.description)
        .bind(version.created_at)
        .bind(version.created_by.as_uuid())
        .bind(Json(&version.snapshot))
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_version(&mut self, id: VersionId) -> Result<bool, Self::Error> {
        let result = sqlx::query("DELETE FROM map_versions WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self) -> Result<(), Self::Error> {
        self.tx.commit().await?;
        Ok(())
    }
}

/// PostgreSQL audit log.
#[derive(Debug, Clone)]
pub struct PostgresAuditStore {
    pool: PgPool,
}

impl PostgresAuditStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &AuditQuery) {
    qb.push(" WHERE TRUE");
    if let Some(entity_type) = filter.entity_type {
        qb.push(" AND entity_type = ").push_bind(entity_type.as_str());
    }
    if let Some(action_type) = filter.action_type {
        qb.push(" AND action_type = ").push_bind(action_type.as_str());
    }
    if let Some(user) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user.as_uuid());
    }
    if let Some(from) = filter.date_from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.date_to {
        qb.push(" AND created_at <= ").push_bind(to);
    }
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    type Error = PostgresError;

    async fn append(&self, entry: &AuditEntry) -> Result<(), Self::Error> {
        sqlx::query(
            r#"
            INSERT INTO audit_entries (id, created_at, user_id, entity_type, entity_id,
                                       action_type, changes, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.created_at)
        .bind(entry.user_id.as_uuid())
        .bind(entry.entity_type.as_str())
        .bind(entry.entity_id)
        .bind(entry.action_type.as_str())
        .bind(Json(&entry.changes))
        .bind(&entry.description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn by_entity(&self, entity_type: EntityType, entity_id: Uuid) -> Result<Vec<AuditEntry>, Self::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_entries WHERE entity_type = $1 AND entity_id = $2{AUDIT_ORDER}"
        ))
        .bind(entity_type.as_str())
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_audit_row).collect()
    }

    async fn by_entities(&self, entity_type: EntityType, entity_ids: &[Uuid]) -> Result<Vec<AuditEntry>, Self::Error> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_entries WHERE entity_type = $1 AND entity_id = ANY($2){AUDIT_ORDER}"
        ))
        .bind(entity_type.as_str())
        .bind(entity_ids)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_audit_row).collect()
    }

    async fn by_user(&self, user: UserId, limit: Option<usize>) -> Result<Vec<AuditEntry>, Self::Error> {
        // LIMIT NULL is no limit.
        let rows = sqlx::query(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_entries WHERE user_id = $1{AUDIT_ORDER} LIMIT $2"
        ))
        .bind(user.as_uuid())
        .bind(limit.map(|l| l as i64))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_audit_row).collect()
    }

    async fn query(
        &self,
        filter: &AuditQuery,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<AuditEntry>, u64), Self::Error> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_entries");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut page = QueryBuilder::<Postgres>::new(format!("SELECT {AUDIT_COLUMNS} FROM audit_entries"));
        push_filters(&mut page, filter);
        page.push(AUDIT_ORDER);
        page.push(" LIMIT ").push_bind(limit as i64);
        page.push(" OFFSET ").push_bind(offset as i64);
        let rows = page.build().fetch_all(&self.pool).await?;

        let entries = rows.iter().map(parse_audit_row).collect::<Result<Vec<_>, _>>()?;
        Ok((entries, total.max(0) as u64))
    }
}
