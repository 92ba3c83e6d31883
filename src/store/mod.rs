//! Storage backends.
//!
//! Two traits split the persistence contract:
//!
//! - [`GraphStore`]: nodes, details, table rows, edges, areas and map
//!   versions. Reads are available directly; every write goes through a
//!   [`GraphTransaction`] so multi-entity changes (restore, snapshot,
//!   cascading delete) are all-or-nothing.
//! - [`AuditStore`]: the append-only audit log.
//!
//! A transaction that is dropped without `commit` must leave no trace.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::types::{
    Area, AreaId, AuditEntry, AuditQuery, Edge, EdgeId, EntityType, MapVersion, Node,
    NodeDetail, NodeId, NodeRecord, RowId, TableRow, UserId, VersionId,
};

/// Trait for graph storage backends.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Unit of work spanning every entity kind.
    type Transaction: GraphTransaction<Error = Self::Error>;

    /// Open a transaction.
    async fn begin(&self) -> Result<Self::Transaction, Self::Error>;

    /// Fetch an area.
    async fn get_area(&self, id: AreaId) -> Result<Option<Area>, Self::Error>;

    /// Fetch a node with detail and ordered rows.
    async fn get_node(&self, id: NodeId) -> Result<Option<NodeRecord>, Self::Error>;

    /// Every node of an area with detail and ordered rows (ordered by NodeId).
    async fn nodes_in_area(&self, area: AreaId) -> Result<Vec<NodeRecord>, Self::Error>;

    /// Ids of edges whose source or target is the node.
    async fn incident_edge_ids(&self, node: NodeId) -> Result<Vec<EdgeId>, Self::Error>;

    /// Ids of table rows under the node's detail.
    async fn row_ids_for_node(&self, node: NodeId) -> Result<Vec<RowId>, Self::Error>;

    /// Fetch a map version.
    async fn get_version(&self, id: VersionId) -> Result<Option<MapVersion>, Self::Error>;

    /// Versions of an area, newest first.
    async fn list_versions(&self, area: AreaId) -> Result<Vec<MapVersion>, Self::Error>;
}

/// Write-capable view of the graph inside one transaction.
///
/// Reads through the transaction observe its own uncommitted writes.
#[async_trait]
pub trait GraphTransaction: Send + Sized {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch an area.
    async fn get_area(&mut self, id: AreaId) -> Result<Option<Area>, Self::Error>;

    /// Insert an area.
    async fn insert_area(&mut self, area: &Area) -> Result<(), Self::Error>;

    /// Overwrite an area's name and country.
    async fn update_area(&mut self, area: &Area) -> Result<(), Self::Error>;

    /// Delete an area and its versions. Its nodes stay, with `area_id` cleared.
    async fn delete_area(&mut self, id: AreaId) -> Result<bool, Self::Error>;

    /// Fetch a node with detail and ordered rows.
    async fn get_node(&mut self, id: NodeId) -> Result<Option<NodeRecord>, Self::Error>;

    /// Every node of an area with detail and ordered rows (ordered by NodeId).
    async fn nodes_in_area(&mut self, area: AreaId) -> Result<Vec<NodeRecord>, Self::Error>;

    /// Insert a node together with its detail.
    async fn insert_node(&mut self, node: &Node, detail: &NodeDetail) -> Result<(), Self::Error>;

    /// Overwrite a node and its detail.
    async fn update_node(&mut self, node: &Node, detail: &NodeDetail) -> Result<(), Self::Error>;

    /// Set or clear a node's parent.
    async fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<(), Self::Error>;

    /// Delete a node, its incident edges, detail and rows. Children lose
    /// their parent link.
    async fn delete_node(&mut self, id: NodeId) -> Result<bool, Self::Error>;

    /// Delete every node of an area (cascade as in `delete_node`).
    /// Returns the removed node ids.
    async fn delete_nodes_in_area(&mut self, area: AreaId) -> Result<Vec<NodeId>, Self::Error>;

    /// Edges whose source and target are both in `nodes`.
    async fn edges_within(&mut self, nodes: &[NodeId]) -> Result<Vec<Edge>, Self::Error>;

    /// Delete edges whose source or target is in `nodes`.
    async fn delete_edges_touching(&mut self, nodes: &[NodeId]) -> Result<u64, Self::Error>;

    /// Fetch an edge.
    async fn get_edge(&mut self, id: EdgeId) -> Result<Option<Edge>, Self::Error>;

    /// Insert an edge.
    async fn insert_edge(&mut self, edge: &Edge) -> Result<(), Self::Error>;

    /// Overwrite an edge.
    async fn update_edge(&mut self, edge: &Edge) -> Result<(), Self::Error>;

    /// Delete an edge.
    async fn delete_edge(&mut self, id: EdgeId) -> Result<bool, Self::Error>;

    /// Fetch a table row.
    async fn get_table_row(&mut self, id: RowId) -> Result<Option<TableRow>, Self::Error>;

    /// Insert a table row.
    async fn insert_table_row(&mut self, row: &TableRow) -> Result<(), Self::Error>;

    /// Overwrite a table row.
    async fn update_table_row(&mut self, row: &TableRow) -> Result<(), Self::Error>;

    /// Delete a table row.
    async fn delete_table_row(&mut self, id: RowId) -> Result<bool, Self::Error>;

    /// Fetch a map version.
    async fn get_version(&mut self, id: VersionId) -> Result<Option<MapVersion>, Self::Error>;

    /// Persist a map version.
    async fn insert_version(&mut self, version: &MapVersion) -> Result<(), Self::Error>;

    /// Delete a map version.
    async fn delete_version(&mut self, id: VersionId) -> Result<bool, Self::Error>;

    /// Make every write visible atomically. Dropping the transaction
    /// instead discards every write.
    async fn commit(self) -> Result<(), Self::Error>;
}

/// Trait for audit log backends.
///
/// Result lists are newest first; entries with equal timestamps keep the
/// most recently appended first.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Append one entry.
    async fn append(&self, entry: &AuditEntry) -> Result<(), Self::Error>;

    /// Entries of one entity.
    async fn by_entity(&self, entity_type: EntityType, entity_id: Uuid) -> Result<Vec<AuditEntry>, Self::Error>;

    /// Entries of several entities of one kind.
    async fn by_entities(&self, entity_type: EntityType, entity_ids: &[Uuid]) -> Result<Vec<AuditEntry>, Self::Error>;

    /// Entries written by a user, optionally capped.
    async fn by_user(&self, user: UserId, limit: Option<usize>) -> Result<Vec<AuditEntry>, Self::Error>;

    /// One page of filtered entries plus the total match count.
    async fn query(
        &self,
        filter: &AuditQuery,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<AuditEntry>, u64), Self::Error>;
}

pub use memory::{FailPoint, InMemoryAuditStore, InMemoryError, InMemoryGraphStore, InMemoryTransaction};

#[cfg(feature = "postgres")]
pub use postgres::{PoolStats, PostgresAuditStore, PostgresConfig, PostgresError, PostgresGraphStore};
