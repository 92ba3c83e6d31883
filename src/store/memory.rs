//! In-memory storage backends for tests and embedded use.
//!
//! `InMemoryGraphStore` keeps the whole graph in BTreeMaps for deterministic
//! iteration. A transaction takes the exclusive lock, works on a staged copy
//! and swaps it in on commit, so readers only ever see committed state.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock as AsyncRwLock};
use uuid::Uuid;

use super::{AuditStore, GraphStore, GraphTransaction};
use crate::types::{
    sort_newest_first, Area, AreaId, AuditEntry, AuditQuery, DetailId, Edge, EdgeId, EntityType,
    MapVersion, Node, NodeDetail, NodeId, NodeRecord, RowId, TableRow, UserId, VersionId,
};

/// Error type for in-memory stores.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryError {
    /// A configured fault fired.
    #[error("Injected fault at {0:?}")]
    InjectedFault(FailPoint),
    /// Write referenced a missing node.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
    /// Write referenced a missing detail.
    #[error("Detail not found: {0}")]
    DetailNotFound(DetailId),
    /// Audit store switched to failing mode.
    #[error("Audit store unavailable")]
    Unavailable,
}

/// Transaction operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// `insert_node`.
    InsertNode,
    /// `set_parent`.
    SetParent,
    /// `insert_table_row`.
    InsertTableRow,
    /// `insert_edge`.
    InsertEdge,
    /// `insert_version`.
    InsertVersion,
    /// `commit`.
    Commit,
}

#[derive(Debug, Clone, Default)]
struct GraphState {
    areas: BTreeMap<AreaId, Area>,
    nodes: BTreeMap<NodeId, Node>,
    details: BTreeMap<DetailId, NodeDetail>,
    detail_by_node: BTreeMap<NodeId, DetailId>,
    rows: BTreeMap<RowId, TableRow>,
    edges: BTreeMap<EdgeId, Edge>,
    versions: BTreeMap<VersionId, MapVersion>,
}

impl GraphState {
    fn record(&self, id: NodeId) -> Option<NodeRecord> {
        let node = self.nodes.get(&id)?.clone();
        let detail = self
            .detail_by_node
            .get(&id)
            .and_then(|d| self.details.get(d))
            .cloned();
        let mut rows: Vec<TableRow> = match &detail {
            Some(d) => self.rows.values().filter(|r| r.detail_id == d.id).cloned().collect(),
            None => Vec::new(),
        };
        NodeRecord::sort_rows(&mut rows);
        Some(NodeRecord { node, detail, rows })
    }

    fn records_in_area(&self, area: AreaId) -> Vec<NodeRecord> {
        self.nodes
            .values()
            .filter(|n| n.area_id == Some(area))
            .filter_map(|n| self.record(n.id))
            .collect()
    }

    fn incident_edge_ids(&self, node: NodeId) -> Vec<EdgeId> {
        self.edges.values().filter(|e| e.touches(node)).map(|e| e.id).collect()
    }

    fn row_ids_for_node(&self, node: NodeId) -> Vec<RowId> {
        match self.detail_by_node.get(&node) {
            Some(detail) => self
                .rows
                .values()
                .filter(|r| r.detail_id == *detail)
                .map(|r| r.id)
                .collect(),
            None => Vec::new(),
        }
    }

    fn versions_of(&self, area: AreaId) -> Vec<MapVersion> {
        let mut versions: Vec<MapVersion> = self
            .versions
            .values()
            .filter(|v| v.area_id == area)
            .cloned()
            .collect();
        versions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        versions
    }

    fn remove_node(&mut self, id: NodeId) -> bool {
        if self.nodes.remove(&id).is_none() {
            return false;
        }
        if let Some(detail) = self.detail_by_node.remove(&id) {
            self.details.remove(&detail);
            self.rows.retain(|_, r| r.detail_id != detail);
        }
        self.edges.retain(|_, e| !e.touches(id));
        for child in self.nodes.values_mut() {
            if child.parent_id == Some(id) {
                child.parent_id = None;
            }
        }
        true
    }
}

/// In-memory graph store.
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGraphStore {
    state: Arc<AsyncRwLock<GraphState>>,
    faults: Arc<Mutex<HashSet<FailPoint>>>,
}

impl InMemoryGraphStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call of `point` fail until cleared.
    pub fn fail_on(&self, point: FailPoint) {
        self.faults.lock().insert(point);
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Insert a node without a detail, the way rows written by older
    /// clients look.
    pub async fn insert_detached_node(&self, node: Node) {
        self.state.write().await.nodes.insert(node.id, node);
    }

    /// Get number of nodes.
    pub async fn num_nodes(&self) -> usize {
        self.state.read().await.nodes.len()
    }

    /// Get number of edges.
    pub async fn num_edges(&self) -> usize {
        self.state.read().await.edges.len()
    }

    /// Get number of table rows.
    pub async fn num_rows(&self) -> usize {
        self.state.read().await.rows.len()
    }

    /// Get all edges.
    pub async fn all_edges(&self) -> Vec<Edge> {
        self.state.read().await.edges.values().cloned().collect()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    type Error = InMemoryError;
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Transaction, Self::Error> {
        let guard = Arc::clone(&self.state).write_owned().await;
        let staged = guard.clone();
        Ok(InMemoryTransaction {
            guard,
            staged,
            faults: Arc::clone(&self.faults),
        })
    }

    async fn get_area(&self, id: AreaId) -> Result<Option<Area>, Self::Error> {
        Ok(self.state.read().await.areas.get(&id).cloned())
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<NodeRecord>, Self::Error> {
        Ok(self.state.read().await.record(id))
    }

    async fn nodes_in_area(&self, area: AreaId) -> Result<Vec<NodeRecord>, Self::Error> {
        Ok(self.state.read().await.records_in_area(area))
    }

    async fn incident_edge_ids(&self, node: NodeId) -> Result<Vec<EdgeId>, Self::Error> {
        Ok(self.state.read().await.incident_edge_ids(node))
    }

    async fn row_ids_for_node(&self, node: NodeId) -> Result<Vec<RowId>, Self::Error> {
        Ok(self.state.read().await.row_ids_for_node(node))
    }

    async fn get_version(&self, id: VersionId) -> Result<Option<MapVersion>, Self::Error> {
        Ok(self.state.read().await.versions.get(&id).cloned())
    }

    async fn list_versions(&self, area: AreaId) -> Result<Vec<MapVersion>, Self::Error> {
        Ok(self.state.read().await.versions_of(area))
    }
}

/// Transaction over an [`InMemoryGraphStore`].
///
/// Holds the store's write lock for its whole lifetime.
pub struct InMemoryTransaction {
    guard: OwnedRwLockWriteGuard<GraphState>,
    staged: GraphState,
    faults: Arc<Mutex<HashSet<FailPoint>>>,
}

impl InMemoryTransaction {
    fn check(&self, point: FailPoint) -> Result<(), InMemoryError> {
        if self.faults.lock().contains(&point) {
            return Err(InMemoryError::InjectedFault(point));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphTransaction for InMemoryTransaction {
    type Error = InMemoryError;

    async fn get_area(&mut self, id: AreaId) -> Result<Option<Area>, Self::Error> {
        Ok(self.staged.areas.get(&id).cloned())
    }

    async fn insert_area(&mut self, area: &Area) -> Result<(), Self::Error> {
        self.staged.areas.insert(area.id, area.clone());
        Ok(())
    }

    async fn update_area(&mut self, area: &Area) -> Result<(), Self::Error> {
        self.staged.areas.insert(area.id, area.clone());
        Ok(())
    }

    async fn delete_area(&mut self, id: AreaId) -> Result<bool, Self::Error> {
        if self.staged.areas.remove(&id).is_none() {
            return Ok(false);
        }
        self.staged.versions.retain(|_, v| v.area_id != id);
        for node in self.staged.nodes.values_mut() {
            if node.area_id == Some(id) {
                node.area_id = None;
            }
        }
        Ok(true)
    }

    async fn get_node(&mut self, id: NodeId) -> Result<Option<NodeRecord>, Self::Error> {
        Ok(self.staged.record(id))
    }

    async fn nodes_in_area(&mut self, area: AreaId) -> Result<Vec<NodeRecord>, Self::Error> {
        Ok(self.staged.records_in_area(area))
    }

    async fn insert_node(&mut self, node: &Node, detail: &NodeDetail) -> Result<(), Self::Error> {
        self.check(FailPoint::InsertNode)?;
        self.staged.nodes.insert(node.id, node.clone());
        self.staged.details.insert(detail.id, detail.clone());
        self.staged.detail_by_node.insert(node.id, detail.id);
        Ok(())
    }

    async fn update_node(&mut self, node: &Node, detail: &NodeDetail) -> Result<(), Self::Error> {
        if !self.staged.nodes.contains_key(&node.id) {
            return Err(InMemoryError::NodeNotFound(node.id));
        }
        self.staged.nodes.insert(node.id, node.clone());
        self.staged.details.insert(detail.id, detail.clone());
        self.staged.detail_by_node.insert(node.id, detail.id);
        Ok(())
    }

    async fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<(), Self::Error> {
        self.check(FailPoint::SetParent)?;
        let node = self
            .staged
            .nodes
            .get_mut(&id)
            .ok_or(InMemoryError::NodeNotFound(id))?;
        node.parent_id = parent;
        Ok(())
    }

    async fn delete_node(&mut self, id: NodeId) -> Result<bool, Self::Error> {
        Ok(self.staged.remove_node(id))
    }

    async fn delete_nodes_in_area(&mut self, area: AreaId) -> Result<Vec<NodeId>, Self::Error> {
        let ids: Vec<NodeId> = self
            .staged
            .nodes
            .values()
            .filter(|n| n.area_id == Some(area))
            .map(|n| n.id)
            .collect();
        for id in &ids {
            self.staged.remove_node(*id);
        }
        Ok(ids)
    }

    async fn edges_within(&mut self, nodes: &[NodeId]) -> Result<Vec<Edge>, Self::Error> {
        let set: HashSet<NodeId> = nodes.iter().copied().collect();
        Ok(self
            .staged
            .edges
            .values()
            .filter(|e| set.contains(&e.source) && set.contains(&e.target))
            .cloned()
            .collect())
    }

    async fn delete_edges_touching(&mut self, nodes: &[NodeId]) -> Result<u64, Self::Error> {
        let set: HashSet<NodeId> = nodes.iter().copied().collect();
        let before = self.staged.edges.len();
        self.staged
            .edges
            .retain(|_, e| !set.contains(&e.source) && !set.contains(&e.target));
        Ok((before - self.staged.edges.len()) as u64)
    }

    async fn get_edge(&mut self, id: EdgeId) -> Result<Option<Edge>, Self::Error> {
        Ok(self.staged.edges.get(&id).cloned())
    }

    async fn insert_edge(&mut self, edge: &Edge) -> Result<(), Self::Error> {
        self.check(FailPoint::InsertEdge)?;
        self.staged.edges.insert(edge.id, edge.clone());
        Ok(())
    }

    async fn update_edge(&mut self, edge: &Edge) -> Result<(), Self::Error> {
        self.staged.edges.insert(edge.id, edge.clone());
        Ok(())
    }

    async fn delete_edge(&mut self, id: EdgeId) -> Result<bool, Self::Error> {
        Ok(self.staged.edges.remove(&id).is_some())
    }

    async fn get_table_row(&mut self, id: RowId) -> Result<Option<TableRow>, Self::Error> {
        Ok(self.staged.rows.get(&id).cloned())
    }

    async fn insert_table_row(&mut self, row: &TableRow) -> Result<(), Self::Error> {
        self.check(FailPoint::InsertTableRow)?;
        if !self.staged.details.contains_key(&row.detail_id) {
            return Err(InMemoryError::DetailNotFound(row.detail_id));
        }
        self.staged.rows.insert(row.id, row.clone());
        Ok(())
    }

    async fn update_table_row(&mut self, row: &TableRow) -> Result<(), Self::Error> {
        self.staged.rows.insert(row.id, row.clone());
        Ok(())
    }

    async fn delete_table_row(&mut self, id: RowId) -> Result<bool, Self::Error> {
        Ok(self.staged.rows.remove(&id).is_some())
    }

    async fn get_version(&mut self, id: VersionId) -> Result<Option<MapVersion>, Self::Error> {
        Ok(self.staged.versions.get(&id).cloned())
    }

    async fn insert_version(&mut self, version: &MapVersion) -> Result<(), Self::Error> {
        self.check(FailPoint::InsertVersion)?;
        self.staged.versions.insert(version.id, version.clone());
        Ok(())
    }

    async fn delete_version(&mut self, id: VersionId) -> Result<bool, Self::Error> {
        Ok(self.staged.versions.remove(&id).is_some())
    }

    async fn commit(self) -> Result<(), Self::Error> {
        self.check(FailPoint::Commit)?;
        let Self { mut guard, staged, .. } = self;
        *guard = staged;
        Ok(())
    }
}

/// In-memory append-only audit log.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    entries: RwLock<Vec<AuditEntry>>,
    failing: AtomicBool,
}

impl InMemoryAuditStore {
    /// Create a new empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every append fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Every entry, newest first.
    pub fn all(&self) -> Vec<AuditEntry> {
        self.collect(|_| true)
    }

    fn collect(&self, keep: impl Fn(&AuditEntry) -> bool) -> Vec<AuditEntry> {
        // Reverse insertion order first so equal timestamps list the latest append first.
        let mut out: Vec<AuditEntry> = self
            .entries
            .read()
            .iter()
            .rev()
            .filter(|e| keep(e))
            .cloned()
            .collect();
        sort_newest_first(&mut out);
        out
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    type Error = InMemoryError;

    async fn append(&self, entry: &AuditEntry) -> Result<(), Self::Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(InMemoryError::Unavailable);
        }
        self.entries.write().push(entry.clone());
        Ok(())
    }

    async fn by_entity(&self, entity_type: EntityType, entity_id: Uuid) -> Result<Vec<AuditEntry>, Self::Error> {
        Ok(self.collect(|e| e.entity_type == entity_type && e.entity_id == entity_id))
    }

    async fn by_entities(&self, entity_type: EntityType, entity_ids: &[Uuid]) -> Result<Vec<AuditEntry>, Self::Error> {
        let ids: HashSet<Uuid> = entity_ids.iter().copied().collect();
        Ok(self.collect(|e| e.entity_type == entity_type && ids.contains(&e.entity_id)))
    }

    async fn by_user(&self, user: UserId, limit: Option<usize>) -> Result<Vec<AuditEntry>, Self::Error> {
        let mut out = self.collect(|e| e.user_id == user);
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn query(
        &self,
        filter: &AuditQuery,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<AuditEntry>, u64), Self::Error> {
        let all = self.collect(|e| filter.matches(e));
        let total = all.len() as u64;
        Ok((all.into_iter().skip(offset).take(limit).collect(), total))
    }
}
