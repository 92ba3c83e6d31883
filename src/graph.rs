//! Ordinary mutation paths of the area graph.
//!
//! Every successful write is followed by its audit entry: creations and
//! deletions are recorded directly, updates go through the classifier, and
//! position-only node updates through the move coalescer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::audit::{classify, route, AttributeDiff, AuditLog, ChangeRoute, Classification, MoveCoalescer};
use crate::error::{KernelError, KernelResult};
use crate::store::{AuditStore, GraphStore, GraphTransaction};
use crate::types::{
    default_edge_style, node_attributes, ActionType, Area, AreaId, Attributes, ChangeSet, CountryId,
    DetailId, Edge, EdgeId, EntityType, Handler, Measured, NewAuditEntry, Node, NodeDetail, NodeId,
    NodeRecord, NodeType, Position, RowId, TableRow, ToAttributes, UserId, VisualState,
    DEFAULT_EDGE_TYPE,
};

/// Input for [`GraphService::create_node`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewNode {
    /// Node kind.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Canvas position.
    pub position: Position,
    /// Measured size.
    pub measured: Option<Measured>,
    /// Parent node; must exist.
    pub parent_id: Option<NodeId>,
    /// Owning area; must exist.
    pub area_id: Option<AreaId>,
    /// Display label.
    pub label: String,
    /// Connectors.
    pub handlers: Vec<Handler>,
    /// Lock flag.
    pub locked: bool,
    /// Visual overrides.
    pub visual_state: Option<VisualState>,
}

/// Partial update of a node and its detail. `None` leaves a field as is;
/// for nullable fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeUpdate {
    /// New kind.
    pub node_type: Option<NodeType>,
    /// New position.
    pub position: Option<Position>,
    /// New measured size.
    pub measured: Option<Option<Measured>>,
    /// New parent; must exist and differ from the node.
    pub parent_id: Option<Option<NodeId>>,
    /// New area; must exist.
    pub area_id: Option<Option<AreaId>>,
    /// New label.
    pub label: Option<String>,
    /// New connector list.
    pub handlers: Option<Vec<Handler>>,
    /// New lock flag.
    pub locked: Option<bool>,
    /// New visual overrides.
    pub visual_state: Option<Option<VisualState>>,
}

impl NodeUpdate {
    /// Update moving the node only.
    pub fn position(x: f64, y: f64) -> Self {
        Self {
            position: Some(Position::new(x, y)),
            ..Self::default()
        }
    }

    fn apply(&self, node: &mut Node, detail: &mut NodeDetail) {
        if let Some(t) = self.node_type {
            node.node_type = t;
        }
        if let Some(p) = self.position {
            node.position = p;
        }
        if let Some(m) = self.measured {
            node.measured = m;
        }
        if let Some(p) = self.parent_id {
            node.parent_id = p;
        }
        if let Some(a) = self.area_id {
            node.area_id = a;
        }
        if let Some(label) = &self.label {
            detail.label = label.clone();
        }
        if let Some(handlers) = &self.handlers {
            detail.handlers = handlers.clone();
        }
        if let Some(locked) = self.locked {
            detail.locked = locked;
        }
        if let Some(visual) = &self.visual_state {
            detail.visual_state = visual.clone();
        }
    }
}

/// Input for [`GraphService::create_edge`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEdge {
    /// Source node; must exist.
    pub source: NodeId,
    /// Target node; must exist.
    pub target: NodeId,
    /// Source connector.
    #[serde(default)]
    pub source_handle: Option<String>,
    /// Target connector.
    #[serde(default)]
    pub target_handle: Option<String>,
    /// Render style tag, `"straight"` when absent.
    #[serde(rename = "type", default)]
    pub edge_type: Option<String>,
    /// Visual attributes, the default stroke when absent.
    #[serde(default)]
    pub style: Option<Value>,
}

impl NewEdge {
    /// Edge between two nodes with default type and style.
    pub fn between(source: NodeId, target: NodeId) -> Self {
        Self {
            source,
            target,
            source_handle: None,
            target_handle: None,
            edge_type: None,
            style: None,
        }
    }
}

/// Partial update of an edge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeUpdate {
    /// New source node; must exist.
    pub source: Option<NodeId>,
    /// New target node; must exist.
    pub target: Option<NodeId>,
    /// New source connector.
    pub source_handle: Option<Option<String>>,
    /// New target connector.
    pub target_handle: Option<Option<String>>,
    /// New render style tag.
    pub edge_type: Option<String>,
    /// New visual attributes.
    pub style: Option<Value>,
}

/// Input for [`GraphService::create_table_row`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewTableRow {
    /// Protection name.
    pub protection_name: String,
    /// Regulation excerpt.
    pub excerpt: String,
    /// Source document.
    pub source: String,
    /// Triggering algorithm.
    pub triggering_algorithm: String,
    /// Triggering conditions.
    pub triggering_conditions: String,
    /// Display order; appended after the last row when absent.
    pub order: Option<i32>,
}

/// Partial update of a table row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRowUpdate {
    /// New protection name.
    pub protection_name: Option<String>,
    /// New excerpt.
    pub excerpt: Option<String>,
    /// New source document.
    pub source: Option<String>,
    /// New triggering algorithm.
    pub triggering_algorithm: Option<String>,
    /// New triggering conditions.
    pub triggering_conditions: Option<String>,
    /// New display order.
    pub order: Option<i32>,
}

/// Audited mutations of areas, nodes, edges and table rows.
pub struct GraphService<G, A> {
    graph: Arc<G>,
    log: AuditLog<A>,
    coalescer: MoveCoalescer<A>,
}

impl<G, A> Clone for GraphService<G, A> {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            log: self.log.clone(),
            coalescer: self.coalescer.clone(),
        }
    }
}

impl<G: GraphStore, A: AuditStore + 'static> GraphService<G, A> {
    /// Create a graph service.
    pub fn new(graph: Arc<G>, log: AuditLog<A>, coalescer: MoveCoalescer<A>) -> Self {
        Self { graph, log, coalescer }
    }

    async fn begin(&self) -> KernelResult<G::Transaction> {
        self.graph.begin().await.map_err(KernelError::from_store)
    }

    async fn write(
        &self,
        actor: UserId,
        entity_type: EntityType,
        entity_id: Uuid,
        action_type: ActionType,
        changes: ChangeSet,
        description: String,
    ) {
        self.log
            .record(NewAuditEntry {
                user_id: actor,
                entity_type,
                entity_id,
                action_type,
                changes,
                description: Some(description),
            })
            .await;
    }

    async fn write_classified(&self, actor: UserId, entity_type: EntityType, entity_id: Uuid, c: Classification) {
        self.write(actor, entity_type, entity_id, c.action, c.changes, c.description)
            .await;
    }

    /// Write an update's classification. Position-only diffs of edges and
    /// rows are classified directly; only nodes coalesce.
    async fn record_update(
        &self,
        actor: UserId,
        entity_type: EntityType,
        entity_id: Uuid,
        before: &Attributes,
        after: &Attributes,
    ) {
        match route(entity_type, before, after) {
            ChangeRoute::Unchanged => {
                tracing::trace!(%entity_type, %entity_id, "Update changed nothing");
            }
            ChangeRoute::Move(diff) => {
                if let Some(c) = classify(entity_type, diff) {
                    self.write_classified(actor, entity_type, entity_id, c).await;
                }
            }
            ChangeRoute::Classified(c) => {
                self.write_classified(actor, entity_type, entity_id, c).await;
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Areas
    // ─────────────────────────────────────────────────────────────────────

    /// Fetch an area.
    pub async fn get_area(&self, id: AreaId) -> KernelResult<Area> {
        self.graph
            .get_area(id)
            .await
            .map_err(KernelError::from_store)?
            .ok_or_else(|| KernelError::not_found("Area", id))
    }

    /// Create an area. Recorded under the NODE entity kind with the area id.
    pub async fn create_area(&self, name: &str, country_id: CountryId, actor: UserId) -> KernelResult<Area> {
        let name = name.trim();
        if name.is_empty() {
            return Err(KernelError::invalid("area name must not be blank"));
        }
        let area = Area::new(name, country_id);

        let mut tx = self.begin().await?;
        tx.insert_area(&area).await.map_err(KernelError::from_store)?;
        tx.commit().await.map_err(KernelError::from_store)?;

        self.write(
            actor,
            EntityType::Node,
            area.id.as_uuid(),
            ActionType::Create,
            ChangeSet::created(area.to_attributes()),
            format!("Area \"{}\" created", area.name),
        )
        .await;
        Ok(area)
    }

    /// Rename an area or move it to another country.
    pub async fn update_area(
        &self,
        id: AreaId,
        name: Option<&str>,
        country_id: Option<CountryId>,
        actor: UserId,
    ) -> KernelResult<Area> {
        let mut tx = self.begin().await?;
        let before = tx
            .get_area(id)
            .await
            .map_err(KernelError::from_store)?
            .ok_or_else(|| KernelError::not_found("Area", id))?;

        let mut area = before.clone();
        if let Some(name) = name {
            let name = name.trim();
            if name.is_empty() {
                return Err(KernelError::invalid("area name must not be blank"));
            }
            area.name = name.to_string();
        }
        if let Some(country) = country_id {
            area.country_id = country;
        }

        tx.update_area(&area).await.map_err(KernelError::from_store)?;
        tx.commit().await.map_err(KernelError::from_store)?;

        let diff = AttributeDiff::compute(&before.to_attributes(), &area.to_attributes());
        if !diff.is_empty() {
            self.write(
                actor,
                EntityType::Node,
                id.as_uuid(),
                ActionType::Update,
                diff.into_changes(),
                format!("Area \"{}\" updated", area.name),
            )
            .await;
        }
        Ok(area)
    }

    /// Delete an area and its versions. Its nodes are kept, detached from
    /// any area.
    pub async fn delete_area(&self, id: AreaId, actor: UserId) -> KernelResult<()> {
        let mut tx = self.begin().await?;
        let area = tx
            .get_area(id)
            .await
            .map_err(KernelError::from_store)?
            .ok_or_else(|| KernelError::not_found("Area", id))?;
        tx.delete_area(id).await.map_err(KernelError::from_store)?;
        tx.commit().await.map_err(KernelError::from_store)?;

        self.write(
            actor,
            EntityType::Node,
            id.as_uuid(),
            ActionType::Delete,
            ChangeSet::deleted(area.to_attributes()),
            format!("Area \"{}\" deleted (nodes detached)", area.name),
        )
        .await;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Nodes
    // ─────────────────────────────────────────────────────────────────────

    /// Fetch a node with its detail and rows.
    pub async fn get_node(&self, id: NodeId) -> KernelResult<NodeRecord> {
        self.graph
            .get_node(id)
            .await
            .map_err(KernelError::from_store)?
            .ok_or_else(|| KernelError::not_found("Node", id))
    }

    /// Every node of an area.
    pub async fn nodes_in_area(&self, area: AreaId) -> KernelResult<Vec<NodeRecord>> {
        self.graph.nodes_in_area(area).await.map_err(KernelError::from_store)
    }

    /// Create a node with its detail.
    pub async fn create_node(&self, input: NewNode, actor: UserId) -> KernelResult<NodeRecord> {
        let mut tx = self.begin().await?;

        if let Some(parent) = input.parent_id {
            if tx.get_node(parent).await.map_err(KernelError::from_store)?.is_none() {
                return Err(KernelError::not_found("Node", parent));
            }
        }
        if let Some(area) = input.area_id {
            if tx.get_area(area).await.map_err(KernelError::from_store)?.is_none() {
                return Err(KernelError::not_found("Area", area));
            }
        }

        let node = Node {
            id: NodeId::generate(),
            node_type: input.node_type,
            position: input.position,
            measured: input.measured,
            parent_id: input.parent_id,
            area_id: input.area_id,
        };
        let detail = NodeDetail {
            id: DetailId::generate(),
            node_id: node.id,
            label: input.label,
            handlers: input.handlers,
            locked: input.locked,
            visual_state: input.visual_state,
        };
        tx.insert_node(&node, &detail).await.map_err(KernelError::from_store)?;
        tx.commit().await.map_err(KernelError::from_store)?;

        self.write(
            actor,
            EntityType::Node,
            node.id.as_uuid(),
            ActionType::Create,
            ChangeSet::created(node_attributes(&node, Some(&detail))),
            format!("Node \"{}\" created", detail.label),
        )
        .await;

        Ok(NodeRecord {
            node,
            detail: Some(detail),
            rows: Vec::new(),
        })
    }

    /// Apply a partial update to a node and audit it.
    ///
    /// A pure position change is buffered in the move coalescer; anything
    /// else is classified and written immediately.
    pub async fn update_node(&self, id: NodeId, update: NodeUpdate, actor: UserId) -> KernelResult<NodeRecord> {
        let mut tx = self.begin().await?;
        let record = tx
            .get_node(id)
            .await
            .map_err(KernelError::from_store)?
            .ok_or_else(|| KernelError::not_found("Node", id))?;

        if let Some(Some(parent)) = update.parent_id {
            if parent == id {
                return Err(KernelError::invalid("a node cannot be its own parent"));
            }
            if tx.get_node(parent).await.map_err(KernelError::from_store)?.is_none() {
                return Err(KernelError::not_found("Node", parent));
            }
        }
        if let Some(Some(area)) = update.area_id {
            if tx.get_area(area).await.map_err(KernelError::from_store)?.is_none() {
                return Err(KernelError::not_found("Area", area));
            }
        }

        let mut node = record.node;
        // Legacy nodes may lack a detail; the first update creates one. The
        // diff starts from that blank detail so only the update shows.
        let mut detail = record.detail.unwrap_or_else(|| NodeDetail {
            id: DetailId::generate(),
            node_id: id,
            label: String::new(),
            handlers: Vec::new(),
            locked: false,
            visual_state: None,
        });
        let before = node_attributes(&node, Some(&detail));
        update.apply(&mut node, &mut detail);
        let after = node_attributes(&node, Some(&detail));

        tx.update_node(&node, &detail).await.map_err(KernelError::from_store)?;
        let ticket = self.coalescer.ticket();
        tx.commit().await.map_err(KernelError::from_store)?;

        match route(EntityType::Node, &before, &after) {
            ChangeRoute::Move(diff) => self.coalescer.arm(id, diff, actor, ticket),
            ChangeRoute::Unchanged => {
                tracing::trace!(node_id = %id, "Update changed nothing");
            }
            ChangeRoute::Classified(c) => {
                self.write_classified(actor, EntityType::Node, id.as_uuid(), c).await;
            }
        }

        Ok(NodeRecord {
            node,
            detail: Some(detail),
            rows: record.rows,
        })
    }

    /// Delete a node with its detail, rows and incident edges. Any pending
    /// move of the node is discarded.
    pub async fn delete_node(&self, id: NodeId, actor: UserId) -> KernelResult<()> {
        let mut tx = self.begin().await?;
        let record = tx
            .get_node(id)
            .await
            .map_err(KernelError::from_store)?
            .ok_or_else(|| KernelError::not_found("Node", id))?;
        tx.delete_node(id).await.map_err(KernelError::from_store)?;

        let withdrawn = self.coalescer.withdraw(&[id]);
        if let Err(e) = tx.commit().await {
            self.coalescer.reinstate(withdrawn);
            return Err(KernelError::from_store(e));
        }

        let label = record.detail.as_ref().map(|d| d.label.clone()).unwrap_or_default();
        self.write(
            actor,
            EntityType::Node,
            id.as_uuid(),
            ActionType::Delete,
            ChangeSet::deleted(record.to_attributes()),
            format!("Node \"{label}\" deleted"),
        )
        .await;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Edges
    // ─────────────────────────────────────────────────────────────────────

    /// Connect two existing nodes.
    pub async fn create_edge(&self, input: NewEdge, actor: UserId) -> KernelResult<Edge> {
        let mut tx = self.begin().await?;
        for endpoint in [input.source, input.target] {
            if tx.get_node(endpoint).await.map_err(KernelError::from_store)?.is_none() {
                return Err(KernelError::not_found("Node", endpoint));
            }
        }

        let edge = Edge {
            id: EdgeId::generate(),
            source: input.source,
            target: input.target,
            source_handle: input.source_handle,
            target_handle: input.target_handle,
            edge_type: input.edge_type.unwrap_or_else(|| DEFAULT_EDGE_TYPE.to_string()),
            style: input.style.unwrap_or_else(default_edge_style),
        };
        tx.insert_edge(&edge).await.map_err(KernelError::from_store)?;
        tx.commit().await.map_err(KernelError::from_store)?;

        self.write(
            actor,
            EntityType::Edge,
            edge.id.as_uuid(),
            ActionType::Create,
            ChangeSet::created(edge.to_attributes()),
            "Edge created".to_string(),
        )
        .await;
        Ok(edge)
    }

    /// Apply a partial update to an edge and audit it.
    pub async fn update_edge(&self, id: EdgeId, update: EdgeUpdate, actor: UserId) -> KernelResult<Edge> {
        let mut tx = self.begin().await?;
        let before = tx
            .get_edge(id)
            .await
            .map_err(KernelError::from_store)?
            .ok_or_else(|| KernelError::not_found("Edge", id))?;

        let mut edge = before.clone();
        if let Some(source) = update.source {
            edge.source = source;
        }
        if let Some(target) = update.target {
            edge.target = target;
        }
        for endpoint in [update.source, update.target].into_iter().flatten() {
            if tx.get_node(endpoint).await.map_err(KernelError::from_store)?.is_none() {
                return Err(KernelError::not_found("Node", endpoint));
            }
        }
        if let Some(handle) = update.source_handle {
            edge.source_handle = handle;
        }
        if let Some(handle) = update.target_handle {
            edge.target_handle = handle;
        }
        if let Some(edge_type) = update.edge_type {
            edge.edge_type = edge_type;
        }
        if let Some(style) = update.style {
            edge.style = style;
        }

        tx.update_edge(&edge).await.map_err(KernelError::from_store)?;
        tx.commit().await.map_err(KernelError::from_store)?;

        self.record_update(
            actor,
            EntityType::Edge,
            id.as_uuid(),
            &before.to_attributes(),
            &edge.to_attributes(),
        )
        .await;
        Ok(edge)
    }

    /// Delete an edge.
    pub async fn delete_edge(&self, id: EdgeId, actor: UserId) -> KernelResult<()> {
        let mut tx = self.begin().await?;
        let edge = tx
            .get_edge(id)
            .await
            .map_err(KernelError::from_store)?
            .ok_or_else(|| KernelError::not_found("Edge", id))?;
        tx.delete_edge(id).await.map_err(KernelError::from_store)?;
        tx.commit().await.map_err(KernelError::from_store)?;

        self.write(
            actor,
            EntityType::Edge,
            id.as_uuid(),
            ActionType::Delete,
            ChangeSet::deleted(edge.to_attributes()),
            "Edge deleted".to_string(),
        )
        .await;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Table rows
    // ─────────────────────────────────────────────────────────────────────

    /// Rows of a node's detail in display order.
    pub async fn table_rows(&self, node: NodeId) -> KernelResult<Vec<TableRow>> {
        Ok(self.get_node(node).await?.rows)
    }

    /// Add a row to a node's table.
    pub async fn create_table_row(&self, node: NodeId, input: NewTableRow, actor: UserId) -> KernelResult<TableRow> {
        let mut tx = self.begin().await?;
        let record = tx
            .get_node(node)
            .await
            .map_err(KernelError::from_store)?
            .ok_or_else(|| KernelError::not_found("Node", node))?;
        let detail = record
            .detail
            .ok_or_else(|| KernelError::invalid(format!("node {node} has no detail")))?;

        let order = input
            .order
            .unwrap_or_else(|| record.rows.iter().map(|r| r.order).max().map_or(0, |max| max + 1));
        let row = TableRow {
            id: RowId::generate(),
            detail_id: detail.id,
            protection_name: input.protection_name,
            excerpt: input.excerpt,
            source: input.source,
            triggering_algorithm: input.triggering_algorithm,
            triggering_conditions: input.triggering_conditions,
            order,
        };
        tx.insert_table_row(&row).await.map_err(KernelError::from_store)?;
        tx.commit().await.map_err(KernelError::from_store)?;

        self.write(
            actor,
            EntityType::TableRow,
            row.id.as_uuid(),
            ActionType::Create,
            ChangeSet::created(row.to_attributes()),
            format!("Table row \"{}\" created", row.protection_name),
        )
        .await;
        Ok(row)
    }

    /// Apply a partial update to a table row and audit it.
    pub async fn update_table_row(&self, id: RowId, update: TableRowUpdate, actor: UserId) -> KernelResult<TableRow> {
        let mut tx = self.begin().await?;
        let before = tx
            .get_table_row(id)
            .await
            .map_err(KernelError::from_store)?
            .ok_or_else(|| KernelError::not_found("TableRow", id))?;

        let mut row = before.clone();
        if let Some(v) = update.protection_name {
            row.protection_name = v;
        }
        if let Some(v) = update.excerpt {
            row.excerpt = v;
        }
        if let Some(v) = update.source {
            row.source = v;
        }
        if let Some(v) = update.triggering_algorithm {
            row.triggering_algorithm = v;
        }
        if let Some(v) = update.triggering_conditions {
            row.triggering_conditions = v;
        }
        if let Some(v) = update.order {
            row.order = v;
        }

        tx.update_table_row(&row).await.map_err(KernelError::from_store)?;
        tx.commit().await.map_err(KernelError::from_store)?;

        self.record_update(
            actor,
            EntityType::TableRow,
            id.as_uuid(),
            &before.to_attributes(),
            &row.to_attributes(),
        )
        .await;
        Ok(row)
    }

    /// Delete a table row.
    pub async fn delete_table_row(&self, id: RowId, actor: UserId) -> KernelResult<()> {
        let mut tx = self.begin().await?;
        let row = tx
            .get_table_row(id)
            .await
            .map_err(KernelError::from_store)?
            .ok_or_else(|| KernelError::not_found("TableRow", id))?;
        tx.delete_table_row(id).await.map_err(KernelError::from_store)?;
        tx.commit().await.map_err(KernelError::from_store)?;

        self.write(
            actor,
            EntityType::TableRow,
            id.as_uuid(),
            ActionType::Delete,
            ChangeSet::deleted(row.to_attributes()),
            format!("Table row \"{}\" deleted", row.protection_name),
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_update_applies_only_set_fields() {
        let mut node = Node {
            id: NodeId::generate(),
            node_type: NodeType::Ops,
            position: Position::new(1.0, 1.0),
            measured: Some(Measured { width: 10.0, height: 5.0 }),
            parent_id: None,
            area_id: None,
        };
        let mut detail = NodeDetail {
            id: DetailId::generate(),
            node_id: node.id,
            label: "Old".into(),
            handlers: vec![],
            locked: false,
            visual_state: None,
        };

        let update = NodeUpdate {
            label: Some("New".into()),
            measured: Some(None),
            ..NodeUpdate::default()
        };
        update.apply(&mut node, &mut detail);

        assert_eq!(detail.label, "New");
        assert_eq!(node.measured, None);
        assert_eq!(node.position, Position::new(1.0, 1.0));
        assert!(!detail.locked);
    }

    #[test]
    fn test_new_node_deserializes_with_defaults() {
        let input: NewNode = serde_json::from_str(r#"{"label": "Gate", "type": "GROUP"}"#).unwrap();
        assert_eq!(input.node_type, NodeType::Group);
        assert_eq!(input.position, Position::default());
        assert!(!input.locked);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Service
    // ─────────────────────────────────────────────────────────────────────

    use crate::store::{InMemoryAuditStore, InMemoryGraphStore};
    use std::time::Duration;

    fn service() -> (GraphService<InMemoryGraphStore, InMemoryAuditStore>, Arc<InMemoryAuditStore>) {
        let audit = Arc::new(InMemoryAuditStore::new());
        let log = AuditLog::new(Arc::clone(&audit));
        let coalescer = MoveCoalescer::new(log.clone(), Duration::from_millis(1000));
        (GraphService::new(Arc::new(InMemoryGraphStore::new()), log, coalescer), audit)
    }

    fn labelled(label: &str) -> NewNode {
        NewNode {
            label: label.into(),
            ..NewNode::default()
        }
    }

    #[tokio::test]
    async fn test_create_node_checks_references() {
        let (svc, audit) = service();
        let user = UserId::generate();

        let mut orphan = labelled("Orphan");
        orphan.parent_id = Some(NodeId::generate());
        assert!(svc.create_node(orphan, user).await.unwrap_err().is_not_found());

        let mut stray = labelled("Stray");
        stray.area_id = Some(AreaId::generate());
        assert!(svc.create_node(stray, user).await.unwrap_err().is_not_found());

        assert!(audit.is_empty());
    }

    #[tokio::test]
    async fn test_update_node_rejects_self_parent() {
        let (svc, _) = service();
        let user = UserId::generate();
        let id = svc.create_node(labelled("Loop"), user).await.unwrap().node.id;

        let update = NodeUpdate {
            parent_id: Some(Some(id)),
            ..NodeUpdate::default()
        };
        assert!(svc.update_node(id, update, user).await.unwrap_err().is_invalid_argument());
        assert!(svc.update_node(NodeId::generate(), NodeUpdate::default(), user).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_table_row_order_defaults_to_append() {
        let (svc, _) = service();
        let user = UserId::generate();
        let node = svc.create_node(labelled("Tank"), user).await.unwrap().node.id;

        let first = svc.create_table_row(node, NewTableRow::default(), user).await.unwrap();
        assert_eq!(first.order, 0);
        let pinned = NewTableRow {
            order: Some(5),
            ..NewTableRow::default()
        };
        svc.create_table_row(node, pinned, user).await.unwrap();
        let appended = svc.create_table_row(node, NewTableRow::default(), user).await.unwrap();
        assert_eq!(appended.order, 6);

        let orders: Vec<i32> = svc.table_rows(node).await.unwrap().iter().map(|r| r.order).collect();
        assert_eq!(orders, vec![0, 5, 6]);

        svc.delete_table_row(first.id, user).await.unwrap();
        assert_eq!(svc.table_rows(node).await.unwrap().len(), 2);
        assert!(svc.delete_table_row(first.id, user).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_edge_lifecycle_is_audited() {
        let (svc, audit) = service();
        let user = UserId::generate();
        let a = svc.create_node(labelled("A"), user).await.unwrap().node.id;
        let b = svc.create_node(labelled("B"), user).await.unwrap().node.id;

        let dangling = NewEdge::between(a, NodeId::generate());
        assert!(svc.create_edge(dangling, user).await.unwrap_err().is_not_found());

        let edge = svc.create_edge(NewEdge::between(a, b), user).await.unwrap();
        assert_eq!(edge.edge_type, DEFAULT_EDGE_TYPE);
        assert_eq!(edge.style, default_edge_style());

        let update = EdgeUpdate {
            target_handle: Some(Some("left".into())),
            ..EdgeUpdate::default()
        };
        svc.update_edge(edge.id, update, user).await.unwrap();
        svc.delete_edge(edge.id, user).await.unwrap();
        assert!(svc.delete_edge(edge.id, user).await.unwrap_err().is_not_found());

        let actions: Vec<ActionType> = audit
            .all()
            .into_iter()
            .filter(|e| e.entity_type == EntityType::Edge)
            .map(|e| e.action_type)
            .collect();
        assert_eq!(actions, vec![ActionType::Delete, ActionType::Update, ActionType::Create]);
    }

    #[tokio::test]
    async fn test_area_updates_and_detach_on_delete() {
        let (svc, audit) = service();
        let user = UserId::generate();

        assert!(svc.create_area("  ", CountryId::generate(), user).await.unwrap_err().is_invalid_argument());
        let area = svc.create_area(" Delta ", CountryId::generate(), user).await.unwrap();
        assert_eq!(area.name, "Delta");

        let mut input = labelled("Dock");
        input.area_id = Some(area.id);
        let node = svc.create_node(input, user).await.unwrap().node.id;

        // Same name: nothing to record.
        svc.update_area(area.id, Some("Delta"), None, user).await.unwrap();
        let renamed = svc.update_area(area.id, Some("Delta 2"), None, user).await.unwrap();
        assert_eq!(renamed.name, "Delta 2");

        svc.delete_area(area.id, user).await.unwrap();
        assert!(svc.get_area(area.id).await.unwrap_err().is_not_found());
        assert_eq!(svc.get_node(node).await.unwrap().node.area_id, None);

        let area_actions: Vec<ActionType> = audit
            .all()
            .into_iter()
            .filter(|e| e.entity_id == area.id.as_uuid())
            .map(|e| e.action_type)
            .collect();
        assert_eq!(area_actions, vec![ActionType::Delete, ActionType::Update, ActionType::Create]);
    }

    type LegacySetup = (
        GraphService<InMemoryGraphStore, InMemoryAuditStore>,
        Arc<InMemoryAuditStore>,
        MoveCoalescer<InMemoryAuditStore>,
        NodeId,
    );

    /// Service over a store holding one node that has no detail.
    async fn legacy_setup() -> LegacySetup {
        let audit = Arc::new(InMemoryAuditStore::new());
        let log = AuditLog::new(Arc::clone(&audit));
        let coalescer = MoveCoalescer::new(log.clone(), Duration::from_millis(1000));
        let store = Arc::new(InMemoryGraphStore::new());
        let node = Node {
            id: NodeId::generate(),
            node_type: NodeType::Ops,
            position: Position::new(0.0, 0.0),
            measured: None,
            parent_id: None,
            area_id: None,
        };
        store.insert_detached_node(node.clone()).await;
        let svc = GraphService::new(store, log, coalescer.clone());
        (svc, audit, coalescer, node.id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_legacy_node_drag_is_coalesced_as_move() {
        let (svc, audit, coalescer, id) = legacy_setup().await;
        let user = UserId::generate();

        let record = svc.update_node(id, NodeUpdate::position(9.0, 4.0), user).await.unwrap();
        assert!(record.detail.is_some());
        assert!(coalescer.is_pending(id));
        assert!(audit.is_empty());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let entries = audit.all();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action_type, ActionType::Move);
        assert_eq!(entries[0].changes.after, Some(serde_json::json!({"position": {"x": 9.0, "y": 4.0}})));
    }

    #[tokio::test]
    async fn test_legacy_node_default_flags_are_not_changes() {
        let (svc, audit, coalescer, id) = legacy_setup().await;
        let user = UserId::generate();

        // Unlocking and blanking a node that never had a detail changes nothing.
        let update = NodeUpdate {
            locked: Some(false),
            label: Some(String::new()),
            ..NodeUpdate::default()
        };
        svc.update_node(id, update, user).await.unwrap();
        assert!(audit.is_empty());
        assert!(!coalescer.is_pending(id));

        let update = NodeUpdate {
            locked: Some(true),
            ..NodeUpdate::default()
        };
        svc.update_node(id, update, user).await.unwrap();
        let entries = audit.all();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action_type, ActionType::Lock);
    }
}
