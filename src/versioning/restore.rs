//! Replacement of an area's live graph with a snapshot.
//!
//! The snapshot is written back in two passes: first every node is created
//! with a fresh id and no parent, building old→new remap tables for nodes and
//! details; then parent links, table rows and edges are recreated through
//! those tables. Anything whose reference cannot be resolved is skipped.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::store::GraphTransaction;
use crate::types::{
    default_edge_style, AreaId, DetailId, Edge, EdgeId, Node, NodeDetail, NodeId, RowId, Snapshot,
    TableRow, VersionId, DEFAULT_EDGE_TYPE,
};

/// Outcome of a restore.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    /// Restored version.
    pub version_id: Option<VersionId>,
    /// Area that was rewritten.
    pub area_id: Option<AreaId>,
    /// Live nodes deleted before the rewrite.
    pub removed_nodes: Vec<NodeId>,
    /// Live edges deleted before the rewrite.
    pub removed_edges: u64,
    /// Nodes created.
    pub nodes_created: usize,
    /// Parent links set in the second pass.
    pub parents_linked: usize,
    /// Table rows created.
    pub rows_created: usize,
    /// Edges created.
    pub edges_created: usize,
    /// Snapshot nodes without a detail.
    pub nodes_skipped: usize,
    /// Rows whose detail did not resolve.
    pub rows_skipped: usize,
    /// Edges with an unresolved endpoint.
    pub edges_skipped: usize,
}

/// Find a cycle in the snapshot's parent links.
///
/// Only nodes that would be restored (those with a detail) are considered.
/// Returns the nodes on the cycle in parent order.
pub fn find_parent_cycle(snapshot: &Snapshot) -> Option<Vec<NodeId>> {
    let parents: HashMap<NodeId, NodeId> = snapshot
        .nodes
        .iter()
        .filter(|n| n.detail.is_some())
        .filter_map(|n| n.parent_id.map(|p| (n.id, p)))
        .collect();

    let mut cleared: HashSet<NodeId> = HashSet::new();
    for start in parents.keys() {
        let mut path: Vec<NodeId> = Vec::new();
        let mut on_path: HashSet<NodeId> = HashSet::new();
        let mut current = *start;

        loop {
            if cleared.contains(&current) {
                break;
            }
            if !on_path.insert(current) {
                let begin = path.iter().position(|n| *n == current).unwrap_or(0);
                return Some(path[begin..].to_vec());
            }
            path.push(current);
            match parents.get(&current) {
                Some(parent) => current = *parent,
                None => break,
            }
        }
        cleared.extend(path);
    }
    None
}

/// Delete the area's live graph and rebuild it from `snapshot` inside `tx`.
///
/// Fills every field of the report except `version_id`.
pub async fn apply_snapshot<T: GraphTransaction>(
    tx: &mut T,
    area: AreaId,
    snapshot: &Snapshot,
) -> Result<RestoreReport, T::Error> {
    let mut report = RestoreReport {
        area_id: Some(area),
        ..RestoreReport::default()
    };

    let live: Vec<NodeId> = tx.nodes_in_area(area).await?.into_iter().map(|r| r.node.id).collect();
    report.removed_edges = tx.delete_edges_touching(&live).await?;
    report.removed_nodes = tx.delete_nodes_in_area(area).await?;

    let mut node_map: HashMap<NodeId, NodeId> = HashMap::new();
    let mut detail_map: HashMap<DetailId, DetailId> = HashMap::new();

    for snap in &snapshot.nodes {
        let Some(detail) = &snap.detail else {
            tracing::warn!(snapshot_node = %snap.id, "Skipping snapshot node without detail");
            report.nodes_skipped += 1;
            continue;
        };

        let node = Node {
            id: NodeId::generate(),
            node_type: snap.node_type,
            position: snap.position,
            measured: snap.measured,
            parent_id: None,
            area_id: Some(area),
        };
        let new_detail = NodeDetail {
            id: DetailId::generate(),
            node_id: node.id,
            label: detail.label.clone(),
            handlers: detail.handlers.clone(),
            locked: detail.locked.unwrap_or(false),
            visual_state: detail.visual_state.clone(),
        };
        tx.insert_node(&node, &new_detail).await?;

        node_map.insert(snap.id, node.id);
        if let Some(old_detail) = detail.id {
            detail_map.insert(old_detail, new_detail.id);
        }
        report.nodes_created += 1;
    }

    for snap in &snapshot.nodes {
        let Some(old_parent) = snap.parent_id else {
            continue;
        };
        if let (Some(child), Some(parent)) = (node_map.get(&snap.id), node_map.get(&old_parent)) {
            tx.set_parent(*child, Some(*parent)).await?;
            report.parents_linked += 1;
        }
    }

    for row in &snapshot.table_rows {
        let Some(detail_id) = detail_map.get(&row.detail_id) else {
            tracing::warn!(snapshot_detail = %row.detail_id, "Skipping table row with unknown detail");
            report.rows_skipped += 1;
            continue;
        };
        tx.insert_table_row(&TableRow {
            id: RowId::generate(),
            detail_id: *detail_id,
            protection_name: row.protection_name.clone(),
            excerpt: row.excerpt.clone(),
            source: row.source.clone(),
            triggering_algorithm: row.triggering_algorithm.clone(),
            triggering_conditions: row.triggering_conditions.clone(),
            order: row.order,
        })
        .await?;
        report.rows_created += 1;
    }

    for snap in &snapshot.edges {
        let (Some(source), Some(target)) = (node_map.get(&snap.source), node_map.get(&snap.target)) else {
            tracing::warn!(snapshot_edge = %snap.id, "Skipping edge with unresolved endpoint");
            report.edges_skipped += 1;
            continue;
        };
        tx.insert_edge(&Edge {
            id: EdgeId::generate(),
            source: *source,
            target: *target,
            source_handle: snap.source_handle.clone(),
            target_handle: snap.target_handle.clone(),
            edge_type: snap
                .edge_type
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_EDGE_TYPE.to_string()),
            style: snap
                .style
                .clone()
                .filter(|s| !s.is_null())
                .unwrap_or_else(default_edge_style),
        })
        .await?;
        report.edges_created += 1;
    }

    Ok(report)
}
