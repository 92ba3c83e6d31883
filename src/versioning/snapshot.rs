//! Capture of an area's live graph into a snapshot payload.

use crate::types::{
    Edge, NodeRecord, Snapshot, SnapshotDetail, SnapshotEdge, SnapshotNode, SnapshotTableRow,
    SNAPSHOT_SCHEMA_VERSION,
};

/// Build a snapshot from an area's node records and the edges between them.
///
/// Ids are copied as-is; they only serve as cross-references inside the
/// payload. Rows keep the order of each record (display order).
pub fn capture(records: &[NodeRecord], edges: &[Edge]) -> Snapshot {
    let mut snapshot = Snapshot {
        schema_version: Some(SNAPSHOT_SCHEMA_VERSION.to_string()),
        ..Snapshot::default()
    };

    for record in records {
        let node = &record.node;
        snapshot.nodes.push(SnapshotNode {
            id: node.id,
            node_type: node.node_type,
            position: node.position,
            measured: node.measured,
            parent_id: node.parent_id,
            detail: record.detail.as_ref().map(|d| SnapshotDetail {
                id: Some(d.id),
                label: d.label.clone(),
                handlers: d.handlers.clone(),
                locked: Some(d.locked),
                visual_state: d.visual_state.clone(),
            }),
        });

        snapshot.table_rows.extend(record.rows.iter().map(|row| SnapshotTableRow {
            detail_id: row.detail_id,
            protection_name: row.protection_name.clone(),
            excerpt: row.excerpt.clone(),
            source: row.source.clone(),
            triggering_algorithm: row.triggering_algorithm.clone(),
            triggering_conditions: row.triggering_conditions.clone(),
            order: row.order,
        }));
    }

    snapshot.edges = edges
        .iter()
        .map(|e| SnapshotEdge {
            id: e.id,
            source: e.source,
            target: e.target,
            source_handle: e.source_handle.clone(),
            target_handle: e.target_handle.clone(),
            edge_type: Some(e.edge_type.clone()),
            style: Some(e.style.clone()),
        })
        .collect();

    snapshot
}
