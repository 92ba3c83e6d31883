//! Map versions and their snapshot payload.
//!
//! The payload layout is persisted and must stay readable by every later
//! release: restore only ever sees the JSON written at capture time. Ids in a
//! snapshot are internal cross-references; they are never reused as live ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{AreaId, DetailId, EdgeId, NodeId, UserId, VersionId};
use super::node::{Handler, Measured, NodeType, Position, VisualState};

/// Layout version written into every captured snapshot. Restore accepts
/// payloads with the same major version, and legacy payloads without one.
pub const SNAPSHOT_SCHEMA_VERSION: &str = "1.0.0";

/// Self-contained copy of an area's graph.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Payload layout version; absent in legacy payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    /// Nodes with nested detail.
    #[serde(default)]
    pub nodes: Vec<SnapshotNode>,
    /// Edges whose both endpoints were inside the area.
    #[serde(default)]
    pub edges: Vec<SnapshotEdge>,
    /// Flat list of table rows keyed by owning detail id.
    #[serde(default, alias = "tableData")]
    pub table_rows: Vec<SnapshotTableRow>,
}

impl Snapshot {
    /// Whether this crate can restore the payload's layout.
    pub fn is_supported_schema(&self) -> bool {
        let major = |v: &str| v.split('.').next().map(str::to_owned);
        match &self.schema_version {
            None => true,
            Some(v) => major(v) == major(SNAPSHOT_SCHEMA_VERSION),
        }
    }
}

/// Node entry of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotNode {
    /// Node id at capture time.
    pub id: NodeId,
    /// Node kind.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Canvas position.
    pub position: Position,
    /// Measured size.
    #[serde(default)]
    pub measured: Option<Measured>,
    /// Parent node id at capture time.
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    /// Detail record; nodes without one are skipped on restore.
    #[serde(default, alias = "data")]
    pub detail: Option<SnapshotDetail>,
}

/// Detail entry nested in a snapshot node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDetail {
    /// Detail id at capture time; rows refer to it.
    #[serde(default)]
    pub id: Option<DetailId>,
    /// Display label.
    #[serde(default)]
    pub label: String,
    /// Connector descriptors.
    #[serde(default)]
    pub handlers: Vec<Handler>,
    /// Lock flag; absent means unlocked.
    #[serde(default)]
    pub locked: Option<bool>,
    /// Visual overrides.
    #[serde(default)]
    pub visual_state: Option<VisualState>,
}

/// Edge entry of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEdge {
    /// Edge id at capture time.
    pub id: EdgeId,
    /// Source node id at capture time.
    pub source: NodeId,
    /// Target node id at capture time.
    pub target: NodeId,
    /// Source connector.
    #[serde(default)]
    pub source_handle: Option<String>,
    /// Target connector.
    #[serde(default)]
    pub target_handle: Option<String>,
    /// Render style tag.
    #[serde(rename = "type", default)]
    pub edge_type: Option<String>,
    /// Visual attributes.
    #[serde(default)]
    pub style: Option<Value>,
}

/// Table row entry of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotTableRow {
    /// Owning detail id at capture time.
    #[serde(alias = "nodeDataId")]
    pub detail_id: DetailId,
    /// Protection name.
    #[serde(default)]
    pub protection_name: String,
    /// Regulation excerpt.
    #[serde(default)]
    pub excerpt: String,
    /// Source document.
    #[serde(default)]
    pub source: String,
    /// Triggering algorithm.
    #[serde(default)]
    pub triggering_algorithm: String,
    /// Triggering conditions.
    #[serde(default)]
    pub triggering_conditions: String,
    /// Display order.
    #[serde(default)]
    pub order: i32,
}

/// A stored, immutable version of an area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapVersion {
    /// Version id.
    pub id: VersionId,
    /// Area the snapshot was taken from (and restores into).
    pub area_id: AreaId,
    /// Version name.
    pub name: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// Capture time.
    pub created_at: DateTime<Utc>,
    /// User who captured it.
    pub created_by: UserId,
    /// Payload.
    pub snapshot: Snapshot,
}

impl MapVersion {
    /// Summary without the payload.
    pub fn summary(&self) -> VersionSummary {
        VersionSummary {
            id: self.id,
            area_id: self.area_id,
            name: self.name.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
            created_by: self.created_by,
            node_count: self.snapshot.nodes.len(),
        }
    }

    /// Summary plus payload.
    pub fn into_detail(self) -> VersionDetail {
        let summary = self.summary();
        VersionDetail {
            summary,
            snapshot: self.snapshot,
        }
    }
}

/// Version listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    /// Version id.
    pub id: VersionId,
    /// Area id.
    pub area_id: AreaId,
    /// Version name.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Capture time.
    pub created_at: DateTime<Utc>,
    /// Capturing user.
    pub created_by: UserId,
    /// Number of nodes in the payload.
    pub node_count: usize,
}

/// Version summary with its full payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDetail {
    /// Summary fields.
    #[serde(flatten)]
    pub summary: VersionSummary,
    /// Payload.
    pub snapshot: Snapshot,
}
