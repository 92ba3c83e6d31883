//! Core types for the area graph.

pub mod ids;
pub mod node;
pub mod edge;
pub mod area;
pub mod attributes;
pub mod audit;
pub mod version;

pub use ids::{AreaId, AuditId, CountryId, DetailId, EdgeId, NodeId, RowId, UserId, VersionId};
pub use node::{
    Handler, Measured, Node, NodeDetail, NodeRecord, NodeType, Position, TableRow,
    VisualState, VisualStatus,
};
pub use edge::{default_edge_style, Edge, DEFAULT_EDGE_TYPE};
pub use area::Area;
pub use attributes::{field, node_attributes, Attributes, ToAttributes};
pub use audit::{
    sort_newest_first, ActionType, AuditEntry, AuditQuery, ChangeSet, EntityType,
    HistoryFilter, HistoryPage, NewAuditEntry,
};
pub use version::{
    MapVersion, Snapshot, SnapshotDetail, SnapshotEdge, SnapshotNode, SnapshotTableRow,
    VersionDetail, VersionSummary, SNAPSHOT_SCHEMA_VERSION,
};
