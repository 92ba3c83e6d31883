//! # area-graph-kernel
//!
//! Area-scoped node graph with point-in-time versions and a classified,
//! coalesced audit trail.
//!
//! Nodes form a parent tree, are connected by edges and carry a table of
//! rows under their detail record. Every node belongs to at most one area.
//!
//! ## Core Contract
//!
//! 1. A version captures an area's whole graph in one self-contained payload
//! 2. Restoring a version replaces the area's live graph atomically, with
//!    fresh ids and every internal reference remapped
//! 3. Every mutation leaves exactly one classified audit entry; a burst of
//!    position-only updates leaves one MOVE entry
//!
//! ## Architecture
//!
//! ```text
//! GraphService ──► GraphStore (Postgres or Memory)
//!      │
//!      └─► classifier ──► MoveCoalescer ──► AuditLog ──► AuditStore
//!                  └──────────────────────────┘
//!
//! VersionService ──► snapshot / restore ──► GraphStore (one transaction)
//! HistoryService ──► AuditStore + GraphStore (composite node view)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod config;
pub mod error;
pub mod graph;
pub mod kernel;
pub mod store;
pub mod types;
pub mod versioning;

// Re-exports
pub use audit::{AttributeDiff, AuditLog, ChangeRoute, Classification, HistoryService, MoveCoalescer, WithdrawnMoves};
pub use config::{HistoryLimits, KernelConfig};
pub use error::{KernelError, KernelResult};
pub use graph::{EdgeUpdate, GraphService, NewEdge, NewNode, NewTableRow, NodeUpdate, TableRowUpdate};
pub use kernel::Kernel;
pub use store::{AuditStore, GraphStore, GraphTransaction, InMemoryAuditStore, InMemoryGraphStore};
#[cfg(feature = "postgres")]
pub use store::{PoolStats, PostgresAuditStore, PostgresConfig, PostgresGraphStore};
pub use types::{
    ActionType, Area, AreaId, AuditEntry, AuditQuery, ChangeSet, CountryId, Edge, EdgeId,
    EntityType, HistoryFilter, HistoryPage, MapVersion, Node, NodeDetail, NodeId, NodeRecord,
    NodeType, Position, RowId, Snapshot, TableRow, UserId, VersionDetail, VersionId,
    VersionSummary, SNAPSHOT_SCHEMA_VERSION,
};
pub use versioning::{RestoreReport, VersionService};
