//! Wiring of the services over one graph store and one audit store.

use std::sync::Arc;

use crate::audit::{AuditLog, HistoryService, MoveCoalescer};
use crate::config::KernelConfig;
use crate::graph::GraphService;
use crate::store::{AuditStore, GraphStore, InMemoryAuditStore, InMemoryGraphStore};
use crate::versioning::VersionService;

/// All services sharing one store pair, one audit log and one move
/// coalescer.
pub struct Kernel<G, A> {
    /// Graph store.
    pub graph_store: Arc<G>,
    /// Audit store.
    pub audit_store: Arc<A>,
    /// Audited mutations.
    pub graph: GraphService<G, A>,
    /// Snapshots and restores.
    pub versions: VersionService<G, A>,
    /// History queries.
    pub history: HistoryService<G, A>,
    /// Pending move registry.
    pub coalescer: MoveCoalescer<A>,
}

impl<G: GraphStore, A: AuditStore + 'static> Kernel<G, A> {
    /// Wire the services together.
    pub fn new(graph_store: Arc<G>, audit_store: Arc<A>, config: &KernelConfig) -> Self {
        let log = AuditLog::new(Arc::clone(&audit_store));
        let coalescer = MoveCoalescer::new(log.clone(), config.move_window);

        tracing::debug!(
            move_window_ms = config.move_window.as_millis() as u64,
            history_default_limit = config.history.default_limit,
            history_max_limit = config.history.max_limit,
            "Kernel wired"
        );

        Self {
            graph: GraphService::new(Arc::clone(&graph_store), log.clone(), coalescer.clone()),
            versions: VersionService::new(Arc::clone(&graph_store), log, coalescer.clone()),
            history: HistoryService::new(Arc::clone(&graph_store), Arc::clone(&audit_store), config.history),
            coalescer,
            graph_store,
            audit_store,
        }
    }
}

impl Kernel<InMemoryGraphStore, InMemoryAuditStore> {
    /// Kernel over fresh in-memory stores.
    pub fn in_memory(config: &KernelConfig) -> Self {
        Self::new(
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(InMemoryAuditStore::new()),
            config,
        )
    }
}
