//! Read side of the audit trail.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::HistoryLimits;
use crate::error::{KernelError, KernelResult};
use crate::store::{AuditStore, GraphStore};
use crate::types::{sort_newest_first, AuditEntry, EntityType, HistoryFilter, HistoryPage, NodeId, UserId};

/// History queries over the audit trail.
///
/// Needs the graph store for the composite node view, which pulls in the
/// entries of the node's current edges and table rows.
pub struct HistoryService<G, A> {
    graph: Arc<G>,
    audit: Arc<A>,
    limits: HistoryLimits,
}

impl<G, A> Clone for HistoryService<G, A> {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            audit: Arc::clone(&self.audit),
            limits: self.limits,
        }
    }
}

impl<G: GraphStore, A: AuditStore> HistoryService<G, A> {
    /// Create a history service.
    pub fn new(graph: Arc<G>, audit: Arc<A>, limits: HistoryLimits) -> Self {
        Self { graph, audit, limits }
    }

    /// Entries of one entity, newest first.
    pub async fn by_entity(&self, entity_type: EntityType, entity_id: Uuid) -> KernelResult<Vec<AuditEntry>> {
        self.audit
            .by_entity(entity_type, entity_id)
            .await
            .map_err(KernelError::from_store)
    }

    /// Entries written by a user, newest first. A given limit must be at least 1.
    pub async fn by_user(&self, user: UserId, limit: Option<u32>) -> KernelResult<Vec<AuditEntry>> {
        if limit == Some(0) {
            return Err(KernelError::invalid("limit must be at least 1"));
        }
        self.audit
            .by_user(user, limit.map(|l| l as usize))
            .await
            .map_err(KernelError::from_store)
    }

    /// Composite history of a node: its own entries, those of every edge
    /// touching it and those of every table row under its detail, newest first.
    pub async fn by_node(&self, node: NodeId) -> KernelResult<Vec<AuditEntry>> {
        let edge_ids: Vec<Uuid> = self
            .graph
            .incident_edge_ids(node)
            .await
            .map_err(KernelError::from_store)?
            .into_iter()
            .map(|e| e.as_uuid())
            .collect();
        let row_ids: Vec<Uuid> = self
            .graph
            .row_ids_for_node(node)
            .await
            .map_err(KernelError::from_store)?
            .into_iter()
            .map(|r| r.as_uuid())
            .collect();

        let mut merged = self.by_entity(EntityType::Node, node.as_uuid()).await?;
        if !edge_ids.is_empty() {
            merged.extend(
                self.audit
                    .by_entities(EntityType::Edge, &edge_ids)
                    .await
                    .map_err(KernelError::from_store)?,
            );
        }
        if !row_ids.is_empty() {
            merged.extend(
                self.audit
                    .by_entities(EntityType::TableRow, &row_ids)
                    .await
                    .map_err(KernelError::from_store)?,
            );
        }
        sort_newest_first(&mut merged);
        Ok(merged)
    }

    /// Filtered, paginated history.
    ///
    /// With `node_id` the composite node history is computed first, the other
    /// filters are applied to it, and pagination happens in memory.
    pub async fn find_all(&self, filter: &HistoryFilter) -> KernelResult<HistoryPage> {
        let page = filter.page.unwrap_or(1);
        let limit = filter.limit.unwrap_or(self.limits.default_limit);
        if page < 1 {
            return Err(KernelError::invalid("page must be at least 1"));
        }
        if limit < 1 || limit > self.limits.max_limit {
            return Err(KernelError::invalid(format!(
                "limit must be between 1 and {}",
                self.limits.max_limit
            )));
        }
        let offset = (page as usize - 1) * limit as usize;

        let (data, total) = match filter.node_id {
            Some(node) => {
                let matching: Vec<AuditEntry> = self
                    .by_node(node)
                    .await?
                    .into_iter()
                    .filter(|e| filter.query.matches(e))
                    .collect();
                let total = matching.len() as u64;
                let data = matching.into_iter().skip(offset).take(limit as usize).collect();
                (data, total)
            }
            None => self
                .audit
                .query(&filter.query, offset, limit as usize)
                .await
                .map_err(KernelError::from_store)?,
        };

        tracing::debug!(page, limit, total, returned = data.len(), "History page served");
        Ok(HistoryPage { data, total, page, limit })
    }
}
