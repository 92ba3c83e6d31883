//! Map versions: snapshot capture and restore.
//!
//! Both directions run inside a single store transaction, so a reader sees
//! either the graph before or the graph after, never a mix. A restore writes
//! exactly one audit entry, after commit.

pub mod restore;
pub mod snapshot;

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

pub use restore::{apply_snapshot, find_parent_cycle, RestoreReport};
pub use snapshot::capture;

use crate::audit::{AuditLog, MoveCoalescer};
use crate::error::{KernelError, KernelResult};
use crate::store::{AuditStore, GraphStore, GraphTransaction};
use crate::types::{
    ActionType, AreaId, ChangeSet, EntityType, MapVersion, NewAuditEntry, NodeId, UserId,
    VersionDetail, VersionId, VersionSummary,
};

/// Snapshot and restore operations.
pub struct VersionService<G, A> {
    graph: Arc<G>,
    log: AuditLog<A>,
    coalescer: MoveCoalescer<A>,
}

impl<G, A> Clone for VersionService<G, A> {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            log: self.log.clone(),
            coalescer: self.coalescer.clone(),
        }
    }
}

impl<G: GraphStore, A: AuditStore + 'static> VersionService<G, A> {
    /// Create a version service. The coalescer is used to drop pending moves
    /// of nodes a restore deletes.
    pub fn new(graph: Arc<G>, log: AuditLog<A>, coalescer: MoveCoalescer<A>) -> Self {
        Self { graph, log, coalescer }
    }

    /// Capture the area's current graph as a new version.
    ///
    /// # Errors
    /// - `NotFound` if the area does not exist (checked first)
    /// - `InvalidArgument` if `name` is blank
    pub async fn create_snapshot(
        &self,
        area: AreaId,
        name: &str,
        description: Option<String>,
        actor: UserId,
    ) -> KernelResult<VersionSummary> {
        let mut tx = self.graph.begin().await.map_err(KernelError::from_store)?;

        if tx.get_area(area).await.map_err(KernelError::from_store)?.is_none() {
            return Err(KernelError::not_found("Area", area));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(KernelError::invalid("version name must not be blank"));
        }

        let records = tx.nodes_in_area(area).await.map_err(KernelError::from_store)?;
        let ids: Vec<NodeId> = records.iter().map(|r| r.node.id).collect();
        let edges = tx.edges_within(&ids).await.map_err(KernelError::from_store)?;

        let version = MapVersion {
            id: VersionId::generate(),
            area_id: area,
            name: name.to_string(),
            description,
            created_at: Utc::now(),
            created_by: actor,
            snapshot: capture(&records, &edges),
        };
        tx.insert_version(&version).await.map_err(KernelError::from_store)?;
        tx.commit().await.map_err(KernelError::from_store)?;

        tracing::info!(
            version_id = %version.id,
            area_id = %area,
            nodes = version.snapshot.nodes.len(),
            edges = version.snapshot.edges.len(),
            rows = version.snapshot.table_rows.len(),
            "Snapshot created"
        );
        Ok(version.summary())
    }

    /// Versions of an area, newest first.
    pub async fn list_versions(&self, area: AreaId) -> KernelResult<Vec<VersionSummary>> {
        let versions = self.graph.list_versions(area).await.map_err(KernelError::from_store)?;
        Ok(versions.iter().map(MapVersion::summary).collect())
    }

    /// One version with its payload.
    pub async fn get_version(&self, id: VersionId) -> KernelResult<VersionDetail> {
        self.graph
            .get_version(id)
            .await
            .map_err(KernelError::from_store)?
            .map(MapVersion::into_detail)
            .ok_or_else(|| KernelError::not_found("Version", id))
    }

    /// Replace the version's area with the version's content.
    ///
    /// Everything happens in one transaction; on any error the live graph is
    /// left untouched. A snapshot whose parent links form a cycle is rejected
    /// before anything is deleted.
    ///
    /// # Errors
    /// - `NotFound` if the version does not exist
    /// - `InvalidArgument` if the snapshot's layout version is unsupported or
    ///   its parent links form a cycle
    /// - `Internal` on any store failure
    pub async fn restore(&self, id: VersionId, actor: UserId) -> KernelResult<RestoreReport> {
        let mut tx = self.graph.begin().await.map_err(KernelError::from_store)?;

        let version = tx
            .get_version(id)
            .await
            .map_err(KernelError::from_store)?
            .ok_or_else(|| KernelError::not_found("Version", id))?;

        if !version.snapshot.is_supported_schema() {
            return Err(KernelError::invalid(format!(
                "unsupported snapshot schema version {}",
                version.snapshot.schema_version.as_deref().unwrap_or_default()
            )));
        }
        if let Some(cycle) = find_parent_cycle(&version.snapshot) {
            tracing::warn!(version_id = %id, cycle_len = cycle.len(), "Snapshot parent links form a cycle");
            return Err(KernelError::invalid(format!(
                "snapshot parent links form a cycle through {} node(s)",
                cycle.len()
            )));
        }

        let mut report = apply_snapshot(&mut tx, version.area_id, &version.snapshot)
            .await
            .map_err(KernelError::from_store)?;
        report.version_id = Some(id);

        let withdrawn = self.coalescer.withdraw(&report.removed_nodes);
        if let Err(e) = tx.commit().await {
            self.coalescer.reinstate(withdrawn);
            return Err(KernelError::from_store(e));
        }
        let cancelled = withdrawn.len();

        self.log
            .record(NewAuditEntry {
                user_id: actor,
                entity_type: EntityType::Node,
                entity_id: version.area_id.as_uuid(),
                action_type: ActionType::RestoreVersion,
                changes: ChangeSet {
                    before: None,
                    after: Some(json!({ "versionId": id, "versionName": version.name })),
                },
                description: Some(format!("Restored version \"{}\"", version.name)),
            })
            .await;

        tracing::info!(
            version_id = %id,
            area_id = %version.area_id,
            removed_nodes = report.removed_nodes.len(),
            nodes_created = report.nodes_created,
            rows_created = report.rows_created,
            edges_created = report.edges_created,
            edges_skipped = report.edges_skipped,
            cancelled_moves = cancelled,
            "Version restored"
        );
        Ok(report)
    }

    /// Delete a version.
    pub async fn delete_version(&self, id: VersionId) -> KernelResult<()> {
        let mut tx = self.graph.begin().await.map_err(KernelError::from_store)?;
        if !tx.delete_version(id).await.map_err(KernelError::from_store)? {
            return Err(KernelError::not_found("Version", id));
        }
        tx.commit().await.map_err(KernelError::from_store)?;
        tracing::info!(version_id = %id, "Version deleted");
        Ok(())
    }
}
