//! Append side of the audit trail.

use std::sync::Arc;

use chrono::Utc;

use crate::store::AuditStore;
use crate::types::{AuditEntry, NewAuditEntry};

/// Best-effort writer over an [`AuditStore`].
///
/// A failed write is logged and dropped: the mutation that produced it has
/// already committed and must not be reported as failed.
pub struct AuditLog<A> {
    store: Arc<A>,
}

impl<A> Clone for AuditLog<A> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<A: AuditStore> AuditLog<A> {
    /// Create a writer over the given store.
    pub fn new(store: Arc<A>) -> Self {
        Self { store }
    }

    /// Stamp and append an entry. Returns the stored entry, or `None` if the
    /// write failed.
    pub async fn record(&self, entry: NewAuditEntry) -> Option<AuditEntry> {
        let entry = entry.into_entry(Utc::now());
        match self.store.append(&entry).await {
            Ok(()) => {
                tracing::trace!(
                    entity_type = %entry.entity_type,
                    entity_id = %entry.entity_id,
                    action = %entry.action_type,
                    "Audit entry recorded"
                );
                Some(entry)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    entity_type = %entry.entity_type,
                    entity_id = %entry.entity_id,
                    action = %entry.action_type,
                    "Failed to record audit entry"
                );
                None
            }
        }
    }
}
