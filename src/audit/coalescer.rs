//! Debouncing of position-only node updates.
//!
//! Dragging a node produces a burst of position updates. Each one re-arms a
//! per-node timer; when the node has been still for the whole window a single
//! MOVE entry is written, spanning the first recorded position of the burst
//! to the last one.
//!
//! Every arm takes a fresh generation number. A timer only emits if the
//! pending entry still carries its generation, so a timer that was already
//! past its sleep when it got replaced cannot write a stale move. Writers
//! also pass a commit-order ticket so an arm that lost a race to a later
//! commit cannot overwrite the newer position.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::classifier::{move_description, AttributeDiff};
use super::log::AuditLog;
use crate::store::AuditStore;
use crate::types::{ActionType, Attributes, AuditEntry, ChangeSet, EntityType, NewAuditEntry, NodeId, UserId};

/// Buffered pair of one burst.
struct HeldMove {
    before: Attributes,
    after: Attributes,
    actor: UserId,
    ticket: u64,
}

struct PendingMove {
    held: HeldMove,
    generation: u64,
    timer: JoinHandle<()>,
}

struct Inner<A> {
    log: AuditLog<A>,
    window: Duration,
    pending: Mutex<HashMap<NodeId, PendingMove>>,
    generation: AtomicU64,
    tickets: AtomicU64,
}

impl<A: AuditStore + 'static> Inner<A> {
    async fn fire(&self, node: NodeId, generation: u64) {
        let taken = {
            let mut pending = self.pending.lock();
            match pending.get(&node) {
                Some(p) if p.generation == generation => pending.remove(&node),
                _ => None,
            }
        };
        match taken {
            Some(p) => {
                tracing::debug!(node_id = %node, generation, "Move window elapsed");
                self.emit(node, p.held).await;
            }
            None => {
                tracing::trace!(node_id = %node, generation, "Stale move timer ignored");
            }
        }
    }

    async fn emit(&self, node: NodeId, held: HeldMove) -> Option<AuditEntry> {
        let description = move_description(&held.before, &held.after);
        self.log
            .record(NewAuditEntry {
                user_id: held.actor,
                entity_type: EntityType::Node,
                entity_id: node.as_uuid(),
                action_type: ActionType::Move,
                changes: ChangeSet::between(held.before, held.after),
                description: Some(description),
            })
            .await
    }
}

/// Pending moves taken out of the registry by [`MoveCoalescer::withdraw`].
///
/// Dropping it discards the moves; [`MoveCoalescer::reinstate`] puts them
/// back when the write that withdrew them did not commit.
#[must_use]
pub struct WithdrawnMoves {
    moves: Vec<(NodeId, HeldMove)>,
}

impl WithdrawnMoves {
    /// Number of withdrawn moves.
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    /// Whether nothing was pending.
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

/// Keyed registry of pending moves.
///
/// Cloning shares the registry.
pub struct MoveCoalescer<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for MoveCoalescer<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: AuditStore + 'static> MoveCoalescer<A> {
    /// Create a coalescer writing to `log` after `window` of stillness.
    pub fn new(log: AuditLog<A>, window: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                log,
                window,
                pending: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                tickets: AtomicU64::new(0),
            }),
        }
    }

    /// Configured window.
    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Next commit-order ticket. Take it while the write still holds the
    /// node's lock so tickets follow commit order.
    pub fn ticket(&self) -> u64 {
        self.inner.tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Buffer a position-only diff and (re)start the node's timer.
    ///
    /// The first diff of a burst anchors `before`; later diffs replace
    /// `after` and the actor unless they carry an older ticket than the one
    /// buffered. Must be called from within a tokio runtime.
    pub fn arm(&self, node: NodeId, diff: AttributeDiff, actor: UserId, ticket: u64) {
        let held = HeldMove {
            before: diff.before,
            after: diff.after,
            actor,
            ticket,
        };
        self.buffer(node, held, false);
    }

    fn buffer(&self, node: NodeId, incoming: HeldMove, reinstated: bool) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut pending = self.inner.pending.lock();

        let held = match pending.remove(&node) {
            Some(previous) => {
                previous.timer.abort();
                let mut merged = previous.held;
                // A reinstated burst started before the one now pending.
                if reinstated {
                    merged.before = incoming.before;
                }
                if incoming.ticket >= merged.ticket {
                    merged.after = incoming.after;
                    merged.actor = incoming.actor;
                    merged.ticket = incoming.ticket;
                } else {
                    tracing::debug!(node_id = %node, ticket = incoming.ticket, "Out-of-order move kept older position");
                }
                merged
            }
            None => incoming,
        };

        let inner = Arc::clone(&self.inner);
        let window = self.inner.window;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            inner.fire(node, generation).await;
        });

        tracing::debug!(node_id = %node, generation, ticket = held.ticket, "Move window armed");
        pending.insert(node, PendingMove { held, generation, timer });
    }

    /// Take the pending moves of `nodes` out of the registry and stop their
    /// timers. Nothing is written.
    pub fn withdraw(&self, nodes: &[NodeId]) -> WithdrawnMoves {
        let mut pending = self.inner.pending.lock();
        let moves: Vec<(NodeId, HeldMove)> = nodes
            .iter()
            .filter_map(|node| {
                pending.remove(node).map(|p| {
                    p.timer.abort();
                    (*node, p.held)
                })
            })
            .collect();
        if !moves.is_empty() {
            tracing::debug!(withdrawn = moves.len(), "Pending moves withdrawn");
        }
        WithdrawnMoves { moves }
    }

    /// Put withdrawn moves back, each with a fresh window. A move armed for
    /// the same node in the meantime is merged, keeping the older anchor.
    pub fn reinstate(&self, withdrawn: WithdrawnMoves) {
        for (node, held) in withdrawn.moves {
            self.buffer(node, held, true);
        }
    }

    /// Write a node's pending move now.
    pub async fn flush(&self, node: NodeId) -> Option<AuditEntry> {
        let taken = self.inner.pending.lock().remove(&node);
        let p = taken?;
        p.timer.abort();
        self.inner.emit(node, p.held).await
    }

    /// Write every pending move now, in node id order.
    pub async fn flush_all(&self) -> Vec<AuditEntry> {
        let mut drained: Vec<(NodeId, PendingMove)> = self.inner.pending.lock().drain().collect();
        drained.sort_by_key(|(node, _)| *node);

        let mut written = Vec::with_capacity(drained.len());
        for (node, p) in drained {
            p.timer.abort();
            if let Some(entry) = self.inner.emit(node, p.held).await {
                written.push(entry);
            }
        }
        written
    }

    /// Whether a move is pending for the node.
    pub fn is_pending(&self, node: NodeId) -> bool {
        self.inner.pending.lock().contains_key(&node)
    }

    /// Number of nodes with a pending move.
    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().len()
    }
}
