//! Integration tests for move coalescing through the graph service.
//!
//! Time is paused; tokio auto-advances the clock whenever every task is idle,
//! so sleeping past the window lets the pending timers fire deterministically.

use std::time::Duration;

use area_graph_kernel::store::FailPoint;
use area_graph_kernel::{
    ActionType, AreaId, AuditEntry, CountryId, EntityType, Kernel, KernelConfig, NewNode, NodeId,
    NodeType, NodeUpdate, Position, UserId,
};
use area_graph_kernel::{InMemoryAuditStore, InMemoryGraphStore};
use serde_json::json;

type TestKernel = Kernel<InMemoryGraphStore, InMemoryAuditStore>;

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

async fn setup(window_ms: u64) -> (TestKernel, AreaId, NodeId, UserId) {
    let config = KernelConfig::default().with_move_window(Duration::from_millis(window_ms));
    let k = Kernel::in_memory(&config);
    let user = UserId::generate();
    let area = k.graph.create_area("Quay", CountryId::generate(), user).await.unwrap().id;
    let node = k
        .graph
        .create_node(
            NewNode {
                area_id: Some(area),
                label: "Crane".into(),
                position: Position::new(0.0, 0.0),
                ..NewNode::default()
            },
            user,
        )
        .await
        .unwrap()
        .node
        .id;
    (k, area, node, user)
}

/// Node entries after its CREATE, oldest first.
fn node_actions(k: &TestKernel, node: NodeId) -> Vec<AuditEntry> {
    let mut entries: Vec<AuditEntry> = k
        .audit_store
        .all()
        .into_iter()
        .filter(|e| e.entity_type == EntityType::Node && e.entity_id == node.as_uuid())
        .filter(|e| e.action_type != ActionType::Create)
        .collect();
    entries.reverse();
    entries
}

async fn drag(k: &TestKernel, node: NodeId, x: f64, y: f64, user: UserId) {
    k.graph.update_node(node, NodeUpdate::position(x, y), user).await.unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Bursts
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_drag_burst_writes_one_move() {
    let (k, _, node, user) = setup(1000).await;

    drag(&k, node, 10.0, 0.0, user).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    drag(&k, node, 20.0, 5.0, user).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    drag(&k, node, 30.0, 40.0, user).await;

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(node_actions(&k, node).is_empty());
    assert!(k.coalescer.is_pending(node));

    tokio::time::sleep(Duration::from_millis(200)).await;
    let entries = node_actions(&k, node);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action_type, ActionType::Move);
    assert_eq!(entries[0].changes.before, Some(json!({"position": {"x": 0.0, "y": 0.0}})));
    assert_eq!(entries[0].changes.after, Some(json!({"position": {"x": 30.0, "y": 40.0}})));
    assert_eq!(entries[0].description.as_deref(), Some("Node moved from (0, 0) to (30, 40)"));
    assert!(!k.coalescer.is_pending(node));
}

#[tokio::test(start_paused = true)]
async fn test_separated_drags_write_separate_moves() {
    let (k, _, node, user) = setup(500).await;

    drag(&k, node, 10.0, 10.0, user).await;
    tokio::time::sleep(Duration::from_millis(600)).await;
    drag(&k, node, 20.0, 20.0, user).await;
    tokio::time::sleep(Duration::from_millis(600)).await;

    let entries = node_actions(&k, node);
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.action_type == ActionType::Move));
    assert_eq!(entries[1].changes.before, Some(json!({"position": {"x": 10.0, "y": 10.0}})));
}

#[tokio::test(start_paused = true)]
async fn test_moves_of_different_nodes_are_independent() {
    let (k, area, crane, user) = setup(1000).await;
    let silo = k
        .graph
        .create_node(NewNode { area_id: Some(area), label: "Silo".into(), ..NewNode::default() }, user)
        .await
        .unwrap()
        .node
        .id;

    drag(&k, crane, 1.0, 1.0, user).await;
    drag(&k, silo, 2.0, 2.0, user).await;
    assert_eq!(k.coalescer.pending_len(), 2);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(node_actions(&k, crane).len(), 1);
    assert_eq!(node_actions(&k, silo).len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Interaction with other updates
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_label_during_drag_is_written_immediately() {
    let (k, _, node, user) = setup(1000).await;

    drag(&k, node, 5.0, 5.0, user).await;
    k.graph
        .update_node(node, NodeUpdate { label: Some("Crane B".into()), ..NodeUpdate::default() }, user)
        .await
        .unwrap();

    let entries = node_actions(&k, node);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action_type, ActionType::LabelChange);
    assert_eq!(entries[0].changes.before, Some(json!({"label": "Crane"})));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let actions: Vec<ActionType> = node_actions(&k, node).iter().map(|e| e.action_type).collect();
    assert_eq!(actions, vec![ActionType::LabelChange, ActionType::Move]);
}

#[tokio::test(start_paused = true)]
async fn test_mixed_update_bypasses_coalescer() {
    let (k, _, node, user) = setup(1000).await;

    let update = NodeUpdate {
        label: Some("Crane B".into()),
        ..NodeUpdate::position(50.0, 60.0)
    };
    k.graph.update_node(node, update, user).await.unwrap();

    assert!(!k.coalescer.is_pending(node));
    let entries = node_actions(&k, node);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action_type, ActionType::LabelChange);
    let after = entries[0].changes.after.as_ref().unwrap();
    assert_eq!(after["position"], json!({"x": 50.0, "y": 60.0}));
    assert_eq!(after["label"], json!("Crane B"));
}

#[tokio::test(start_paused = true)]
async fn test_lock_update_is_classified() {
    let (k, _, node, user) = setup(1000).await;

    k.graph
        .update_node(node, NodeUpdate { locked: Some(true), ..NodeUpdate::default() }, user)
        .await
        .unwrap();
    k.graph
        .update_node(node, NodeUpdate { locked: Some(false), ..NodeUpdate::default() }, user)
        .await
        .unwrap();

    let actions: Vec<ActionType> = node_actions(&k, node).iter().map(|e| e.action_type).collect();
    assert_eq!(actions, vec![ActionType::Lock, ActionType::Unlock]);
}

#[tokio::test(start_paused = true)]
async fn test_noop_update_writes_nothing() {
    let (k, _, node, user) = setup(1000).await;

    drag(&k, node, 0.0, 0.0, user).await;
    k.graph
        .update_node(node, NodeUpdate { label: Some("Crane".into()), ..NodeUpdate::default() }, user)
        .await
        .unwrap();

    assert!(!k.coalescer.is_pending(node));
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(node_actions(&k, node).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_delete_discards_pending_move() {
    let (k, _, node, user) = setup(1000).await;

    drag(&k, node, 70.0, 80.0, user).await;
    k.graph.delete_node(node, user).await.unwrap();
    assert!(!k.coalescer.is_pending(node));

    tokio::time::sleep(Duration::from_secs(5)).await;
    let actions: Vec<ActionType> = node_actions(&k, node).iter().map(|e| e.action_type).collect();
    assert_eq!(actions, vec![ActionType::Delete]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_delete_keeps_pending_move() {
    let (k, _, node, user) = setup(1000).await;

    drag(&k, node, 70.0, 80.0, user).await;
    k.graph_store.fail_on(FailPoint::Commit);
    assert!(k.graph.delete_node(node, user).await.is_err());
    k.graph_store.clear_faults();

    assert!(k.coalescer.is_pending(node));
    assert!(k.graph.get_node(node).await.is_ok());

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let entries = node_actions(&k, node);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action_type, ActionType::Move);
    assert_eq!(entries[0].changes.after, Some(json!({"position": {"x": 70.0, "y": 80.0}})));
}

#[tokio::test(start_paused = true)]
async fn test_type_update_is_classified() {
    let (k, _, node, user) = setup(1000).await;

    let update = NodeUpdate {
        node_type: Some(NodeType::Group),
        ..NodeUpdate::default()
    };
    k.graph.update_node(node, update, user).await.unwrap();

    assert!(!k.coalescer.is_pending(node));
    let entries = node_actions(&k, node);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action_type, ActionType::TypeChange);
    assert_eq!(entries[0].changes.before, Some(json!({"type": "OPS"})));
    assert_eq!(entries[0].changes.after, Some(json!({"type": "GROUP"})));
}

#[tokio::test(start_paused = true)]
async fn test_flush_all_writes_pending_moves_now() {
    let (k, _, node, user) = setup(1000).await;

    drag(&k, node, 3.0, 4.0, user).await;
    let flushed = k.coalescer.flush_all().await;
    assert_eq!(flushed.len(), 1);
    assert_eq!(flushed[0].action_type, ActionType::Move);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(node_actions(&k, node).len(), 1);
}
