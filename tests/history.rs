//! Integration tests for history queries over the audit trail.
//!
//! These tests validate:
//! 1. Pagination bounds and defaults
//! 2. Composite node history (node, incident edges, table rows)
//! 3. Filter combination and inclusive date bounds
//! 4. Audit write failures never failing the mutation

use area_graph_kernel::{
    ActionType, AreaId, AuditQuery, CountryId, EdgeUpdate, EntityType, HistoryFilter, Kernel,
    KernelConfig, NewEdge, NewNode, NewTableRow, NodeId, NodeUpdate, TableRowUpdate, UserId,
};
use area_graph_kernel::{InMemoryAuditStore, InMemoryGraphStore};

type TestKernel = Kernel<InMemoryGraphStore, InMemoryAuditStore>;

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn kernel() -> TestKernel {
    Kernel::in_memory(&KernelConfig::default())
}

async fn make_area(k: &TestKernel, user: UserId) -> AreaId {
    k.graph.create_area("Harbour", CountryId::generate(), user).await.unwrap().id
}

async fn make_node(k: &TestKernel, area: AreaId, label: &str, user: UserId) -> NodeId {
    let input = NewNode {
        area_id: Some(area),
        label: label.to_string(),
        ..NewNode::default()
    };
    k.graph.create_node(input, user).await.unwrap().node.id
}

async fn relabel(k: &TestKernel, node: NodeId, label: &str, user: UserId) {
    let update = NodeUpdate {
        label: Some(label.to_string()),
        ..NodeUpdate::default()
    };
    k.graph.update_node(node, update, user).await.unwrap();
}

fn page_filter(page: Option<u32>, limit: Option<u32>) -> HistoryFilter {
    HistoryFilter {
        page,
        limit,
        ..HistoryFilter::default()
    }
}

fn assert_newest_first(entries: &[area_graph_kernel::AuditEntry]) {
    for pair in entries.windows(2) {
        assert!(pair[0].created_at >= pair[1].created_at);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pagination
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_find_all_rejects_out_of_range_paging() {
    let k = kernel();

    for (page, limit) in [(Some(0), None), (None, Some(0)), (None, Some(101)), (Some(0), Some(101))] {
        let err = k.history.find_all(&page_filter(page, limit)).await.unwrap_err();
        assert!(err.is_invalid_argument(), "page={page:?} limit={limit:?}");
    }
    assert!(k.history.find_all(&page_filter(Some(1), Some(100))).await.is_ok());
}

#[tokio::test]
async fn test_find_all_on_empty_log() {
    let k = kernel();

    let page = k.history.find_all(&HistoryFilter::default()).await.unwrap();
    assert!(page.data.is_empty());
    assert_eq!(page.total, 0);
    assert_eq!(page.page, 1);
    assert_eq!(page.limit, 50);
}

#[tokio::test]
async fn test_find_all_paginates() {
    let k = kernel();
    let user = UserId::generate();
    let area = make_area(&k, user).await;
    let node = make_node(&k, area, "Crane", user).await;
    for i in 0..3 {
        relabel(&k, node, &format!("Crane {i}"), user).await;
    }
    // area CREATE, node CREATE and three LABEL_CHANGE entries.
    assert_eq!(k.audit_store.len(), 5);

    let first = k.history.find_all(&page_filter(Some(1), Some(2))).await.unwrap();
    assert_eq!(first.data.len(), 2);
    assert_eq!(first.total, 5);
    assert_eq!(first.data[0].description.as_deref(), Some("Label changed from \"Crane 1\" to \"Crane 2\""));

    let last = k.history.find_all(&page_filter(Some(3), Some(2))).await.unwrap();
    assert_eq!(last.data.len(), 1);
    assert_eq!(last.total, 5);
    assert_eq!(last.data[0].entity_id, area.as_uuid());

    let beyond = k.history.find_all(&page_filter(Some(4), Some(2))).await.unwrap();
    assert!(beyond.data.is_empty());
    assert_eq!(beyond.total, 5);
}

// ─────────────────────────────────────────────────────────────────────────────
// Composite node history
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_by_node_merges_edges_and_rows() {
    let k = kernel();
    let user = UserId::generate();
    let area = make_area(&k, user).await;
    let crane = make_node(&k, area, "Crane", user).await;
    let silo = make_node(&k, area, "Silo", user).await;
    let lone = make_node(&k, area, "Lone", user).await;

    let edge = k.graph.create_edge(NewEdge::between(silo, crane), user).await.unwrap();
    let unrelated = k.graph.create_edge(NewEdge::between(silo, lone), user).await.unwrap();
    let row = k
        .graph
        .create_table_row(crane, NewTableRow { protection_name: "Fence".into(), ..NewTableRow::default() }, user)
        .await
        .unwrap();

    relabel(&k, crane, "Crane 2", user).await;
    k.graph
        .update_edge(edge.id, EdgeUpdate { edge_type: Some("step".into()), ..EdgeUpdate::default() }, user)
        .await
        .unwrap();
    k.graph
        .update_table_row(row.id, TableRowUpdate { excerpt: Some("updated".into()), ..TableRowUpdate::default() }, user)
        .await
        .unwrap();
    relabel(&k, silo, "Silo 2", user).await;
    k.graph
        .update_edge(unrelated.id, EdgeUpdate { edge_type: Some("step".into()), ..EdgeUpdate::default() }, user)
        .await
        .unwrap();

    let history = k.history.by_node(crane).await.unwrap();
    assert_newest_first(&history);

    let node_entries = history.iter().filter(|e| e.entity_type == EntityType::Node).count();
    let edge_entries = history.iter().filter(|e| e.entity_type == EntityType::Edge).count();
    let row_entries = history.iter().filter(|e| e.entity_type == EntityType::TableRow).count();
    assert_eq!(node_entries, 2);
    assert_eq!(edge_entries, 2);
    assert_eq!(row_entries, 2);

    for entry in &history {
        assert!([crane.as_uuid(), edge.id.as_uuid(), row.id.as_uuid()].contains(&entry.entity_id));
    }
}

#[tokio::test]
async fn test_by_node_for_unknown_node_is_empty() {
    let k = kernel();
    assert!(k.history.by_node(NodeId::generate()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_find_all_with_node_filter() {
    let k = kernel();
    let user = UserId::generate();
    let area = make_area(&k, user).await;
    let crane = make_node(&k, area, "Crane", user).await;
    let silo = make_node(&k, area, "Silo", user).await;
    k.graph.create_edge(NewEdge::between(crane, silo), user).await.unwrap();
    for i in 0..4 {
        relabel(&k, crane, &format!("Crane {i}"), user).await;
    }

    let mut filter = page_filter(Some(2), Some(2));
    filter.node_id = Some(crane);
    let page = k.history.find_all(&filter).await.unwrap();
    // Node CREATE, edge CREATE and four LABEL_CHANGE entries.
    assert_eq!(page.total, 6);
    assert_eq!(page.data.len(), 2);

    filter.query.action_type = Some(ActionType::LabelChange);
    filter.page = Some(1);
    filter.limit = Some(10);
    let labels = k.history.find_all(&filter).await.unwrap();
    assert_eq!(labels.total, 4);
    assert!(labels.data.iter().all(|e| e.action_type == ActionType::LabelChange));
    assert_newest_first(&labels.data);
}

// ─────────────────────────────────────────────────────────────────────────────
// Filters
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_find_all_combines_filters() {
    let k = kernel();
    let alice = UserId::generate();
    let bob = UserId::generate();
    let area = make_area(&k, alice).await;
    let crane = make_node(&k, area, "Crane", alice).await;
    let silo = make_node(&k, area, "Silo", bob).await;
    k.graph.create_edge(NewEdge::between(crane, silo), bob).await.unwrap();

    let filter = HistoryFilter {
        query: AuditQuery {
            user_id: Some(bob),
            entity_type: Some(EntityType::Node),
            ..AuditQuery::default()
        },
        ..HistoryFilter::default()
    };
    let page = k.history.find_all(&filter).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.data[0].entity_id, silo.as_uuid());
    assert_eq!(page.data[0].action_type, ActionType::Create);
}

#[tokio::test]
async fn test_date_bounds_are_inclusive() {
    let k = kernel();
    let user = UserId::generate();
    make_area(&k, user).await;
    let entry = k.audit_store.all().remove(0);

    let filter = HistoryFilter {
        query: AuditQuery {
            date_from: Some(entry.created_at),
            date_to: Some(entry.created_at),
            ..AuditQuery::default()
        },
        ..HistoryFilter::default()
    };
    let page = k.history.find_all(&filter).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.data[0].id, entry.id);

    let after = HistoryFilter {
        query: AuditQuery {
            date_from: Some(entry.created_at + chrono::Duration::milliseconds(1)),
            ..AuditQuery::default()
        },
        ..HistoryFilter::default()
    };
    assert_eq!(k.history.find_all(&after).await.unwrap().total, 0);
}

#[tokio::test]
async fn test_by_user_limit() {
    let k = kernel();
    let user = UserId::generate();
    let area = make_area(&k, user).await;
    for label in ["a", "b", "c"] {
        make_node(&k, area, label, user).await;
    }

    assert!(k.history.by_user(user, Some(0)).await.unwrap_err().is_invalid_argument());

    let all = k.history.by_user(user, None).await.unwrap();
    assert_eq!(all.len(), 4);
    assert_newest_first(&all);

    let two = k.history.by_user(user, Some(2)).await.unwrap();
    assert_eq!(two, all[..2].to_vec());

    assert!(k.history.by_user(UserId::generate(), None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_by_entity_newest_first() {
    let k = kernel();
    let user = UserId::generate();
    let area = make_area(&k, user).await;
    let node = make_node(&k, area, "Crane", user).await;
    relabel(&k, node, "Crane 2", user).await;
    k.graph.delete_node(node, user).await.unwrap();

    let actions: Vec<ActionType> = k
        .history
        .by_entity(EntityType::Node, node.as_uuid())
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.action_type)
        .collect();
    assert_eq!(actions, vec![ActionType::Delete, ActionType::LabelChange, ActionType::Create]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Audit failures
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_audit_failure_does_not_fail_mutation() {
    let k = kernel();
    let user = UserId::generate();
    let area = make_area(&k, user).await;
    let before = k.audit_store.len();

    k.audit_store.set_failing(true);
    let node = make_node(&k, area, "Crane", user).await;
    relabel(&k, node, "Crane 2", user).await;
    k.audit_store.set_failing(false);

    assert_eq!(k.audit_store.len(), before);
    let record = k.graph.get_node(node).await.unwrap();
    assert_eq!(record.detail.unwrap().label, "Crane 2");
}
