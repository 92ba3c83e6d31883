//! Performance benchmarks for snapshot capture and restore.
//!
//! Run with: `cargo bench --bench snapshot_restore`
//!
//! ## Performance Targets
//!
//! | Operation | Target | Notes |
//! |-----------|--------|-------|
//! | Capture (1k nodes) | <5ms | Pure, no store access |
//! | Restore (1k nodes) | <50ms | In-memory store, one transaction |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

use area_graph_kernel::versioning::capture;
use area_graph_kernel::{
    AreaId, CountryId, Kernel, KernelConfig, NewEdge, NewNode, NewTableRow, NodeId, Position,
    UserId, VersionId,
};
use area_graph_kernel::{InMemoryAuditStore, InMemoryGraphStore};

type BenchKernel = Kernel<InMemoryGraphStore, InMemoryAuditStore>;

/// Area with `size` nodes in a shallow tree, one row per node and a chain
/// of edges.
async fn make_area(size: usize) -> (BenchKernel, AreaId) {
    let k = Kernel::in_memory(&KernelConfig::default());
    let user = UserId::generate();
    let area = k
        .graph
        .create_area("bench", CountryId::generate(), user)
        .await
        .expect("create area")
        .id;

    let mut ids: Vec<NodeId> = Vec::with_capacity(size);
    for i in 0..size {
        let input = NewNode {
            position: Position::new(i as f64, (i % 17) as f64),
            parent_id: if i % 10 == 0 { None } else { ids.get(i - i % 10).copied() },
            area_id: Some(area),
            label: format!("node-{i}"),
            ..NewNode::default()
        };
        let id = k.graph.create_node(input, user).await.expect("create node").node.id;
        let row = NewTableRow {
            protection_name: format!("row-{i}"),
            ..NewTableRow::default()
        };
        k.graph.create_table_row(id, row, user).await.expect("create row");
        if let Some(prev) = ids.last() {
            k.graph.create_edge(NewEdge::between(*prev, id), user).await.expect("create edge");
        }
        ids.push(id);
    }
    (k, area)
}

/// Benchmark pure snapshot capture.
fn bench_capture(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("capture");

    for size in [10usize, 100, 1000] {
        let (k, area) = rt.block_on(make_area(size));
        let records = rt.block_on(k.graph.nodes_in_area(area)).expect("records");
        let edges = rt.block_on(k.graph_store.all_edges());

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(capture(black_box(&records), black_box(&edges))))
        });
    }
    group.finish();
}

/// Benchmark restore of a stored version over its own live graph.
fn bench_restore(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("restore");
    group.sample_size(20);

    for size in [10usize, 100, 1000] {
        let (k, version): (BenchKernel, VersionId) = rt.block_on(async {
            let (k, area) = make_area(size).await;
            let summary = k
                .versions
                .create_snapshot(area, "bench", None, UserId::generate())
                .await
                .expect("snapshot");
            (k, summary.id)
        });
        let user = UserId::generate();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let report = rt.block_on(k.versions.restore(version, user)).expect("restore");
                black_box(report)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_capture, bench_restore);
criterion_main!(benches);
