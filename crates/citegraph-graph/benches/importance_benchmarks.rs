//! Benchmarks for graph traversal and PageRank importance.
//!
//! Uses a synthetic citation network of 2,000 papers for CI speed. Set
//! `BENCH_FULL_SCALE=1` to run against 20,000 papers:
//!
//! ```bash
//! BENCH_FULL_SCALE=1 cargo bench -p citegraph-graph
//! ```

use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};

use citegraph_core::types::{Edge, EdgeKind};
use citegraph_graph::ingest::PaperFields;
use citegraph_graph::store::GraphStore;

const CI_PAPER_COUNT: usize = 2_000;
const FULL_SCALE_PAPER_COUNT: usize = 20_000;

fn paper_count() -> usize {
    if std::env::var("BENCH_FULL_SCALE").is_ok() {
        FULL_SCALE_PAPER_COUNT
    } else {
        CI_PAPER_COUNT
    }
}

/// Each paper cites up to five earlier papers and introduces one of 50 concepts.
fn build_citation_network(count: usize) -> GraphStore {
    let store = GraphStore::new();
    for i in 0..count {
        let cites = (1..=5)
            .filter(|step| i >= step * 7)
            .map(|step| format!("{:05}", i - step * 7))
            .collect();
        let paper = PaperFields {
            arxiv_id: format!("{:05}", i),
            title: format!("Paper {}", i),
            key_concepts: vec![format!("concept {}", i % 50)],
            cites,
            ..Default::default()
        };
        let (_, batch) = paper.to_batch().expect("paper batch");
        store.apply(batch).expect("apply batch");
    }
    store
}

fn bench_importance(c: &mut Criterion) {
    let count = paper_count();
    let store = build_citation_network(count);

    let mut group = c.benchmark_group("importance");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(10));

    // A zero-weight self edge invalidates the cache each iteration.
    group.bench_function(format!("pagerank_cold_{}papers", count), |b| {
        b.iter(|| {
            let touch = Edge::new("paper_00000", "paper_00000", EdgeKind::SimilarTo).with_weight(0.0);
            store.add_edge(touch).expect("add edge");
            let scores = store.importance().expect("importance");
            assert_eq!(scores.len(), store.node_count());
            scores
        });
    });

    group.bench_function(format!("pagerank_cached_{}papers", count), |b| {
        b.iter(|| store.importance().expect("importance"));
    });

    group.finish();
}

fn bench_traversal(c: &mut Criterion) {
    let count = paper_count();
    let store = build_citation_network(count);
    let start = format!("paper_{:05}", count - 1);

    let mut group = c.benchmark_group("traversal");
    group.sample_size(100);

    group.bench_function(format!("neighbors_depth3_{}papers", count), |b| {
        b.iter(|| {
            store
                .neighbors(&start, Some(EdgeKind::Cites), 3)
                .expect("neighbors")
        });
    });

    group.bench_function(format!("related_entities_top10_{}papers", count), |b| {
        b.iter(|| store.related_entities(&start, 10).expect("related"));
    });

    group.finish();
}

criterion_group!(benches, bench_importance, bench_traversal);
criterion_main!(benches);
