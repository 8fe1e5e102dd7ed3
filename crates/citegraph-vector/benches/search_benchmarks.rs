//! Benchmarks for index search in both cosine and token-overlap modes.
//!
//! Uses 1,000 documents for CI speed. Set `BENCH_FULL_SCALE=1` to index
//! 50,000 documents:
//!
//! ```bash
//! BENCH_FULL_SCALE=1 cargo bench -p citegraph-vector
//! ```

use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};

use citegraph_core::types::Document;
use citegraph_vector::embedding::MockEmbedding;
use citegraph_vector::index::EmbeddingIndex;

const CI_DOC_COUNT: usize = 1_000;
const FULL_SCALE_DOC_COUNT: usize = 50_000;

/// Paper-like title and abstract, made unique by its index.
fn generate_document_text(index: usize) -> String {
    format!(
        "Hierarchical agent orchestration with graph memory, study {}. \
         We propose a retrieval layer that blends dense similarity search \
         with citation graph traversal to ground multi-agent planners in \
         prior work. Experiments across reasoning, coding, and research \
         benchmarks show consistent gains over vector-only retrieval.",
        index
    )
}

fn doc_count() -> usize {
    if std::env::var("BENCH_FULL_SCALE").is_ok() {
        FULL_SCALE_DOC_COUNT
    } else {
        CI_DOC_COUNT
    }
}

fn build_index(index: EmbeddingIndex, count: usize, rt: &tokio::runtime::Runtime) -> EmbeddingIndex {
    for i in 0..count {
        let doc = Document::new(format!("paper_{:05}", i), generate_document_text(i));
        rt.block_on(index.upsert(doc)).expect("upsert failed");
    }
    assert_eq!(index.len(), count, "Index should contain all documents");
    index
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime")
}

fn bench_cosine_search(c: &mut Criterion) {
    let count = doc_count();
    let rt = runtime();
    let index = build_index(EmbeddingIndex::with_embedder(MockEmbedding::new()), count, &rt);

    let mut group = c.benchmark_group("cosine_search");
    group.sample_size(50);
    group.measurement_time(Duration::from_secs(10));

    group.bench_function(format!("top10_{}docs", count), |b| {
        b.iter(|| {
            let hits = rt
                .block_on(index.search("graph memory for agents", 10, 0.0))
                .expect("search failed");
            assert!(!hits.is_empty(), "Search should return results");
            hits
        });
    });

    group.finish();
}

fn bench_token_overlap_search(c: &mut Criterion) {
    let count = doc_count();
    let rt = runtime();
    let index = build_index(EmbeddingIndex::new(), count, &rt);

    let mut group = c.benchmark_group("token_overlap_search");
    group.sample_size(50);
    group.measurement_time(Duration::from_secs(10));

    group.bench_function(format!("top10_{}docs", count), |b| {
        b.iter(|| {
            let hits = rt
                .block_on(index.search("citation graph traversal", 10, 0.0))
                .expect("search failed");
            assert!(!hits.is_empty(), "Search should return results");
            hits
        });
    });

    group.finish();
}

criterion_group!(benches, bench_cosine_search, bench_token_overlap_search);
criterion_main!(benches);
