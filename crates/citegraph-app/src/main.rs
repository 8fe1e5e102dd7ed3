//! citegraph binary - composition root.
//!
//! 1. Load configuration from TOML and apply CLI overrides
//! 2. Set up the embedding service (ONNX model when built with `onnx`, else lexical search)
//! 3. Restore a persisted graph (`--load`) or start empty
//! 4. Ingest research outputs (`--build`) and persist (`--save`)
//! 5. Answer `--query`, `--related`, and `--stats`

mod cli;
mod research;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;

use citegraph_core::config::CitegraphConfig;
use citegraph_core::types::RetrievalResult;
use citegraph_retrieval::policy::parse_method_hint;
use citegraph_retrieval::KnowledgeBase;
use citegraph_vector::embedding::DynEmbeddingService;

use cli::CliArgs;

/// Build the embedding service named by the config, if one can be loaded.
fn embedding_service(config: &CitegraphConfig) -> Option<Arc<dyn DynEmbeddingService>> {
    let model_dir = config.search.embedding_model_dir.as_deref()?;
    let model_dir = citegraph_core::config::expand_home(model_dir);

    #[cfg(feature = "onnx")]
    {
        match citegraph_vector::OnnxEmbeddingService::from_directory(&model_dir) {
            Ok(service) => {
                tracing::info!(path = %model_dir.display(), "ONNX embedding model loaded");
                Some(Arc::new(service))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Embedding model unavailable, using token overlap");
                None
            }
        }
    }

    #[cfg(not(feature = "onnx"))]
    {
        tracing::warn!(
            path = %model_dir.display(),
            "Built without the `onnx` feature, ignoring embedding model and using token overlap"
        );
        None
    }
}

async fn build(kb: &KnowledgeBase, data_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let research = research::read_research_outputs(data_dir)?;
    let report = kb.ingest_batch(research.entities).await;

    println!(
        "Ingested {} entities, skipped {}",
        report.succeeded.len(),
        report.skipped.len() + research.rejected.len()
    );
    for skipped in research.rejected.iter().chain(report.skipped.iter()) {
        println!("  skipped #{}: {}", skipped.index, skipped.reason);
    }
    Ok(())
}

fn print_results(results: &[RetrievalResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for result in results {
        let node_type = result
            .metadata
            .get("node_type")
            .and_then(|v| v.as_str())
            .unwrap_or("document");
        let preview: String = result.content.chars().take(120).collect();
        println!(
            "{:>3}. [{:.4}] {} ({})",
            result.rank, result.score, result.id, node_type
        );
        if !preview.is_empty() {
            println!("     {}", preview);
        }
    }
}

fn print_stats(kb: &KnowledgeBase) -> Result<(), Box<dyn std::error::Error>> {
    let stats = kb.stats()?;
    println!("Nodes: {}", stats.graph.total_nodes);
    for (kind, count) in &stats.graph.nodes_by_type {
        println!("  {:<22} {}", kind, count);
    }
    println!("Edges: {}", stats.graph.total_edges);
    for (kind, count) in &stats.graph.edges_by_type {
        println!("  {:<22} {}", kind, count);
    }
    println!(
        "Indexed documents: {} (embeddings {})",
        stats.documents_indexed,
        if stats.embeddings_enabled { "on" } else { "off" }
    );

    let summary = kb.citation_summary()?;
    println!(
        "Papers: {} ({} root, {} survey), citations: {}",
        summary.total_papers,
        summary.root_papers.len(),
        summary.survey_papers.len(),
        summary.total_citations
    );
    if !summary.top_papers.is_empty() {
        println!("Top papers by importance:");
        for (i, paper) in summary.top_papers.iter().enumerate() {
            let title = if paper.title.is_empty() {
                "(untitled)"
            } else {
                paper.title.as_str()
            };
            println!(
                "{:>3}. [{:.4}] {} {}",
                i + 1,
                paper.importance,
                paper.id,
                title
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let (mut config, config_error) = CitegraphConfig::load_or_default_reporting(&config_file);
    if let Some(data_dir) = args.resolve_data_dir() {
        config.general.data_dir = data_dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting citegraph v{}", env!("CARGO_PKG_VERSION"));
    match &config_error {
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
        None => tracing::info!(path = %config_file.display(), "Configuration resolved"),
    }

    // Validate the method before doing any work.
    let hint = parse_method_hint(&args.method)?;
    let top_k = args.resolve_top_k(config.search.default_top_k);
    let embedder = embedding_service(&config);

    // Knowledge base.
    let kb = match &args.load {
        Some(path) => {
            let (kb, report) = KnowledgeBase::restore(path, config.clone(), embedder).await?;
            if report.skipped() > 0 {
                tracing::warn!(
                    nodes_skipped = report.nodes_skipped,
                    edges_skipped = report.edges_skipped,
                    "Some graph records could not be restored"
                );
            }
            kb
        }
        None => KnowledgeBase::new(config.clone(), embedder),
    };

    if args.build {
        let data_dir = config.data_dir();
        tracing::info!(path = %data_dir.display(), "Building knowledge base");
        build(&kb, &data_dir).await?;
    }

    if let Some(path) = &args.save {
        kb.persist(path)?;
        println!("Saved graph to {}", path.display());
    }

    if let Some(query) = &args.query {
        let (results, decision) = kb.retrieve(query, top_k, hint).await?;
        println!(
            "Method: {} (confidence {:.2}): {}",
            decision.method, decision.confidence, decision.reasoning
        );
        if let Some(weights) = decision.weights {
            println!(
                "Weights: vector {:.2}, graph {:.2}",
                weights.vector_weight, weights.graph_weight
            );
        }
        print_results(&results);
    }

    if let Some(id) = &args.related {
        let related = kb.related(id, top_k)?;
        if related.is_empty() {
            println!("No related entities for {}.", id);
        }
        for (i, (other, score)) in related.iter().enumerate() {
            println!("{:>3}. [{:.2}] {}", i + 1, score, other);
        }
    }

    if args.stats || !args.has_action() {
        print_stats(&kb)?;
    }

    Ok(())
}
