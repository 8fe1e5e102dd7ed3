//! `KnowledgeBase`: the ingest and retrieve surface over graph, index, and policy.
//!
//! Ingest writes entities to the graph store and mirrors each entity's text projection into
//! the embedding index under the node id. Retrieval is delegated to the policy.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use citegraph_core::config::CitegraphConfig;
use citegraph_core::error::{CitegraphError, Result};
use citegraph_core::types::{Document, Node, PolicyDecision, RetrievalMethod, RetrievalResult};
use citegraph_graph::citation::{CitationNetwork, CitationSummary};
use citegraph_graph::ingest::{citation_batch, DiscussionFields, PaperFields, ProjectFields};
use citegraph_graph::persist::{self, LoadReport};
use citegraph_graph::store::{GraphBatch, GraphStats, GraphStore, ImportanceParams};
use citegraph_vector::embedding::DynEmbeddingService;
use citegraph_vector::index::EmbeddingIndex;

use crate::fusion::RrfFusion;
use crate::graph_retriever::GraphRetriever;
use crate::policy::{DecisionStats, ExecutionSettings, RetrievalPolicy};

/// A typed research entity accepted by [`KnowledgeBase::ingest`].
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Paper(PaperFields),
    Project(ProjectFields),
    Discussion(DiscussionFields),
    /// `citing` cites `cited`, both given as arXiv ids.
    Citation { citing: String, cited: String },
}

/// An entity rejected during batch ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedEntity {
    /// Position in the submitted batch.
    pub index: usize,
    pub reason: String,
}

/// Outcome of [`KnowledgeBase::ingest_batch`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    /// Node ids of ingested entities (citations report the citing paper).
    pub succeeded: Vec<String>,
    pub skipped: Vec<SkippedEntity>,
}

/// Combined statistics for the knowledge base.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeBaseStats {
    pub graph: GraphStats,
    pub documents_indexed: usize,
    pub embeddings_enabled: bool,
    pub decisions: DecisionStats,
}

pub struct KnowledgeBase {
    config: CitegraphConfig,
    graph: Arc<GraphStore>,
    index: Arc<EmbeddingIndex>,
    policy: RetrievalPolicy,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .field("documents", &self.index.len())
            .finish()
    }
}

impl KnowledgeBase {
    /// Create an empty knowledge base. Without an embedder, search uses token overlap.
    pub fn new(config: CitegraphConfig, embedder: Option<Arc<dyn DynEmbeddingService>>) -> Self {
        let graph = GraphStore::with_params(ImportanceParams::from(&config.graph));
        Self::from_parts(config, graph, embedder)
    }

    fn from_parts(
        config: CitegraphConfig,
        graph: GraphStore,
        embedder: Option<Arc<dyn DynEmbeddingService>>,
    ) -> Self {
        let graph = Arc::new(graph);
        let index = Arc::new(EmbeddingIndex::with_dyn(embedder));
        let settings = ExecutionSettings::from_config(&config.retrieval, config.search.min_score);
        let policy = RetrievalPolicy::new(
            Arc::clone(&index),
            GraphRetriever::new(Arc::clone(&graph)),
            RrfFusion::new(config.retrieval.rrf_k),
            settings,
        );
        Self {
            config,
            graph,
            index,
            policy,
        }
    }

    pub fn config(&self) -> &CitegraphConfig {
        &self.config
    }

    pub fn graph(&self) -> &Arc<GraphStore> {
        &self.graph
    }

    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    pub fn policy(&self) -> &RetrievalPolicy {
        &self.policy
    }

    // =========================================================================
    // Ingest
    // =========================================================================

    /// Route an entity to its ingest operation. Returns the primary node id.
    pub async fn ingest(&self, entity: Entity) -> Result<String> {
        match entity {
            Entity::Paper(fields) => self.ingest_paper(fields).await,
            Entity::Project(fields) => self.ingest_project(fields).await,
            Entity::Discussion(fields) => self.ingest_discussion(fields).await,
            Entity::Citation { citing, cited } => {
                self.ingest_citation(&citing, &cited)?;
                Ok(citegraph_graph::ingest::paper_id(citing.trim()))
            }
        }
    }

    pub async fn ingest_paper(&self, fields: PaperFields) -> Result<String> {
        let (id, batch) = fields.to_batch()?;
        self.commit(&id, batch).await?;
        Ok(id)
    }

    pub async fn ingest_project(&self, fields: ProjectFields) -> Result<String> {
        let (id, batch) = fields.to_batch()?;
        self.commit(&id, batch).await?;
        Ok(id)
    }

    pub async fn ingest_discussion(&self, fields: DiscussionFields) -> Result<String> {
        let (id, batch) = fields.to_batch()?;
        self.commit(&id, batch).await?;
        Ok(id)
    }

    /// Record that `citing` cites `cited` (arXiv ids), creating placeholder papers.
    pub fn ingest_citation(&self, citing: &str, cited: &str) -> Result<()> {
        self.graph.apply(citation_batch(citing, cited)?)?;
        debug!(citing = %citing, cited = %cited, "Citation ingested");
        Ok(())
    }

    /// Ingest every entity, collecting failures instead of stopping at the first one.
    pub async fn ingest_batch(&self, entities: Vec<Entity>) -> BatchReport {
        let mut report = BatchReport::default();
        for (index, entity) in entities.into_iter().enumerate() {
            match self.ingest(entity).await {
                Ok(id) => report.succeeded.push(id),
                Err(e) => {
                    warn!(index, error = %e, "Skipping entity");
                    report.skipped.push(SkippedEntity {
                        index,
                        reason: e.to_string(),
                    });
                }
            }
        }
        info!(
            succeeded = report.succeeded.len(),
            skipped = report.skipped.len(),
            "Batch ingest complete"
        );
        report
    }

    async fn commit(&self, id: &str, batch: GraphBatch) -> Result<()> {
        self.graph.apply(batch)?;
        let node = self
            .graph
            .node(id)?
            .ok_or_else(|| CitegraphError::EntityNotFound(id.to_string()))?;
        self.mirror(&node).await?;
        debug!(id = %id, kind = %node.kind(), "Entity ingested");
        Ok(())
    }

    /// Upsert the node's text projection into the index, if it has one.
    async fn mirror(&self, node: &Node) -> Result<bool> {
        let Some(text) = node.attributes.text_projection() else {
            return Ok(false);
        };
        let document = Document::new(node.id.clone(), text).with_metadata(json!({
            "node_type": node.kind().as_str(),
            "title": node.attributes.label(),
        }));
        self.index.upsert(document).await?;
        Ok(true)
    }

    // =========================================================================
    // Retrieval
    // =========================================================================

    /// Select a retrieval method (or honor `hint`), run it, and return results with the
    /// recorded decision.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        hint: Option<RetrievalMethod>,
    ) -> Result<(Vec<RetrievalResult>, PolicyDecision)> {
        let (results, decision) = self.policy.retrieve(query, top_k, hint).await?;
        info!(
            query = %query,
            method = %decision.method,
            results = results.len(),
            "Retrieval complete"
        );
        Ok((results, decision))
    }

    /// Entities related to `id` by citations and shared concepts.
    ///
    /// Unlike traversals, an unknown id is an `EntityNotFound` error.
    pub fn related(&self, id: &str, top_k: usize) -> Result<Vec<(String, f64)>> {
        if !self.graph.contains(id) {
            return Err(CitegraphError::EntityNotFound(id.to_string()));
        }
        self.graph.related_entities(id, top_k)
    }

    pub fn stats(&self) -> Result<KnowledgeBaseStats> {
        Ok(KnowledgeBaseStats {
            graph: self.graph.stats()?,
            documents_indexed: self.index.len(),
            embeddings_enabled: self.index.has_embedder(),
            decisions: self.policy.decision_stats()?,
        })
    }

    pub fn citation_summary(&self) -> Result<CitationSummary> {
        CitationNetwork::new(&self.graph).summary()
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write the graph to a JSON file. The index is rebuilt from the graph on restore.
    pub fn persist(&self, path: &Path) -> Result<()> {
        persist::save(&self.graph, path)
    }

    /// Load a graph file into a new knowledge base and re-index every node with text.
    ///
    /// Returns only after indexing (including embedding, when an embedder is given) has
    /// finished.
    pub async fn restore(
        path: &Path,
        config: CitegraphConfig,
        embedder: Option<Arc<dyn DynEmbeddingService>>,
    ) -> Result<(Self, LoadReport)> {
        let (graph, report) = persist::load(path, ImportanceParams::from(&config.graph))?;
        let kb = Self::from_parts(config, graph, embedder);
        let mut indexed = 0usize;
        for node in kb.graph.nodes()? {
            if kb.mirror(&node).await? {
                indexed += 1;
            }
        }
        info!(
            path = %path.display(),
            nodes = kb.graph.node_count(),
            indexed,
            "Knowledge base restored"
        );
        Ok((kb, report))
    }
}
