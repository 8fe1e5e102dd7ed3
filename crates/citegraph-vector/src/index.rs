//! In-memory document index with brute-force cosine similarity search.
//!
//! Documents keep their first insertion position, which breaks score ties. When no
//! embedding service is configured, or embedding the query fails, search degrades to
//! token overlap between the query and document content.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use citegraph_core::error::{CitegraphError, Result};
use citegraph_core::types::{Document, RetrievalMethod, RetrievalResult};

use crate::embedding::{DynEmbeddingService, EmbeddingService};

const COSINE_EPSILON: f64 = 1e-8;

#[derive(Debug)]
struct IndexedDocument {
    document: Document,
    tokens: HashSet<String>,
}

#[derive(Debug, Default)]
struct IndexInner {
    documents: Vec<IndexedDocument>,
    positions: HashMap<String, usize>,
}

/// Thread-safe document index.
pub struct EmbeddingIndex {
    inner: RwLock<IndexInner>,
    embedder: Option<Arc<dyn DynEmbeddingService>>,
}

impl std::fmt::Debug for EmbeddingIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingIndex")
            .field("documents", &self.len())
            .field("has_embedder", &self.has_embedder())
            .finish()
    }
}

impl EmbeddingIndex {
    /// Create an index without an embedding service; search uses token overlap.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(IndexInner::default()),
            embedder: None,
        }
    }

    /// Create an index backed by a concrete embedding service.
    pub fn with_embedder<E: EmbeddingService + 'static>(embedder: E) -> Self {
        Self::with_dyn(Some(Arc::new(embedder)))
    }

    /// Create an index from an optional type-erased embedding service.
    pub fn with_dyn(embedder: Option<Arc<dyn DynEmbeddingService>>) -> Self {
        Self {
            inner: RwLock::new(IndexInner::default()),
            embedder,
        }
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    pub fn embedder(&self) -> Option<Arc<dyn DynEmbeddingService>> {
        self.embedder.clone()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, IndexInner>> {
        self.inner
            .read()
            .map_err(|e| CitegraphError::Storage(format!("Lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, IndexInner>> {
        self.inner
            .write()
            .map_err(|e| CitegraphError::Storage(format!("Lock poisoned: {}", e)))
    }

    async fn try_embed(&self, text: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed_boxed(text).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(error = %e, "Embedding failed, storing without vector");
                None
            }
        }
    }

    /// Insert or replace a document.
    ///
    /// With an embedding service configured and no precomputed vector, the content is
    /// embedded before the write lock is taken. A failed embedding stores the document
    /// without a vector. Replacing a document keeps its original position.
    pub async fn upsert(&self, mut document: Document) -> Result<()> {
        if document.id.trim().is_empty() {
            return Err(CitegraphError::InvalidInput(
                "document id must not be empty".to_string(),
            ));
        }
        if document.embedding.is_none() && !document.content.trim().is_empty() {
            document.embedding = self.try_embed(&document.content).await;
        }

        let tokens = tokenize(&document.content);
        let mut inner = self.write()?;
        let id = document.id.clone();
        let has_vector = document.embedding.is_some();
        let entry = IndexedDocument { document, tokens };
        match inner.positions.get(&id).copied() {
            Some(pos) => inner.documents[pos] = entry,
            None => {
                let pos = inner.documents.len();
                inner.positions.insert(id.clone(), pos);
                inner.documents.push(entry);
            }
        }
        debug!(id = %id, has_vector, "Document indexed");
        Ok(())
    }

    /// Rank documents against `query`, best first, ranks starting at 1.
    ///
    /// Cosine similarity when an embedding service is available, otherwise token overlap
    /// (documents sharing no token with the query are not returned). Documents stored
    /// without a vector are always matched by token overlap. Only scores `>= min_score`
    /// are kept.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        min_score: f64,
    ) -> Result<Vec<RetrievalResult>> {
        if top_k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = match &self.embedder {
            Some(embedder) => match embedder.embed_boxed(query).await {
                Ok(vector) => Some(vector),
                Err(e) => {
                    warn!(error = %e, "Query embedding failed, falling back to token overlap");
                    None
                }
            },
            None => None,
        };

        let inner = self.read()?;
        let query_tokens = tokenize(query);
        let scored = match &query_vector {
            Some(q) => cosine_scores(&inner, q, &query_tokens),
            None => overlap_scores(&inner, &query_tokens)
                .into_iter()
                .map(|(pos, score)| (pos, score, Metric::TokenOverlap))
                .collect(),
        };

        let mut scored: Vec<(usize, f64, Metric)> = scored
            .into_iter()
            .filter(|(_, score, _)| *score >= min_score)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);
        let metric = if query_vector.is_some() {
            "cosine"
        } else {
            "token_overlap"
        };

        let results = scored
            .into_iter()
            .enumerate()
            .map(|(i, (pos, score, doc_metric))| {
                let doc = &inner.documents[pos].document;
                let mut metadata = metadata_object(&doc.metadata);
                metadata.insert(
                    "similarity_metric".to_string(),
                    Value::from(doc_metric.as_str()),
                );
                if doc_metric == Metric::TokenOverlap {
                    metadata.insert("embedding_unavailable".to_string(), Value::Bool(true));
                }
                RetrievalResult {
                    id: doc.id.clone(),
                    content: doc.content.clone(),
                    score,
                    method: RetrievalMethod::Vector,
                    rank: i + 1,
                    metadata: Value::Object(metadata),
                }
            })
            .collect::<Vec<_>>();

        debug!(
            query = %query,
            metric,
            results = results.len(),
            "Index search complete"
        );
        Ok(results)
    }

    /// Recompute vectors for every document. Returns how many now carry a vector.
    ///
    /// Embedding happens outside the lock; documents replaced or added meanwhile keep
    /// whatever their own upsert produced.
    pub async fn reembed_all(&self) -> Result<usize> {
        if self.embedder.is_none() {
            return Ok(0);
        }
        let snapshot: Vec<(String, String)> = self
            .read()?
            .documents
            .iter()
            .map(|d| (d.document.id.clone(), d.document.content.clone()))
            .collect();

        let mut computed = Vec::with_capacity(snapshot.len());
        for (id, content) in snapshot {
            if content.trim().is_empty() {
                continue;
            }
            if let Some(vector) = self.try_embed(&content).await {
                computed.push((id, content, vector));
            }
        }

        let mut inner = self.write()?;
        let mut updated = 0;
        for (id, content, vector) in computed {
            if let Some(pos) = inner.positions.get(&id).copied() {
                let entry = &mut inner.documents[pos].document;
                if entry.content == content {
                    entry.embedding = Some(vector);
                    updated += 1;
                }
            }
        }
        debug!(updated, "Re-embedded documents");
        Ok(updated)
    }

    pub fn get(&self, id: &str) -> Result<Option<Document>> {
        let inner = self.read()?;
        Ok(inner
            .positions
            .get(id)
            .map(|&pos| inner.documents[pos].document.clone()))
    }

    /// Return the number of documents currently stored in the index.
    pub fn len(&self) -> usize {
        self.read().map(|inner| inner.documents.len()).unwrap_or(0)
    }

    /// Return true if the index contains no documents.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EmbeddingIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn metadata_object(metadata: &Value) -> Map<String, Value> {
    match metadata {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Metric {
    Cosine,
    TokenOverlap,
}

impl Metric {
    fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::TokenOverlap => "token_overlap",
        }
    }
}

/// Cosine scores for documents with a vector of the query's dimension. Documents whose
/// embedding failed at upsert are scored by token overlap instead.
fn cosine_scores(
    inner: &IndexInner,
    query: &[f32],
    query_tokens: &HashSet<String>,
) -> Vec<(usize, f64, Metric)> {
    let denominator = query_tokens.len().max(1) as f64;
    inner
        .documents
        .iter()
        .enumerate()
        .filter_map(|(pos, d)| match d.document.embedding.as_deref() {
            Some(vector) => (vector.len() == query.len())
                .then(|| (pos, cosine_similarity(query, vector), Metric::Cosine)),
            None => {
                let shared = query_tokens.intersection(&d.tokens).count();
                (shared > 0).then(|| (pos, shared as f64 / denominator, Metric::TokenOverlap))
            }
        })
        .collect()
}

fn overlap_scores(inner: &IndexInner, query_tokens: &HashSet<String>) -> Vec<(usize, f64)> {
    let denominator = query_tokens.len().max(1) as f64;
    inner
        .documents
        .iter()
        .enumerate()
        .filter_map(|(pos, d)| {
            let shared = query_tokens.intersection(&d.tokens).count();
            (shared > 0).then(|| (pos, shared as f64 / denominator))
        })
        .collect()
}

/// Lowercased whitespace tokens with surrounding punctuation removed.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Cosine similarity `(a·b) / (|a||b| + 1e-8)`, clipped to [-1, 1].
///
/// Vectors of different length score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    (dot / (mag_a * mag_b + COSINE_EPSILON)).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbedding;
    use serde_json::json;

    /// Embeds text as counts over a fixed vocabulary so related texts score higher.
    struct VocabEmbedding;

    const VOCAB: [&str; 6] = ["agent", "orchestration", "graph", "memory", "vision", "speech"];

    impl EmbeddingService for VocabEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let tokens = tokenize(text);
            Ok(VOCAB
                .iter()
                .map(|w| if tokens.contains(*w) { 1.0 } else { 0.0 })
                .collect())
        }

        fn dimensions(&self) -> usize {
            VOCAB.len()
        }
    }

    struct OfflineEmbedding;

    impl EmbeddingService for OfflineEmbedding {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(CitegraphError::EmbeddingUnavailable("model offline".to_string()))
        }

        fn dimensions(&self) -> usize {
            384
        }
    }

    /// Fails for any text mentioning "timeout", otherwise embeds like `VocabEmbedding`.
    struct FlakyEmbedding;

    impl EmbeddingService for FlakyEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("timeout") {
                return Err(CitegraphError::EmbeddingUnavailable("request timed out".to_string()));
            }
            VocabEmbedding.embed(text).await
        }

        fn dimensions(&self) -> usize {
            VOCAB.len()
        }
    }

    #[test]
    fn test_cosine_similarity_bounds() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_tokenize_strips_punctuation() {
        let tokens = tokenize("Agent, orchestration! (LangGraph) --");
        assert_eq!(tokens.len(), 3);
        assert!(tokens.contains("agent"));
        assert!(tokens.contains("orchestration"));
        assert!(tokens.contains("langgraph"));
    }

    #[tokio::test]
    async fn test_token_overlap_fallback() {
        let index = EmbeddingIndex::new();
        index
            .upsert(Document::new("d1", "Patterns for agent orchestration at scale"))
            .await
            .unwrap();
        index
            .upsert(Document::new("d2", "Speech recognition benchmarks"))
            .await
            .unwrap();
        index
            .upsert(Document::new("d3", "A single agent loop"))
            .await
            .unwrap();

        let results = index.search("agent orchestration", 5, 0.0).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "d1");
        assert!((results[0].score - 1.0).abs() < 1e-9);
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[1].id, "d3");
        assert!((results[1].score - 0.5).abs() < 1e-9);
        assert_eq!(results[0].metadata["similarity_metric"], "token_overlap");
        assert_eq!(results[0].metadata["embedding_unavailable"], true);
    }

    #[tokio::test]
    async fn test_cosine_search_ranks_by_similarity() {
        let index = EmbeddingIndex::with_embedder(VocabEmbedding);
        index
            .upsert(Document::new("vision", "vision models").with_metadata(json!({"kind": "paper"})))
            .await
            .unwrap();
        index
            .upsert(Document::new("agents", "agent orchestration graph"))
            .await
            .unwrap();
        index
            .upsert(Document::new("memory", "agent memory"))
            .await
            .unwrap();

        let results = index.search("agent orchestration", 2, 0.0).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "agents");
        assert_eq!(results[1].id, "memory");
        assert!(results[0].score >= results[1].score);
        assert_eq!(results[0].metadata["similarity_metric"], "cosine");
        assert!(results[0].metadata.get("embedding_unavailable").is_none());

        let filtered = index.search("agent orchestration", 10, 0.5).await.unwrap();
        assert!(filtered.iter().all(|r| r.score >= 0.5));
        assert!(filtered.iter().all(|r| r.id != "vision"));
    }

    #[tokio::test]
    async fn test_ties_break_by_insertion_order() {
        let index = EmbeddingIndex::new();
        for id in ["c", "a", "b"] {
            index
                .upsert(Document::new(id, "graph memory"))
                .await
                .unwrap();
        }
        let ids: Vec<String> = index
            .search("graph", 3, 0.0)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_upsert_keeps_position_and_replaces_content() {
        let index = EmbeddingIndex::new();
        index.upsert(Document::new("a", "graph")).await.unwrap();
        index.upsert(Document::new("b", "graph")).await.unwrap();
        index
            .upsert(Document::new("a", "graph retrieval"))
            .await
            .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("a").unwrap().unwrap().content, "graph retrieval");

        let results = index.search("graph", 5, 0.0).await.unwrap();
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn test_failed_embedding_degrades() {
        let index = EmbeddingIndex::with_embedder(OfflineEmbedding);
        index
            .upsert(Document::new("d1", "agent orchestration"))
            .await
            .unwrap();
        assert!(index.get("d1").unwrap().unwrap().embedding.is_none());

        let results = index.search("agent orchestration", 5, 0.0).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata["similarity_metric"], "token_overlap");
        assert_eq!(results[0].metadata["embedding_unavailable"], true);
    }

    #[tokio::test]
    async fn test_document_without_vector_still_matches_by_tokens() {
        let index = EmbeddingIndex::with_embedder(FlakyEmbedding);
        index
            .upsert(Document::new("d1", "agent orchestration timeout paper"))
            .await
            .unwrap();
        index
            .upsert(Document::new("d2", "agent orchestration graph"))
            .await
            .unwrap();
        index
            .upsert(Document::new("d3", "speech timeout"))
            .await
            .unwrap();
        assert!(index.get("d1").unwrap().unwrap().embedding.is_none());
        assert!(index.get("d2").unwrap().unwrap().embedding.is_some());

        let results = index.search("agent orchestration", 5, 0.0).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2"]);
        assert!((results[0].score - 1.0).abs() < 1e-9);
        assert_eq!(results[0].metadata["similarity_metric"], "token_overlap");
        assert_eq!(results[0].metadata["embedding_unavailable"], true);
        assert_eq!(results[1].metadata["similarity_metric"], "cosine");
        assert!(results[1].metadata.get("embedding_unavailable").is_none());
    }

    #[tokio::test]
    async fn test_reembed_all() {
        let index = EmbeddingIndex::with_embedder(MockEmbedding::with_dimensions(32));
        index
            .upsert(Document {
                id: "d1".to_string(),
                content: "agent memory".to_string(),
                metadata: json!({}),
                embedding: Some(vec![0.0; 4]),
            })
            .await
            .unwrap();
        assert_eq!(index.reembed_all().await.unwrap(), 1);
        assert_eq!(
            index.get("d1").unwrap().unwrap().embedding.map(|v| v.len()),
            Some(32)
        );

        assert_eq!(EmbeddingIndex::new().reembed_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_inputs() {
        let index = EmbeddingIndex::new();
        assert!(index.is_empty());
        assert!(index.search("anything", 5, 0.0).await.unwrap().is_empty());
        index.upsert(Document::new("d", "anything")).await.unwrap();
        assert!(index.search("anything", 0, 0.0).await.unwrap().is_empty());
        assert!(index.search("   ", 5, 0.0).await.unwrap().is_empty());
        assert!(index.upsert(Document::new(" ", "x")).await.is_err());
    }
}
