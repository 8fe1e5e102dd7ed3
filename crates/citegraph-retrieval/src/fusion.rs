//! Weighted Reciprocal Rank Fusion (RRF) of vector and graph result lists.
//!
//! Each list contributes `weight / (k + rank)` for every item it contains, so agreement
//! between lists is rewarded without comparing their raw scores.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Map, Value};

use citegraph_core::types::{HybridWeights, RetrievalMethod, RetrievalResult};

/// Standard RRF constant.
pub const DEFAULT_RRF_K: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RrfFusion {
    k: f64,
}

impl Default for RrfFusion {
    fn default() -> Self {
        Self::new(DEFAULT_RRF_K)
    }
}

impl RrfFusion {
    pub fn new(k: f64) -> Self {
        Self { k }
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    /// Fused score per id: `Σ weight / (k + rank)` over both lists.
    ///
    /// Only the first occurrence of an id within a list counts.
    pub fn fuse(
        &self,
        list_a: &[RetrievalResult],
        list_b: &[RetrievalResult],
        weight_a: f64,
        weight_b: f64,
    ) -> HashMap<String, f64> {
        let mut scores = HashMap::new();
        for (list, weight) in [(list_a, weight_a), (list_b, weight_b)] {
            for (id, rank) in first_ranks(list) {
                *scores.entry(id.to_string()).or_insert(0.0) += self.contribution(weight, rank);
            }
        }
        scores
    }

    fn contribution(&self, weight: f64, rank: usize) -> f64 {
        weight / (self.k + rank as f64)
    }

    /// Merge vector and graph results into at most `top_k` hybrid results.
    ///
    /// Ordered by fused score, ties by first appearance (vector list first). Content comes
    /// from the vector hit when non-empty, else from the graph hit.
    pub fn combine(
        &self,
        vector: &[RetrievalResult],
        graph: &[RetrievalResult],
        weights: HybridWeights,
        top_k: usize,
    ) -> Vec<RetrievalResult> {
        let fused = self.fuse(vector, graph, weights.vector_weight, weights.graph_weight);
        let vector_hits = first_hits(vector);
        let graph_hits = first_hits(graph);

        let mut seen: HashSet<&str> = HashSet::new();
        let mut order: Vec<&str> = Vec::new();
        for result in vector.iter().chain(graph.iter()) {
            if seen.insert(result.id.as_str()) {
                order.push(&result.id);
            }
        }

        let mut ranked: Vec<(usize, &str, f64)> = order
            .into_iter()
            .enumerate()
            .map(|(appearance, id)| (appearance, id, fused.get(id).copied().unwrap_or(0.0)))
            .collect();
        ranked.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.0.cmp(&b.0)));
        ranked.truncate(top_k);

        ranked
            .into_iter()
            .enumerate()
            .map(|(i, (_, id, score))| {
                let from_vector = vector_hits.get(id).copied();
                let from_graph = graph_hits.get(id).copied();
                let content = from_vector
                    .map(|r| r.content.as_str())
                    .filter(|c| !c.is_empty())
                    .or_else(|| from_graph.map(|r| r.content.as_str()))
                    .unwrap_or_default()
                    .to_string();

                let mut metadata = Map::new();
                for hit in [from_graph, from_vector].into_iter().flatten() {
                    if let Value::Object(extra) = &hit.metadata {
                        metadata.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
                    }
                }
                let mut sources = Vec::new();
                if from_vector.is_some() {
                    sources.push("vector");
                }
                if from_graph.is_some() {
                    sources.push("graph");
                }
                metadata.insert("rrf_score".to_string(), json!(score));
                metadata.insert("vector_rank".to_string(), json!(from_vector.map(|r| r.rank)));
                metadata.insert("vector_score".to_string(), json!(from_vector.map(|r| r.score)));
                metadata.insert("graph_rank".to_string(), json!(from_graph.map(|r| r.rank)));
                metadata.insert("graph_score".to_string(), json!(from_graph.map(|r| r.score)));
                metadata.insert("sources".to_string(), json!(sources));

                RetrievalResult {
                    id: id.to_string(),
                    content,
                    score,
                    method: RetrievalMethod::Hybrid,
                    rank: i + 1,
                    metadata: Value::Object(metadata),
                }
            })
            .collect()
    }
}

fn first_ranks(list: &[RetrievalResult]) -> Vec<(&str, usize)> {
    let mut seen = std::collections::HashSet::new();
    list.iter()
        .filter(|r| seen.insert(r.id.as_str()))
        .map(|r| (r.id.as_str(), r.rank))
        .collect()
}

fn first_hits(list: &[RetrievalResult]) -> HashMap<&str, &RetrievalResult> {
    let mut hits = HashMap::new();
    for result in list {
        hits.entry(result.id.as_str()).or_insert(result);
    }
    hits
}
