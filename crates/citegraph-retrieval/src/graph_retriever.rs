//! Graph-structural retrieval: concept lookup followed by citation expansion.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use citegraph_core::error::Result;
use citegraph_core::types::{EdgeKind, RetrievalMethod, RetrievalResult};
use citegraph_graph::ingest::{concept_id, paper_id};
use citegraph_graph::store::GraphStore;

const SEED_SCORE: f64 = 1.0;
const CITED_SCORE: f64 = 0.5;
const CITING_SCORE: f64 = 0.3;
const MAX_CITED_PER_CANDIDATE: usize = 3;

const STOP_WORDS: &[&str] = &[
    "about", "after", "also", "been", "being", "could", "does", "each", "from", "have", "into",
    "more", "most", "other", "over", "should", "some", "such", "than", "that", "their", "them",
    "then", "there", "these", "they", "this", "those", "through", "under", "very", "were", "what",
    "when", "where", "which", "while", "with", "would", "your",
];

/// Lowercased query tokens, trimmed of punctuation, longer than three characters and not
/// stop words. Order of first occurrence, no duplicates.
pub fn extract_concepts(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| w.chars().count() > 3 && !STOP_WORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

#[derive(Default)]
struct Candidate {
    score: f64,
    concepts: Vec<String>,
}

/// Retrieves entities by walking the knowledge graph.
#[derive(Debug, Clone)]
pub struct GraphRetriever {
    store: Arc<GraphStore>,
}

impl GraphRetriever {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    /// Rank graph entities for `query`.
    ///
    /// Seeds are entities introducing a query concept, plus nodes named directly by a
    /// token (`<token>` or `paper_<token>`); each match adds 1.0. Every further depth level
    /// expands the previous level's nodes: +0.5 for each of their three heaviest cited
    /// papers and +0.3 for every distinct node citing them. `search_depth` 1 means seeds
    /// only.
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        search_depth: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let concepts = extract_concepts(query);
        if concepts.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let mut candidates: HashMap<String, Candidate> = HashMap::new();
        let mut stage: Vec<String> = Vec::new();

        for concept in &concepts {
            let concept_node = concept_id(concept);
            for introducer in self
                .store
                .predecessors(&concept_node, Some(EdgeKind::Introduces))?
            {
                let entry = candidates.entry(introducer.clone()).or_default();
                if entry.score == 0.0 {
                    stage.push(introducer);
                }
                entry.score += SEED_SCORE;
                entry.concepts.push(concept.clone());
            }

            let direct = [concept.clone(), paper_id(concept)]
                .into_iter()
                .find(|id| self.store.contains(id));
            if let Some(id) = direct {
                let entry = candidates.entry(id.clone()).or_default();
                if entry.score == 0.0 {
                    stage.push(id);
                }
                entry.score += SEED_SCORE;
                entry.concepts.push(concept.clone());
            }
        }

        for _ in 1..search_depth.max(1) {
            if stage.is_empty() {
                break;
            }
            let mut next = Vec::new();
            for node in &stage {
                for cited in self.heaviest_citations(node)? {
                    let entry = candidates.entry(cited.clone()).or_default();
                    if entry.score == 0.0 {
                        next.push(cited);
                    }
                    entry.score += CITED_SCORE;
                }
                for citing in self.store.predecessors(node, Some(EdgeKind::Cites))? {
                    if citing == *node {
                        continue;
                    }
                    let entry = candidates.entry(citing.clone()).or_default();
                    if entry.score == 0.0 {
                        next.push(citing);
                    }
                    entry.score += CITING_SCORE;
                }
            }
            stage = next;
        }

        let mut ranked: Vec<(String, Candidate, usize)> = candidates
            .into_iter()
            .map(|(id, c)| {
                let position = self.store.position(&id).unwrap_or(usize::MAX);
                (id, c, position)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(a.2.cmp(&b.2)));
        ranked.truncate(top_k);

        let mut results = Vec::with_capacity(ranked.len());
        for (id, candidate, _) in ranked {
            let Some(node) = self.store.node(&id)? else {
                continue;
            };
            let content = node
                .attributes
                .text_projection()
                .unwrap_or_else(|| node.attributes.label().to_string());
            results.push(RetrievalResult {
                content,
                score: candidate.score,
                method: RetrievalMethod::Graph,
                rank: results.len() + 1,
                metadata: json!({
                    "search_depth": search_depth,
                    "concepts_matched": candidate.concepts,
                    "node_type": node.kind().as_str(),
                }),
                id,
            });
        }

        debug!(
            query = %query,
            concepts = concepts.len(),
            results = results.len(),
            "Graph search complete"
        );
        Ok(results)
    }

    /// Up to three distinct cited nodes, heaviest edge first (ties by edge order).
    fn heaviest_citations(&self, node: &str) -> Result<Vec<String>> {
        let mut targets: Vec<(String, f64)> = Vec::new();
        for edge in self.store.outgoing(node, Some(EdgeKind::Cites))? {
            if edge.target == node {
                continue;
            }
            match targets.iter_mut().find(|(id, _)| *id == edge.target) {
                Some((_, weight)) => *weight = weight.max(edge.weight),
                None => targets.push((edge.target, edge.weight)),
            }
        }
        targets.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(targets
            .into_iter()
            .take(MAX_CITED_PER_CANDIDATE)
            .map(|(id, _)| id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citegraph_graph::ingest::{citation_batch, PaperFields};

    fn add_paper(store: &GraphStore, id: &str, concepts: &[&str], cites: &[&str]) {
        let paper = PaperFields {
            arxiv_id: id.to_string(),
            title: format!("Paper {}", id),
            abstract_text: format!("Abstract of {}", id),
            key_concepts: concepts.iter().map(|c| c.to_string()).collect(),
            cites: cites.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        };
        store.apply(paper.to_batch().unwrap().1).unwrap();
    }

    #[test]
    fn test_extract_concepts() {
        assert_eq!(
            extract_concepts("Which papers cite 2506.12508? Papers about RAG!"),
            vec!["papers", "cite", "2506.12508"]
        );
        assert!(extract_concepts("what is it").is_empty());
    }

    #[test]
    fn test_concept_seeds_and_depth() {
        let store = Arc::new(GraphStore::new());
        add_paper(&store, "base", &[], &[]);
        add_paper(&store, "seed", &["orchestration"], &["base"]);
        add_paper(&store, "follower", &[], &["seed"]);
        let retriever = GraphRetriever::new(Arc::clone(&store));

        let shallow = retriever.search("agent orchestration", 10, 1).unwrap();
        assert_eq!(shallow.len(), 1);
        assert_eq!(shallow[0].id, "paper_seed");
        assert_eq!(shallow[0].score, 1.0);
        assert_eq!(shallow[0].method, RetrievalMethod::Graph);
        assert_eq!(shallow[0].metadata["concepts_matched"][0], "orchestration");
        assert_eq!(shallow[0].metadata["node_type"], "academic_paper");
        assert_eq!(shallow[0].content, "Paper seed Abstract of seed");

        let deep = retriever.search("agent orchestration", 10, 2).unwrap();
        let ids: Vec<&str> = deep.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["paper_seed", "paper_base", "paper_follower"]);
        assert_eq!(deep[1].score, 0.5);
        assert!((deep[2].score - 0.3).abs() < 1e-12);
        assert_eq!(deep[2].rank, 3);
        assert_eq!(deep[0].metadata["search_depth"], 2);
    }

    #[test]
    fn test_identifier_seed_reaches_citing_papers() {
        let store = Arc::new(GraphStore::new());
        for citing in ["a", "b", "c"] {
            store.apply(citation_batch(citing, "2506.12508").unwrap()).unwrap();
        }
        let retriever = GraphRetriever::new(store);
        let results = retriever.search("which papers cite 2506.12508?", 10, 2).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids[0], "paper_2506.12508");
        for citing in ["paper_a", "paper_b", "paper_c"] {
            assert!(ids.contains(&citing));
        }
    }

    #[test]
    fn test_expansion_caps_cited_papers_at_three() {
        let store = Arc::new(GraphStore::new());
        for id in ["c1", "c2", "c3", "c4"] {
            add_paper(&store, id, &[], &[]);
        }
        add_paper(&store, "hub", &["retrieval"], &["c1", "c2", "c3", "c4"]);
        let retriever = GraphRetriever::new(store);
        let results = retriever.search("retrieval", 10, 2).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["paper_hub", "paper_c1", "paper_c2", "paper_c3"]);
    }

    #[test]
    fn test_no_match_is_empty() {
        let retriever = GraphRetriever::new(Arc::new(GraphStore::new()));
        assert!(retriever.search("quantum chromodynamics", 5, 2).unwrap().is_empty());
        assert!(retriever.search("", 5, 2).unwrap().is_empty());
    }
}
