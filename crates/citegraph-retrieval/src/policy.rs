//! Per-query retrieval method selection and execution.
//!
//! Queries are classified by keyword rules (first match wins) unless the caller names a
//! method. Every decision is appended to an in-memory log that is never truncated here.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use citegraph_core::config::RetrievalConfig;
use citegraph_core::error::{CitegraphError, Result};
use citegraph_core::types::{HybridWeights, PolicyDecision, RetrievalMethod, RetrievalResult};
use citegraph_vector::index::EmbeddingIndex;

use crate::fusion::RrfFusion;
use crate::graph_retriever::GraphRetriever;

const RECENT_DECISIONS: usize = 10;

/// arXiv-style identifier such as `2506.12508` or `2401.04088v2`.
static ARXIV_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}\.\d{4,5}(v\d+)?\b").expect("Invalid arXiv id regex"));

const CITATION_TERMS: &[&str] = &["cite", "citation", "reference", "related to"];
const IDENTIFIER_TERMS: &[&str] = &["arxiv", "paper:", "doi:", "identifier:"];
const COMPARISON_TERMS: &[&str] = &["vs", "versus", "compare", "difference"];
const EXPLORATORY_TERMS: &[&str] = &["overview", "survey", "state of the art", "recent advances"];

/// Parse a caller-supplied method hint.
///
/// `vector`, `graph`, `hybrid` (any case) name a method; `auto`, `agentic`, and empty
/// strings mean no hint. Anything else is `InvalidInput`.
pub fn parse_method_hint(hint: &str) -> Result<Option<RetrievalMethod>> {
    let trimmed = hint.trim();
    match trimmed.to_lowercase().as_str() {
        "" | "auto" | "agentic" => Ok(None),
        other => RetrievalMethod::parse(other).map(Some).ok_or_else(|| {
            CitegraphError::InvalidInput(format!(
                "unknown retrieval method '{}', expected vector, graph, hybrid, or auto",
                trimmed
            ))
        }),
    }
}

/// Summary of the decision log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionStats {
    pub total_decisions: usize,
    pub method_distribution: BTreeMap<String, usize>,
    /// Up to ten most recent decisions, oldest first.
    pub recent: Vec<PolicyDecision>,
}

/// Tunables for executing a decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionSettings {
    pub min_score: f64,
    pub search_depth: usize,
    /// Hybrid retrieval fetches `top_k * candidate_multiplier` from each source.
    pub candidate_multiplier: usize,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            min_score: 0.0,
            search_depth: 2,
            candidate_multiplier: 2,
        }
    }
}

impl ExecutionSettings {
    pub fn from_config(retrieval: &RetrievalConfig, min_score: f64) -> Self {
        Self {
            min_score,
            search_depth: retrieval.search_depth.max(1),
            candidate_multiplier: retrieval.candidate_multiplier.max(1),
        }
    }
}

/// Chooses between vector, graph, and hybrid retrieval and runs the choice.
pub struct RetrievalPolicy {
    index: Arc<EmbeddingIndex>,
    graph: GraphRetriever,
    fusion: RrfFusion,
    settings: ExecutionSettings,
    log: Mutex<Vec<PolicyDecision>>,
}

impl std::fmt::Debug for RetrievalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalPolicy")
            .field("fusion", &self.fusion)
            .field("settings", &self.settings)
            .finish()
    }
}

impl RetrievalPolicy {
    pub fn new(
        index: Arc<EmbeddingIndex>,
        graph: GraphRetriever,
        fusion: RrfFusion,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            index,
            graph,
            fusion,
            settings,
            log: Mutex::new(Vec::new()),
        }
    }

    fn lock_log(&self) -> Result<MutexGuard<'_, Vec<PolicyDecision>>> {
        self.log
            .lock()
            .map_err(|e| CitegraphError::Storage(format!("Lock poisoned: {}", e)))
    }

    /// Classify a query without recording the decision.
    pub fn classify(&self, query: &str, hint: Option<RetrievalMethod>) -> PolicyDecision {
        let (method, weights, confidence, reasoning) = match hint {
            Some(method) => (
                method,
                (method == RetrievalMethod::Hybrid).then(HybridWeights::balanced),
                1.0,
                "caller override".to_string(),
            ),
            None => self.rule_for(query),
        };
        PolicyDecision {
            id: Uuid::new_v4(),
            query: query.to_string(),
            method,
            reasoning,
            weights,
            confidence,
            timestamp: Utc::now(),
        }
    }

    fn rule_for(&self, query: &str) -> (RetrievalMethod, Option<HybridWeights>, f64, String) {
        let lowered = query.to_lowercase();
        let contains_any = |terms: &[&str]| terms.iter().any(|t| lowered.contains(t));

        if contains_any(CITATION_TERMS) {
            return (
                RetrievalMethod::Graph,
                None,
                0.8,
                "query asks about citation relationships".to_string(),
            );
        }
        if contains_any(IDENTIFIER_TERMS) || ARXIV_ID.is_match(&lowered) {
            return (
                RetrievalMethod::Vector,
                None,
                0.9,
                "query names a specific paper identifier".to_string(),
            );
        }
        if contains_any(COMPARISON_TERMS) {
            return (
                RetrievalMethod::Hybrid,
                Some(HybridWeights::new(0.5, 0.5)),
                0.7,
                "comparison query needs similarity and structure".to_string(),
            );
        }
        if contains_any(EXPLORATORY_TERMS) {
            return (
                RetrievalMethod::Hybrid,
                Some(HybridWeights::new(0.4, 0.6)),
                0.75,
                "exploratory query favors graph structure".to_string(),
            );
        }
        (
            RetrievalMethod::Hybrid,
            Some(HybridWeights::balanced()),
            0.5,
            "no specific signal, balanced hybrid".to_string(),
        )
    }

    /// Classify a query and append the decision to the log.
    pub fn decide(&self, query: &str, hint: Option<RetrievalMethod>) -> Result<PolicyDecision> {
        let decision = self.classify(query, hint);
        self.lock_log()?.push(decision.clone());
        info!(
            decision_id = %decision.id,
            method = %decision.method,
            confidence = decision.confidence,
            reasoning = %decision.reasoning,
            "Retrieval method selected"
        );
        Ok(decision)
    }

    /// Run the retrieval path named by `decision`.
    pub async fn execute(
        &self,
        decision: &PolicyDecision,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let results = match decision.method {
            RetrievalMethod::Vector => {
                self.index
                    .search(query, top_k, self.settings.min_score)
                    .await?
            }
            RetrievalMethod::Graph => self.graph.search(query, top_k, self.settings.search_depth)?,
            RetrievalMethod::Hybrid => {
                let candidates = top_k.saturating_mul(self.settings.candidate_multiplier);
                let vector = self
                    .index
                    .search(query, candidates, self.settings.min_score)
                    .await?;
                let graph = self
                    .graph
                    .search(query, candidates, self.settings.search_depth)?;
                let weights = decision.weights.unwrap_or_else(HybridWeights::balanced);
                debug!(
                    vector = vector.len(),
                    graph = graph.len(),
                    "Fusing hybrid candidates"
                );
                self.fusion.combine(&vector, &graph, weights, top_k)
            }
        };
        Ok(results)
    }

    /// Decide, record, and execute in one call.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        hint: Option<RetrievalMethod>,
    ) -> Result<(Vec<RetrievalResult>, PolicyDecision)> {
        let decision = self.decide(query, hint)?;
        let results = self.execute(&decision, query, top_k).await?;
        Ok((results, decision))
    }

    /// Snapshot of every recorded decision, oldest first.
    pub fn decisions(&self) -> Result<Vec<PolicyDecision>> {
        Ok(self.lock_log()?.clone())
    }

    pub fn decision_stats(&self) -> Result<DecisionStats> {
        let log = self.lock_log()?;
        let mut method_distribution = BTreeMap::new();
        for decision in log.iter() {
            *method_distribution
                .entry(decision.method.to_string())
                .or_insert(0) += 1;
        }
        let start = log.len().saturating_sub(RECENT_DECISIONS);
        Ok(DecisionStats {
            total_decisions: log.len(),
            method_distribution,
            recent: log[start..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citegraph_graph::store::GraphStore;

    fn policy() -> RetrievalPolicy {
        RetrievalPolicy::new(
            Arc::new(EmbeddingIndex::new()),
            GraphRetriever::new(Arc::new(GraphStore::new())),
            RrfFusion::default(),
            ExecutionSettings::default(),
        )
    }

    #[test]
    fn test_parse_method_hint() {
        assert_eq!(parse_method_hint("Vector").unwrap(), Some(RetrievalMethod::Vector));
        assert_eq!(parse_method_hint(" hybrid ").unwrap(), Some(RetrievalMethod::Hybrid));
        assert_eq!(parse_method_hint("auto").unwrap(), None);
        assert_eq!(parse_method_hint("AGENTIC").unwrap(), None);
        assert_eq!(parse_method_hint("").unwrap(), None);
        assert!(matches!(
            parse_method_hint("keyword"),
            Err(CitegraphError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rules_in_priority_order() {
        let policy = policy();
        let cases: Vec<(&str, RetrievalMethod, Option<HybridWeights>, f64)> = vec![
            ("which papers cite 2506.12508?", RetrievalMethod::Graph, None, 0.8),
            ("work related to graph RAG", RetrievalMethod::Graph, None, 0.8),
            ("arxiv paper on agent memory", RetrievalMethod::Vector, None, 0.9),
            ("details of 2401.04088v2", RetrievalMethod::Vector, None, 0.9),
            ("doi:10.1145/3366423", RetrievalMethod::Vector, None, 0.9),
            (
                "LangGraph vs CrewAI architecture",
                RetrievalMethod::Hybrid,
                Some(HybridWeights::new(0.5, 0.5)),
                0.7,
            ),
            (
                "compare planners",
                RetrievalMethod::Hybrid,
                Some(HybridWeights::new(0.5, 0.5)),
                0.7,
            ),
            (
                "overview of multi-agent systems",
                RetrievalMethod::Hybrid,
                Some(HybridWeights::new(0.4, 0.6)),
                0.75,
            ),
            (
                "agent orchestration",
                RetrievalMethod::Hybrid,
                Some(HybridWeights::new(0.5, 0.5)),
                0.5,
            ),
        ];
        for (query, method, weights, confidence) in cases {
            let decision = policy.classify(query, None);
            assert_eq!(decision.method, method, "query: {}", query);
            assert_eq!(decision.weights, weights, "query: {}", query);
            assert!((decision.confidence - confidence).abs() < 1e-12, "query: {}", query);
        }
    }

    #[test]
    fn test_rules_match_substrings() {
        let decision = policy().classify("DevOps for agents", None);
        assert!((decision.confidence - 0.5).abs() < 1e-12);
        let decision = policy().classify("dev envs for agents", None);
        assert_eq!(decision.weights, Some(HybridWeights::new(0.5, 0.5)));
        assert!((decision.confidence - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_caller_override() {
        let policy = policy();
        let graph = policy.classify("which papers cite X", Some(RetrievalMethod::Vector));
        assert_eq!(graph.method, RetrievalMethod::Vector);
        assert_eq!(graph.confidence, 1.0);
        assert_eq!(graph.reasoning, "caller override");
        assert!(graph.weights.is_none());

        let hybrid = policy.classify("anything", Some(RetrievalMethod::Hybrid));
        assert_eq!(hybrid.weights, Some(HybridWeights::balanced()));
    }

    #[test]
    fn test_decision_log_and_stats() {
        let policy = policy();
        for i in 0..12 {
            policy.decide(&format!("query {}", i), None).unwrap();
        }
        policy.decide("who cites this", None).unwrap();

        let decisions = policy.decisions().unwrap();
        assert_eq!(decisions.len(), 13);
        assert_eq!(decisions[0].query, "query 0");

        let stats = policy.decision_stats().unwrap();
        assert_eq!(stats.total_decisions, 13);
        assert_eq!(stats.method_distribution["hybrid"], 12);
        assert_eq!(stats.method_distribution["graph"], 1);
        assert_eq!(stats.recent.len(), 10);
        assert_eq!(stats.recent.last().unwrap().query, "who cites this");
    }

    #[tokio::test]
    async fn test_retrieve_on_empty_stores() {
        let policy = policy();
        let (results, decision) = policy.retrieve("graph memory", 5, None).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(decision.method, RetrievalMethod::Hybrid);
        assert_eq!(policy.decisions().unwrap().len(), 1);
    }
}
