//! Citation-network views over the paper subgraph.

use std::collections::HashSet;

use serde::Serialize;

use citegraph_core::error::Result;
use citegraph_core::types::{EdgeKind, NodeAttributes, NodeKind, PaperCategory};

use crate::ingest::paper_id;
use crate::store::GraphStore;

const TOP_PAPERS: usize = 10;

/// A paper ranked by importance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedPaper {
    pub id: String,
    pub title: String,
    pub importance: f64,
}

/// Totals and the most important papers of the citation network.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitationSummary {
    pub total_papers: usize,
    pub total_citations: usize,
    pub root_papers: Vec<String>,
    pub survey_papers: Vec<String>,
    pub top_papers: Vec<RankedPaper>,
}

/// Borrowed view answering citation questions against a [`GraphStore`].
pub struct CitationNetwork<'a> {
    store: &'a GraphStore,
}

impl<'a> CitationNetwork<'a> {
    pub fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }

    /// Papers reachable from `paper` over `Cites`, depth-first pre-order, each visited once.
    ///
    /// `paper` may be a node id or a bare arXiv id. The start paper is depth 0; papers deeper
    /// than `max_depth` are not visited. Unknown papers yield an empty chain.
    pub fn citation_chain(&self, paper: &str, max_depth: usize) -> Result<Vec<String>> {
        let start = if self.store.contains(paper) {
            paper.to_string()
        } else {
            paper_id(paper)
        };
        if !self.store.contains(&start) {
            return Ok(Vec::new());
        }

        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(start, 0usize)];
        while let Some((current, depth)) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let next = if depth < max_depth {
                self.store.neighbors(&current, Some(EdgeKind::Cites), 1)?
            } else {
                Vec::new()
            };
            chain.push(current);
            for cited in next.into_iter().rev() {
                if !visited.contains(&cited) {
                    stack.push((cited, depth + 1));
                }
            }
        }
        Ok(chain)
    }

    /// Papers categorized as roots of citation chains, in insertion order.
    pub fn root_papers(&self) -> Result<Vec<String>> {
        self.papers_in(PaperCategory::Root)
    }

    /// Papers categorized as surveys, in insertion order.
    pub fn survey_papers(&self) -> Result<Vec<String>> {
        self.papers_in(PaperCategory::Survey)
    }

    fn papers_in(&self, category: PaperCategory) -> Result<Vec<String>> {
        Ok(self
            .store
            .nodes()?
            .into_iter()
            .filter(|node| {
                matches!(&node.attributes, NodeAttributes::Paper(p) if p.category == category)
            })
            .map(|node| node.id)
            .collect())
    }

    pub fn summary(&self) -> Result<CitationSummary> {
        let stats = self.store.stats()?;
        let ranked = self
            .store
            .ranked_by_importance(Some(NodeKind::Paper), TOP_PAPERS)?;
        let mut top_papers = Vec::with_capacity(ranked.len());
        for (id, importance) in ranked {
            let title = self
                .store
                .node(&id)?
                .map(|node| node.attributes.label().to_string())
                .unwrap_or_default();
            top_papers.push(RankedPaper {
                id,
                title,
                importance,
            });
        }

        Ok(CitationSummary {
            total_papers: stats
                .nodes_by_type
                .get(NodeKind::Paper.as_str())
                .copied()
                .unwrap_or(0),
            total_citations: stats
                .edges_by_type
                .get(EdgeKind::Cites.as_str())
                .copied()
                .unwrap_or(0),
            root_papers: self.root_papers()?,
            survey_papers: self.survey_papers()?,
            top_papers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{citation_batch, PaperFields};

    fn add_paper(store: &GraphStore, id: &str, category: &str, cites: &[&str]) {
        let paper = PaperFields {
            arxiv_id: id.to_string(),
            title: format!("Paper {}", id),
            category: Some(category.to_string()),
            cites: cites.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        };
        store.apply(paper.to_batch().unwrap().1).unwrap();
    }

    fn chain_store() -> GraphStore {
        let store = GraphStore::new();
        add_paper(&store, "root", "root", &[]);
        add_paper(&store, "mid", "sota", &["root"]);
        add_paper(&store, "side", "sota", &["root"]);
        add_paper(&store, "top", "survey", &["mid", "side"]);
        store
    }

    #[test]
    fn test_citation_chain_preorder() {
        let store = chain_store();
        let network = CitationNetwork::new(&store);
        assert_eq!(
            network.citation_chain("top", 3).unwrap(),
            vec!["paper_top", "paper_mid", "paper_root", "paper_side"]
        );
        assert_eq!(
            network.citation_chain("paper_top", 1).unwrap(),
            vec!["paper_top", "paper_mid", "paper_side"]
        );
        assert_eq!(network.citation_chain("top", 0).unwrap(), vec!["paper_top"]);
        assert!(network.citation_chain("absent", 3).unwrap().is_empty());
    }

    #[test]
    fn test_citation_chain_terminates_on_cycles() {
        let store = GraphStore::new();
        store.apply(citation_batch("a", "b").unwrap()).unwrap();
        store.apply(citation_batch("b", "a").unwrap()).unwrap();
        let network = CitationNetwork::new(&store);
        assert_eq!(network.citation_chain("a", 10).unwrap(), vec!["paper_a", "paper_b"]);
    }

    #[test]
    fn test_categories_and_summary() {
        let store = chain_store();
        let network = CitationNetwork::new(&store);
        assert_eq!(network.root_papers().unwrap(), vec!["paper_root"]);
        assert_eq!(network.survey_papers().unwrap(), vec!["paper_top"]);

        let summary = network.summary().unwrap();
        assert_eq!(summary.total_papers, 4);
        assert_eq!(summary.total_citations, 4);
        assert_eq!(summary.top_papers.len(), 4);
        assert_eq!(summary.top_papers[0].id, "paper_root");
        assert_eq!(summary.top_papers[0].title, "Paper root");
    }
}
