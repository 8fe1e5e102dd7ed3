//! Research payloads and their translation into graph batches.
//!
//! Payload structs accept the JSON emitted by the research collectors. Numeric fields are
//! parsed leniently since collectors emit them as numbers or display strings.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use citegraph_core::error::{CitegraphError, Result};
use citegraph_core::types::{
    DiscussionAttributes, Edge, EdgeKind, NamedAttributes, Node, NodeAttributes, PaperAttributes,
    PaperCategory, ProjectAttributes,
};

use crate::store::GraphBatch;

// =============================================================================
// Node ids
// =============================================================================

/// Lowercase and join whitespace-separated words with `_`.
pub fn slugify(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

pub fn paper_id(arxiv_id: &str) -> String {
    format!("paper_{}", arxiv_id.trim())
}

pub fn author_id(name: &str) -> String {
    format!("author_{}", slugify(name))
}

pub fn concept_id(name: &str) -> String {
    format!("concept_{}", slugify(name))
}

pub fn framework_id(name: &str) -> String {
    format!("framework_{}", slugify(name))
}

pub fn project_id(name: &str) -> String {
    format!("project_{}", name.trim().replace('/', "_"))
}

/// `discussion_<platform>_<url slug>`; the scheme is dropped and every other
/// non-alphanumeric run becomes a single `_`.
pub fn discussion_id(platform: &str, url: &str) -> String {
    let url = url.trim();
    let without_scheme = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    let mut slug = String::with_capacity(without_scheme.len());
    for ch in without_scheme.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    format!(
        "discussion_{}_{}",
        slugify(platform),
        slug.trim_matches('_')
    )
}

// =============================================================================
// Payloads
// =============================================================================

/// An academic paper as produced by the paper collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperFields {
    #[serde(alias = "id")]
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(deserialize_with = "lenient_year")]
    pub year: Option<i32>,
    pub venue: Option<String>,
    #[serde(rename = "abstract", alias = "summary")]
    pub abstract_text: String,
    #[serde(deserialize_with = "lenient_count")]
    pub citation_count: u64,
    pub url: String,
    /// Citation-network role: `root`, `sota`, or `survey`.
    #[serde(rename = "type", alias = "category")]
    pub category: Option<String>,
    pub key_concepts: Vec<String>,
    /// arXiv ids of papers this paper cites.
    pub cites: Vec<String>,
    pub extra: BTreeMap<String, String>,
}

/// A source code repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectFields {
    /// `owner/repo`.
    #[serde(alias = "full_name")]
    pub name: String,
    pub description: String,
    #[serde(alias = "stars", deserialize_with = "lenient_string")]
    pub stars_display: String,
    pub language: String,
    pub license: String,
    pub url: String,
    pub framework_type: Option<String>,
    /// arXiv ids of papers this project implements.
    pub implements_papers: Vec<String>,
    pub extra: BTreeMap<String, String>,
}

/// A community discussion thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscussionFields {
    pub platform: String,
    pub title: String,
    pub url: String,
    pub consensus_level: String,
    #[serde(alias = "score", deserialize_with = "lenient_signed")]
    pub upvotes: i64,
    /// arXiv ids of papers mentioned in the thread.
    pub papers_discussed: Vec<String>,
    /// Project names (`owner/repo`) mentioned in the thread.
    pub projects_discussed: Vec<String>,
    pub extra: BTreeMap<String, String>,
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

fn lenient_year<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<i32>, D::Error> {
    Ok(numeric(&Value::deserialize(d)?).map(|v| v as i32))
}

fn lenient_count<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    Ok(numeric(&Value::deserialize(d)?)
        .filter(|v| *v > 0.0)
        .map(|v| v as u64)
        .unwrap_or(0))
}

fn lenient_signed<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<i64, D::Error> {
    Ok(numeric(&Value::deserialize(d)?).map(|v| v as i64).unwrap_or(0))
}

/// Parse one collector record, mapping shape errors to `MalformedDocument`.
pub fn parse_record<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| CitegraphError::MalformedDocument(e.to_string()))
}

fn non_empty(items: &[String]) -> impl Iterator<Item = &str> {
    items.iter().map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn placeholder_paper(arxiv_id: &str) -> Node {
    Node::new(
        paper_id(arxiv_id),
        NodeAttributes::Paper(PaperAttributes {
            arxiv_id: arxiv_id.to_string(),
            ..Default::default()
        }),
    )
}

fn placeholder_project(name: &str) -> Node {
    Node::new(
        project_id(name),
        NodeAttributes::Project(ProjectAttributes {
            name: name.to_string(),
            url: format!("https://github.com/{}", name),
            ..Default::default()
        }),
    )
}

// =============================================================================
// Batch builders
// =============================================================================

impl PaperFields {
    pub fn node_id(&self) -> Result<String> {
        let arxiv_id = self.arxiv_id.trim();
        if arxiv_id.is_empty() {
            return Err(CitegraphError::MalformedDocument(
                "paper is missing arxiv_id".to_string(),
            ));
        }
        Ok(paper_id(arxiv_id))
    }

    /// Paper node with author and concept nodes, `AuthoredBy`/`Introduces` edges, and a
    /// `Cites` edge (plus placeholder) for every cited id.
    pub fn to_batch(&self) -> Result<(String, GraphBatch)> {
        let id = self.node_id()?;
        let arxiv_id = self.arxiv_id.trim();
        let mut batch = GraphBatch::new();

        batch.node(Node::new(
            id.clone(),
            NodeAttributes::Paper(PaperAttributes {
                arxiv_id: arxiv_id.to_string(),
                title: self.title.clone(),
                authors: self.authors.clone(),
                year: self.year,
                venue: self.venue.clone(),
                abstract_text: self.abstract_text.clone(),
                citation_count: self.citation_count,
                url: self.url.clone(),
                category: self
                    .category
                    .as_deref()
                    .map(PaperCategory::parse_lenient)
                    .unwrap_or_default(),
                extra: self.extra.clone(),
            }),
        ));

        for author in non_empty(&self.authors) {
            let author_node = author_id(author);
            batch
                .node(Node::new(
                    author_node.clone(),
                    NodeAttributes::Author(NamedAttributes::new(author)),
                ))
                .edge(Edge::new(id.clone(), author_node, EdgeKind::AuthoredBy));
        }

        for concept in non_empty(&self.key_concepts) {
            let concept_node = concept_id(concept);
            batch
                .node(Node::new(
                    concept_node.clone(),
                    NodeAttributes::Concept(NamedAttributes::new(concept)),
                ))
                .edge(
                    Edge::new(id.clone(), concept_node, EdgeKind::Introduces)
                        .with_attribute("context", "paper discusses concept"),
                );
        }

        for cited in non_empty(&self.cites) {
            batch
                .placeholder(placeholder_paper(cited))
                .edge(Edge::new(id.clone(), paper_id(cited), EdgeKind::Cites));
        }

        Ok((id, batch))
    }
}

impl ProjectFields {
    pub fn node_id(&self) -> Result<String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(CitegraphError::MalformedDocument(
                "project is missing name".to_string(),
            ));
        }
        Ok(project_id(name))
    }

    /// Project node, optional framework node with `UsesFramework`, and `Implements` edges.
    pub fn to_batch(&self) -> Result<(String, GraphBatch)> {
        let id = self.node_id()?;
        let name = self.name.trim();
        let mut batch = GraphBatch::new();

        let url = if self.url.trim().is_empty() {
            format!("https://github.com/{}", name)
        } else {
            self.url.clone()
        };
        let framework = self
            .framework_type
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty());

        batch.node(Node::new(
            id.clone(),
            NodeAttributes::Project(ProjectAttributes {
                name: name.to_string(),
                description: self.description.clone(),
                stars: self.stars_display.clone(),
                language: self.language.clone(),
                license: self.license.clone(),
                url,
                framework_type: framework.map(str::to_string),
                extra: self.extra.clone(),
            }),
        ));

        if let Some(framework) = framework {
            let framework_node = framework_id(framework);
            batch
                .node(Node::new(
                    framework_node.clone(),
                    NodeAttributes::Framework(NamedAttributes::new(framework)),
                ))
                .edge(Edge::new(id.clone(), framework_node, EdgeKind::UsesFramework));
        }

        for paper in non_empty(&self.implements_papers) {
            batch
                .placeholder(placeholder_paper(paper))
                .edge(Edge::new(id.clone(), paper_id(paper), EdgeKind::Implements));
        }

        Ok((id, batch))
    }
}

impl DiscussionFields {
    pub fn node_id(&self) -> Result<String> {
        if self.url.trim().is_empty() {
            return Err(CitegraphError::MalformedDocument(
                "discussion is missing url".to_string(),
            ));
        }
        Ok(discussion_id(&self.platform, &self.url))
    }

    /// Discussion node with `Discusses` edges to every mentioned paper and project.
    pub fn to_batch(&self) -> Result<(String, GraphBatch)> {
        let id = self.node_id()?;
        let mut batch = GraphBatch::new();

        batch.node(Node::new(
            id.clone(),
            NodeAttributes::Discussion(DiscussionAttributes {
                platform: self.platform.trim().to_string(),
                title: self.title.clone(),
                url: self.url.trim().to_string(),
                consensus_level: self.consensus_level.clone(),
                upvotes: self.upvotes,
                extra: self.extra.clone(),
            }),
        ));

        for paper in non_empty(&self.papers_discussed) {
            batch
                .placeholder(placeholder_paper(paper))
                .edge(Edge::new(id.clone(), paper_id(paper), EdgeKind::Discusses));
        }
        for project in non_empty(&self.projects_discussed) {
            batch
                .placeholder(placeholder_project(project))
                .edge(Edge::new(id.clone(), project_id(project), EdgeKind::Discusses));
        }

        Ok((id, batch))
    }
}

/// A single `Cites` edge between two papers given by arXiv id, creating placeholders.
pub fn citation_batch(citing: &str, cited: &str) -> Result<GraphBatch> {
    let (citing, cited) = (citing.trim(), cited.trim());
    if citing.is_empty() || cited.is_empty() {
        return Err(CitegraphError::MalformedDocument(
            "citation requires both paper ids".to_string(),
        ));
    }
    let mut batch = GraphBatch::new();
    batch
        .placeholder(placeholder_paper(citing))
        .placeholder(placeholder_paper(cited))
        .edge(Edge::new(paper_id(citing), paper_id(cited), EdgeKind::Cites));
    Ok(batch)
}
