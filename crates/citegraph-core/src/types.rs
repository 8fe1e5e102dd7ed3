use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// The kind of entity a graph node represents. Immutable once a node exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    /// Academic paper, keyed by its archival identifier.
    #[serde(rename = "academic_paper", alias = "paper")]
    Paper,
    /// Source code repository.
    #[serde(rename = "github_project", alias = "project")]
    Project,
    /// Community thread (forum, social site, mailing list).
    #[serde(rename = "community_discussion", alias = "discussion")]
    Discussion,
    /// Concept or technique introduced by a paper.
    #[serde(rename = "concept")]
    Concept,
    /// Paper author.
    #[serde(rename = "author")]
    Author,
    /// Software framework used by projects.
    #[serde(rename = "framework")]
    Framework,
}

impl NodeKind {
    /// Wire name used in the persisted graph file.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paper => "academic_paper",
            Self::Project => "github_project",
            Self::Discussion => "community_discussion",
            Self::Concept => "concept",
            Self::Author => "author",
            Self::Framework => "framework",
        }
    }

    /// Parse from the wire name or its short alias.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "academic_paper" | "paper" => Some(Self::Paper),
            "github_project" | "project" => Some(Self::Project),
            "community_discussion" | "discussion" => Some(Self::Discussion),
            "concept" => Some(Self::Concept),
            "author" => Some(Self::Author),
            "framework" => Some(Self::Framework),
            _ => None,
        }
    }

    pub fn all() -> &'static [NodeKind] {
        &[
            Self::Paper,
            Self::Project,
            Self::Discussion,
            Self::Concept,
            Self::Author,
            Self::Framework,
        ]
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The kind of a directed relationship between two nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Paper cites another paper.
    Cites,
    /// Project implements a paper.
    Implements,
    /// Discussion discusses a paper or project.
    Discusses,
    /// Paper authored by an author.
    AuthoredBy,
    /// Project uses a framework.
    UsesFramework,
    /// Paper introduces a concept.
    Introduces,
    /// Paper evaluates on a dataset.
    EvaluatesOn,
    /// Paper optimizes a metric.
    Optimizes,
    /// Semantic similarity.
    SimilarTo,
    /// Generic relatedness.
    RelatedTo,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cites => "cites",
            Self::Implements => "implements",
            Self::Discusses => "discusses",
            Self::AuthoredBy => "authored_by",
            Self::UsesFramework => "uses_framework",
            Self::Introduces => "introduces",
            Self::EvaluatesOn => "evaluates_on",
            Self::Optimizes => "optimizes",
            Self::SimilarTo => "similar_to",
            Self::RelatedTo => "related_to",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cites" => Some(Self::Cites),
            "implements" => Some(Self::Implements),
            "discusses" => Some(Self::Discusses),
            "authored_by" | "authoredby" => Some(Self::AuthoredBy),
            "uses_framework" | "usesframework" => Some(Self::UsesFramework),
            "introduces" => Some(Self::Introduces),
            "evaluates_on" | "evaluateson" => Some(Self::EvaluatesOn),
            "optimizes" => Some(Self::Optimizes),
            "similar_to" | "similarto" => Some(Self::SimilarTo),
            "related_to" | "relatedto" => Some(Self::RelatedTo),
            _ => None,
        }
    }

    pub fn all() -> &'static [EdgeKind] {
        &[
            Self::Cites,
            Self::Implements,
            Self::Discusses,
            Self::AuthoredBy,
            Self::UsesFramework,
            Self::Introduces,
            Self::EvaluatesOn,
            Self::Optimizes,
            Self::SimilarTo,
            Self::RelatedTo,
        ]
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role of a paper within its citation network.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperCategory {
    /// Foundational paper at the root of a citation chain.
    Root,
    /// State-of-the-art contribution (default).
    #[default]
    Sota,
    /// Survey or review paper.
    Survey,
}

impl PaperCategory {
    /// Lenient parse used by ingestion; unknown labels fall back to `Sota`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "root" => Self::Root,
            "survey" | "review" => Self::Survey,
            _ => Self::Sota,
        }
    }
}

/// Retrieval path that produced a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    /// Dense similarity search over the embedding index.
    Vector,
    /// Knowledge-graph traversal.
    Graph,
    /// Weighted reciprocal rank fusion of both.
    Hybrid,
}

impl RetrievalMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Graph => "graph",
            Self::Hybrid => "hybrid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "vector" => Some(Self::Vector),
            "graph" => Some(Self::Graph),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }
}

impl std::fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Node attributes
// =============================================================================

/// Attributes of an academic paper.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperAttributes {
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub citation_count: u64,
    pub url: String,
    #[serde(rename = "type_category", deserialize_with = "lenient_category")]
    pub category: PaperCategory,
    #[serde(flatten, deserialize_with = "extra_fields")]
    pub extra: BTreeMap<String, String>,
}

/// Attributes of a source code repository.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectAttributes {
    pub name: String,
    pub description: String,
    pub stars: String,
    pub language: String,
    pub license: String,
    pub url: String,
    pub framework_type: Option<String>,
    #[serde(flatten, deserialize_with = "extra_fields")]
    pub extra: BTreeMap<String, String>,
}

/// Attributes of a community discussion thread.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscussionAttributes {
    pub platform: String,
    pub title: String,
    pub url: String,
    pub consensus_level: String,
    pub upvotes: i64,
    #[serde(flatten, deserialize_with = "extra_fields")]
    pub extra: BTreeMap<String, String>,
}

/// Attributes shared by concept, author, and framework nodes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamedAttributes {
    pub name: String,
    #[serde(flatten, deserialize_with = "extra_fields")]
    pub extra: BTreeMap<String, String>,
}

impl NamedAttributes {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra: BTreeMap::new(),
        }
    }
}

fn lenient_category<'de, D: Deserializer<'de>>(d: D) -> Result<PaperCategory, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => PaperCategory::parse_lenient(&s),
        _ => PaperCategory::default(),
    })
}

/// Keys without a typed field, as text. `null` is dropped and non-string values keep
/// their JSON form. A nested `extra` object is merged in.
fn extra_fields<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, String>, D::Error> {
    Ok(text_map(BTreeMap::<String, Value>::deserialize(d)?))
}

fn lenient_text_map<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<BTreeMap<String, String>, D::Error> {
    Ok(text_map(
        Option::<BTreeMap<String, Value>>::deserialize(d)?.unwrap_or_default(),
    ))
}

fn text_map(raw: BTreeMap<String, Value>) -> BTreeMap<String, String> {
    fn insert(map: &mut BTreeMap<String, String>, key: String, value: Value) {
        match value {
            Value::Null => {}
            Value::String(s) => {
                map.insert(key, s);
            }
            other => {
                map.insert(key, other.to_string());
            }
        }
    }

    let mut map = BTreeMap::new();
    for (key, value) in raw {
        match value {
            Value::Object(nested) if key == "extra" => {
                for (k, v) in nested {
                    insert(&mut map, k, v);
                }
            }
            other => insert(&mut map, key, other),
        }
    }
    map
}

/// Kind-specific attribute bag. The variant determines the node's kind.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeAttributes {
    Paper(PaperAttributes),
    Project(ProjectAttributes),
    Discussion(DiscussionAttributes),
    Concept(NamedAttributes),
    Author(NamedAttributes),
    Framework(NamedAttributes),
}

impl NodeAttributes {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Paper(_) => NodeKind::Paper,
            Self::Project(_) => NodeKind::Project,
            Self::Discussion(_) => NodeKind::Discussion,
            Self::Concept(_) => NodeKind::Concept,
            Self::Author(_) => NodeKind::Author,
            Self::Framework(_) => NodeKind::Framework,
        }
    }

    /// Text mirrored into the embedding index for this entity.
    ///
    /// Only papers, projects, and discussions carry searchable prose; returns `None`
    /// for the other kinds and for entities whose text fields are all empty.
    pub fn text_projection(&self) -> Option<String> {
        let text = match self {
            Self::Paper(p) => join_nonempty(&[&p.title, &p.abstract_text]),
            Self::Project(p) => join_nonempty(&[&p.name, &p.description]),
            Self::Discussion(d) => join_nonempty(&[&d.title]),
            Self::Concept(_) | Self::Author(_) | Self::Framework(_) => String::new(),
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Short human-readable label (title or name).
    pub fn label(&self) -> &str {
        match self {
            Self::Paper(p) => &p.title,
            Self::Project(p) => &p.name,
            Self::Discussion(d) => &d.title,
            Self::Concept(n) | Self::Author(n) | Self::Framework(n) => &n.name,
        }
    }

    /// Overwrite typed fields with `newer` and merge its `extra` entries.
    ///
    /// Callers must check that both sides have the same kind; a mismatched variant is
    /// left untouched and `false` is returned.
    pub fn merge_from(&mut self, newer: NodeAttributes) -> bool {
        fn merge_extra(old: &mut BTreeMap<String, String>, new: &mut BTreeMap<String, String>) {
            let mut merged = std::mem::take(old);
            merged.append(new);
            *new = merged;
        }

        match (self, newer) {
            (Self::Paper(old), Self::Paper(mut new)) => {
                merge_extra(&mut old.extra, &mut new.extra);
                *old = new;
            }
            (Self::Project(old), Self::Project(mut new)) => {
                merge_extra(&mut old.extra, &mut new.extra);
                *old = new;
            }
            (Self::Discussion(old), Self::Discussion(mut new)) => {
                merge_extra(&mut old.extra, &mut new.extra);
                *old = new;
            }
            (Self::Concept(old), Self::Concept(mut new))
            | (Self::Author(old), Self::Author(mut new))
            | (Self::Framework(old), Self::Framework(mut new)) => {
                merge_extra(&mut old.extra, &mut new.extra);
                *old = new;
            }
            _ => return false,
        }
        true
    }

    /// Serialize the attribute bag as a JSON object.
    pub fn to_value(&self) -> Value {
        let value = match self {
            Self::Paper(p) => serde_json::to_value(p),
            Self::Project(p) => serde_json::to_value(p),
            Self::Discussion(d) => serde_json::to_value(d),
            Self::Concept(n) | Self::Author(n) | Self::Framework(n) => serde_json::to_value(n),
        };
        value.unwrap_or(Value::Null)
    }

    /// Parse an attribute bag for the given kind. `null` yields default attributes, and
    /// `null`-valued keys read as the field's default.
    pub fn from_value(kind: NodeKind, value: Value) -> Result<Self, serde_json::Error> {
        let value = match value {
            Value::Null => Value::Object(serde_json::Map::new()),
            Value::Object(mut map) => {
                map.retain(|_, v| !v.is_null());
                Value::Object(map)
            }
            other => other,
        };
        Ok(match kind {
            NodeKind::Paper => Self::Paper(serde_json::from_value(value)?),
            NodeKind::Project => Self::Project(serde_json::from_value(value)?),
            NodeKind::Discussion => Self::Discussion(serde_json::from_value(value)?),
            NodeKind::Concept => Self::Concept(serde_json::from_value(value)?),
            NodeKind::Author => Self::Author(serde_json::from_value(value)?),
            NodeKind::Framework => Self::Framework(serde_json::from_value(value)?),
        })
    }
}

fn join_nonempty(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// Graph structs
// =============================================================================

/// A node in the knowledge graph.
///
/// Serialized as `{id, type, attributes}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NodeRecord", into = "NodeRecord")]
pub struct Node {
    pub id: String,
    pub attributes: NodeAttributes,
}

impl Node {
    pub fn new(id: impl Into<String>, attributes: NodeAttributes) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.attributes.kind()
    }
}

#[derive(Serialize, Deserialize)]
struct NodeRecord {
    id: String,
    #[serde(rename = "type")]
    kind: NodeKind,
    #[serde(default)]
    attributes: Value,
}

impl TryFrom<NodeRecord> for Node {
    type Error = String;

    fn try_from(record: NodeRecord) -> Result<Self, Self::Error> {
        if record.id.trim().is_empty() {
            return Err("node id must not be empty".to_string());
        }
        let attributes = NodeAttributes::from_value(record.kind, record.attributes)
            .map_err(|e| format!("attributes of {}: {}", record.id, e))?;
        Ok(Node {
            id: record.id,
            attributes,
        })
    }
}

impl From<Node> for NodeRecord {
    fn from(node: Node) -> Self {
        NodeRecord {
            kind: node.kind(),
            attributes: node.attributes.to_value(),
            id: node.id,
        }
    }
}

fn default_weight() -> f64 {
    1.0
}

/// A directed, typed, weighted edge. Immutable once added to a store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    #[serde(default, deserialize_with = "lenient_text_map")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl Edge {
    /// Create an edge with weight 1.0 and no attributes.
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            attributes: BTreeMap::new(),
            weight: default_weight(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// Retrieval structs
// =============================================================================

/// A text document held by the embedding index. `id` matches the graph node id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: Value::Object(serde_json::Map::new()),
            embedding: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A ranked hit returned by every retrieval path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub id: String,
    pub content: String,
    pub score: f64,
    pub method: RetrievalMethod,
    /// 1-based, dense within one result list.
    pub rank: usize,
    pub metadata: Value,
}

/// Per-source weights for a hybrid retrieval.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    pub vector_weight: f64,
    pub graph_weight: f64,
}

impl HybridWeights {
    pub fn new(vector_weight: f64, graph_weight: f64) -> Self {
        Self {
            vector_weight,
            graph_weight,
        }
    }

    pub fn balanced() -> Self {
        Self::new(0.5, 0.5)
    }
}

/// One retrieval-method decision, appended to the policy's decision log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub id: Uuid,
    pub query: String,
    pub method: RetrievalMethod,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<HybridWeights>,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}
