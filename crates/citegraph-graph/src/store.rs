//! In-memory directed multigraph with typed nodes and weighted, typed edges.
//!
//! Nodes and edges live in insertion-ordered vectors with per-node adjacency lists of edge
//! indices, so every traversal is deterministic. All state sits behind one `RwLock`; reads run
//! concurrently and each mutation is applied atomically under the write lock.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::debug;

use citegraph_core::config::GraphConfig;
use citegraph_core::error::{CitegraphError, Result};
use citegraph_core::types::{Edge, EdgeKind, Node, NodeKind};

/// PageRank parameters used by [`GraphStore::importance`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportanceParams {
    pub damping: f64,
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for ImportanceParams {
    fn default() -> Self {
        Self {
            damping: 0.85,
            tolerance: 1e-6,
            max_iterations: 100,
        }
    }
}

impl From<&GraphConfig> for ImportanceParams {
    fn from(config: &GraphConfig) -> Self {
        Self {
            damping: config.damping,
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
        }
    }
}

/// A set of mutations applied atomically by [`GraphStore::apply`].
///
/// `nodes` are upserted, `placeholders` are inserted only when their id is absent, and
/// `edges` are appended last. Edges may reference nodes created earlier in the same batch.
#[derive(Debug, Clone, Default)]
pub struct GraphBatch {
    pub nodes: Vec<Node>,
    pub placeholders: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl GraphBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&mut self, node: Node) -> &mut Self {
        self.nodes.push(node);
        self
    }

    pub fn placeholder(&mut self, node: Node) -> &mut Self {
        self.placeholders.push(node);
        self
    }

    pub fn edge(&mut self, edge: Edge) -> &mut Self {
        self.edges.push(edge);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.placeholders.is_empty() && self.edges.is_empty()
    }
}

/// Node and edge counts, broken down by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub nodes_by_type: BTreeMap<String, usize>,
    pub edges_by_type: BTreeMap<String, usize>,
}

#[derive(Debug, Default)]
struct GraphInner {
    nodes: Vec<Node>,
    positions: HashMap<String, usize>,
    edges: Vec<Edge>,
    /// Per node, indices into `edges` in insertion order.
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
    /// Bumped on every successful mutation; keys the importance cache.
    generation: u64,
}

impl GraphInner {
    fn index_of(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    fn kind_of(&self, id: &str) -> Option<NodeKind> {
        self.index_of(id).map(|idx| self.nodes[idx].kind())
    }

    fn insert_new(&mut self, node: Node) {
        let idx = self.nodes.len();
        self.positions.insert(node.id.clone(), idx);
        self.nodes.push(node);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
    }

    fn upsert(&mut self, node: Node) -> Result<bool> {
        match self.index_of(&node.id) {
            Some(idx) => {
                let existing = &mut self.nodes[idx];
                ensure_same_kind(existing, &node)?;
                existing.attributes.merge_from(node.attributes);
                Ok(false)
            }
            None => {
                self.insert_new(node);
                Ok(true)
            }
        }
    }

    fn insert_if_absent(&mut self, node: Node) -> Result<bool> {
        match self.index_of(&node.id) {
            Some(idx) => {
                ensure_same_kind(&self.nodes[idx], &node)?;
                Ok(false)
            }
            None => {
                self.insert_new(node);
                Ok(true)
            }
        }
    }

    /// Append an edge whose endpoints and weight were already validated.
    fn push_edge(&mut self, edge: Edge) {
        let (Some(src), Some(dst)) = (self.index_of(&edge.source), self.index_of(&edge.target))
        else {
            return;
        };
        let edge_idx = self.edges.len();
        self.edges.push(edge);
        self.outgoing[src].push(edge_idx);
        self.incoming[dst].push(edge_idx);
    }

    fn outgoing_edges(&self, idx: usize, kind: Option<EdgeKind>) -> impl Iterator<Item = &Edge> {
        self.outgoing[idx]
            .iter()
            .map(|&e| &self.edges[e])
            .filter(move |e| kind.map_or(true, |k| e.kind == k))
    }

    fn incoming_edges(&self, idx: usize, kind: Option<EdgeKind>) -> impl Iterator<Item = &Edge> {
        self.incoming[idx]
            .iter()
            .map(|&e| &self.edges[e])
            .filter(move |e| kind.map_or(true, |k| e.kind == k))
    }

    /// Distinct targets of outgoing edges, in edge insertion order.
    fn successors(&self, idx: usize, kind: Option<EdgeKind>) -> Vec<usize> {
        let mut seen = HashSet::new();
        self.outgoing_edges(idx, kind)
            .filter_map(|e| self.index_of(&e.target))
            .filter(|t| seen.insert(*t))
            .collect()
    }

    /// Distinct sources of incoming edges, in edge insertion order.
    fn predecessors(&self, idx: usize, kind: Option<EdgeKind>) -> Vec<usize> {
        let mut seen = HashSet::new();
        self.incoming_edges(idx, kind)
            .filter_map(|e| self.index_of(&e.source))
            .filter(|s| seen.insert(*s))
            .collect()
    }
}

fn ensure_same_kind(existing: &Node, incoming: &Node) -> Result<()> {
    if existing.kind() != incoming.kind() {
        return Err(CitegraphError::KindConflict {
            id: incoming.id.clone(),
            existing: existing.kind().to_string(),
            attempted: incoming.kind().to_string(),
        });
    }
    Ok(())
}

fn validate_node_id(node: &Node) -> Result<()> {
    if node.id.trim().is_empty() {
        return Err(CitegraphError::InvalidInput(
            "node id must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_weight(weight: f64) -> Result<()> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(CitegraphError::InvalidWeight(weight));
    }
    Ok(())
}

fn missing_endpoint(edge: &Edge, missing: &str) -> CitegraphError {
    CitegraphError::InvalidReference {
        from: edge.source.clone(),
        to: edge.target.clone(),
        missing: missing.to_string(),
    }
}

/// Thread-safe knowledge graph store.
#[derive(Debug)]
pub struct GraphStore {
    inner: RwLock<GraphInner>,
    importance_cache: Mutex<Option<(u64, Arc<Vec<f64>>)>>,
    params: ImportanceParams,
}

impl GraphStore {
    /// Create an empty store with default PageRank parameters.
    pub fn new() -> Self {
        Self::with_params(ImportanceParams::default())
    }

    pub fn with_params(params: ImportanceParams) -> Self {
        Self {
            inner: RwLock::new(GraphInner::default()),
            importance_cache: Mutex::new(None),
            params,
        }
    }

    pub fn params(&self) -> ImportanceParams {
        self.params
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, GraphInner>> {
        self.inner
            .read()
            .map_err(|e| CitegraphError::Storage(format!("Lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, GraphInner>> {
        self.inner
            .write()
            .map_err(|e| CitegraphError::Storage(format!("Lock poisoned: {}", e)))
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Insert a node or merge its attributes into the existing node with the same id.
    ///
    /// Returns `true` when a new node was created.
    pub fn add_node(&self, node: Node) -> Result<bool> {
        validate_node_id(&node)?;
        let mut inner = self.write()?;
        let id = node.id.clone();
        let inserted = inner.upsert(node)?;
        inner.generation += 1;
        debug!(id = %id, inserted, "Node upserted");
        Ok(inserted)
    }

    /// Insert a node only if its id is absent. Returns `true` when it was inserted.
    pub fn ensure_node(&self, node: Node) -> Result<bool> {
        validate_node_id(&node)?;
        let mut inner = self.write()?;
        let inserted = inner.insert_if_absent(node)?;
        if inserted {
            inner.generation += 1;
        }
        Ok(inserted)
    }

    /// Append a directed edge. Parallel edges are kept.
    pub fn add_edge(&self, edge: Edge) -> Result<()> {
        validate_weight(edge.weight)?;
        let mut inner = self.write()?;
        if inner.index_of(&edge.source).is_none() {
            return Err(missing_endpoint(&edge, &edge.source));
        }
        if inner.index_of(&edge.target).is_none() {
            return Err(missing_endpoint(&edge, &edge.target));
        }
        debug!(source = %edge.source, target = %edge.target, kind = %edge.kind, "Edge added");
        inner.push_edge(edge);
        inner.generation += 1;
        Ok(())
    }

    /// Apply a batch under a single write lock.
    ///
    /// Every node and edge is validated against the post-batch node set first; on any
    /// violation the store is left untouched.
    pub fn apply(&self, batch: GraphBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut inner = self.write()?;

        {
            let mut staged: HashMap<&str, NodeKind> = HashMap::new();
            for node in batch.nodes.iter().chain(batch.placeholders.iter()) {
                validate_node_id(node)?;
                let known = inner
                    .kind_of(&node.id)
                    .or_else(|| staged.get(node.id.as_str()).copied());
                match known {
                    Some(kind) if kind != node.kind() => {
                        return Err(CitegraphError::KindConflict {
                            id: node.id.clone(),
                            existing: kind.to_string(),
                            attempted: node.kind().to_string(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        staged.insert(node.id.as_str(), node.kind());
                    }
                }
            }

            let exists = |id: &str| inner.index_of(id).is_some() || staged.contains_key(id);
            for edge in &batch.edges {
                validate_weight(edge.weight)?;
                if !exists(&edge.source) {
                    return Err(missing_endpoint(edge, &edge.source));
                }
                if !exists(&edge.target) {
                    return Err(missing_endpoint(edge, &edge.target));
                }
            }
        }

        let node_count = batch.nodes.len();
        let edge_count = batch.edges.len();
        let mut created = 0usize;
        for node in batch.nodes {
            if inner.upsert(node)? {
                created += 1;
            }
        }
        for node in batch.placeholders {
            if inner.insert_if_absent(node)? {
                created += 1;
            }
        }
        for edge in batch.edges {
            inner.push_edge(edge);
        }
        inner.generation += 1;

        debug!(
            nodes = node_count,
            created,
            edges = edge_count,
            "Graph batch applied"
        );
        Ok(())
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn node(&self, id: &str) -> Result<Option<Node>> {
        let inner = self.read()?;
        Ok(inner.index_of(id).map(|idx| inner.nodes[idx].clone()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read()
            .map(|inner| inner.index_of(id).is_some())
            .unwrap_or(false)
    }

    /// Insertion position of a node, used for deterministic tie-breaking.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.read().ok().and_then(|inner| inner.index_of(id))
    }

    pub fn node_count(&self) -> usize {
        self.read().map(|inner| inner.nodes.len()).unwrap_or(0)
    }

    pub fn edge_count(&self) -> usize {
        self.read().map(|inner| inner.edges.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.node_count() == 0
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> Result<Vec<Node>> {
        Ok(self.read()?.nodes.clone())
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> Result<Vec<Edge>> {
        Ok(self.read()?.edges.clone())
    }

    /// Outgoing edges of a node, optionally filtered by kind. Unknown ids yield nothing.
    pub fn outgoing(&self, id: &str, kind: Option<EdgeKind>) -> Result<Vec<Edge>> {
        let inner = self.read()?;
        Ok(match inner.index_of(id) {
            Some(idx) => inner.outgoing_edges(idx, kind).cloned().collect(),
            None => Vec::new(),
        })
    }

    pub fn stats(&self) -> Result<GraphStats> {
        let inner = self.read()?;
        let mut stats = GraphStats {
            total_nodes: inner.nodes.len(),
            total_edges: inner.edges.len(),
            ..Default::default()
        };
        for node in &inner.nodes {
            *stats
                .nodes_by_type
                .entry(node.kind().to_string())
                .or_insert(0) += 1;
        }
        for edge in &inner.edges {
            *stats
                .edges_by_type
                .entry(edge.kind.to_string())
                .or_insert(0) += 1;
        }
        Ok(stats)
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Nodes reachable from `id` in at most `max_depth` steps along outgoing edges.
    ///
    /// Returned in discovery order without duplicates. The start node is included only when
    /// it is reachable from itself. Unknown ids and `max_depth == 0` yield an empty list.
    pub fn neighbors(
        &self,
        id: &str,
        kind: Option<EdgeKind>,
        max_depth: usize,
    ) -> Result<Vec<String>> {
        let inner = self.read()?;
        let Some(start) = inner.index_of(id) else {
            return Ok(Vec::new());
        };

        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut frontier = vec![start];
        for _ in 0..max_depth {
            let mut next = Vec::new();
            for &current in &frontier {
                for target in inner.successors(current, kind) {
                    if seen.insert(target) {
                        found.push(target);
                        next.push(target);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        Ok(found
            .into_iter()
            .map(|idx| inner.nodes[idx].id.clone())
            .collect())
    }

    /// Distinct sources of edges pointing at `id`, in edge insertion order.
    pub fn predecessors(&self, id: &str, kind: Option<EdgeKind>) -> Result<Vec<String>> {
        let inner = self.read()?;
        Ok(match inner.index_of(id) {
            Some(idx) => inner
                .predecessors(idx, kind)
                .into_iter()
                .map(|p| inner.nodes[p].id.clone())
                .collect(),
            None => Vec::new(),
        })
    }

    /// Fewest-edge directed path from `source` to `target`, inclusive of both ends.
    ///
    /// Empty when either node is unknown or `target` is unreachable.
    pub fn shortest_path(&self, source: &str, target: &str) -> Result<Vec<String>> {
        let inner = self.read()?;
        let (Some(src), Some(dst)) = (inner.index_of(source), inner.index_of(target)) else {
            return Ok(Vec::new());
        };
        if src == dst {
            return Ok(vec![inner.nodes[src].id.clone()]);
        }

        let mut parent: HashMap<usize, usize> = HashMap::new();
        let mut queue = VecDeque::from([src]);
        let mut visited = HashSet::from([src]);
        while let Some(current) = queue.pop_front() {
            for next in inner.successors(current, None) {
                if !visited.insert(next) {
                    continue;
                }
                parent.insert(next, current);
                if next == dst {
                    let mut path = vec![dst];
                    let mut cursor = dst;
                    while let Some(&prev) = parent.get(&cursor) {
                        path.push(prev);
                        cursor = prev;
                    }
                    path.reverse();
                    return Ok(path
                        .into_iter()
                        .map(|idx| inner.nodes[idx].id.clone())
                        .collect());
                }
                queue.push_back(next);
            }
        }
        Ok(Vec::new())
    }

    // =========================================================================
    // Scoring
    // =========================================================================

    /// Weighted PageRank over all nodes. Scores sum to 1 for a non-empty graph.
    ///
    /// Cached until the next successful mutation.
    pub fn importance(&self) -> Result<HashMap<String, f64>> {
        let inner = self.read()?;
        let scores = self.cached_importance(&inner)?;
        Ok(inner
            .nodes
            .iter()
            .zip(scores.iter())
            .map(|(node, score)| (node.id.clone(), *score))
            .collect())
    }

    /// Nodes ordered by importance descending (ties by insertion order), optionally
    /// restricted to one kind.
    pub fn ranked_by_importance(
        &self,
        kind: Option<NodeKind>,
        limit: usize,
    ) -> Result<Vec<(String, f64)>> {
        let inner = self.read()?;
        let scores = self.cached_importance(&inner)?;
        let mut ranked: Vec<(usize, f64)> = scores
            .iter()
            .enumerate()
            .filter(|(idx, _)| kind.map_or(true, |k| inner.nodes[*idx].kind() == k))
            .map(|(idx, score)| (idx, *score))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(limit);
        Ok(ranked
            .into_iter()
            .map(|(idx, score)| (inner.nodes[idx].id.clone(), score))
            .collect())
    }

    fn cached_importance(&self, inner: &GraphInner) -> Result<Arc<Vec<f64>>> {
        let mut cache = self
            .importance_cache
            .lock()
            .map_err(|e| CitegraphError::Storage(format!("Lock poisoned: {}", e)))?;
        if let Some((generation, scores)) = cache.as_ref() {
            if *generation == inner.generation {
                return Ok(Arc::clone(scores));
            }
        }
        let scores = Arc::new(compute_importance(inner, &self.params));
        debug!(
            nodes = inner.nodes.len(),
            generation = inner.generation,
            "Importance recomputed"
        );
        *cache = Some((inner.generation, Arc::clone(&scores)));
        Ok(scores)
    }

    /// Entities related to `id`, scored by citations and shared concepts.
    ///
    /// +1.0 for every distinct node `id` cites; +0.5 per shared concept for each other node
    /// of the same kind that introduces a concept `id` introduces. The scores are an
    /// uncalibrated heuristic and grow with node degree.
    pub fn related_entities(&self, id: &str, top_k: usize) -> Result<Vec<(String, f64)>> {
        let inner = self.read()?;
        let Some(source) = inner.index_of(id) else {
            return Ok(Vec::new());
        };
        let source_kind = inner.nodes[source].kind();

        let mut scores: HashMap<usize, f64> = HashMap::new();
        for cited in inner.successors(source, Some(EdgeKind::Cites)) {
            if cited != source {
                *scores.entry(cited).or_insert(0.0) += 1.0;
            }
        }
        for concept in inner.successors(source, Some(EdgeKind::Introduces)) {
            for peer in inner.predecessors(concept, Some(EdgeKind::Introduces)) {
                if peer != source && inner.nodes[peer].kind() == source_kind {
                    *scores.entry(peer).or_insert(0.0) += 0.5;
                }
            }
        }

        let mut ranked: Vec<(usize, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(top_k);
        Ok(ranked
            .into_iter()
            .map(|(idx, score)| (inner.nodes[idx].id.clone(), score))
            .collect())
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Power-iteration PageRank weighted by edge weight.
///
/// Mass held by nodes without outgoing weight is spread uniformly over all nodes.
fn compute_importance(inner: &GraphInner, params: &ImportanceParams) -> Vec<f64> {
    let n = inner.nodes.len();
    if n == 0 {
        return Vec::new();
    }
    let n_f = n as f64;
    let damping = params.damping;

    let out_weight: Vec<f64> = inner
        .outgoing
        .iter()
        .map(|edges| edges.iter().map(|&e| inner.edges[e].weight).sum())
        .collect();
    let links: Vec<(usize, usize, f64)> = inner
        .edges
        .iter()
        .filter_map(|e| {
            let src = inner.index_of(&e.source)?;
            let dst = inner.index_of(&e.target)?;
            (out_weight[src] > 0.0).then(|| (src, dst, e.weight / out_weight[src]))
        })
        .collect();

    let mut rank = vec![1.0 / n_f; n];
    for _ in 0..params.max_iterations {
        let dangling: f64 = rank
            .iter()
            .zip(out_weight.iter())
            .filter(|(_, w)| **w <= 0.0)
            .map(|(r, _)| *r)
            .sum();
        let base = (1.0 - damping) / n_f + damping * dangling / n_f;
        let mut next = vec![base; n];
        for &(src, dst, share) in &links {
            next[dst] += damping * rank[src] * share;
        }

        let delta: f64 = next.iter().zip(rank.iter()).map(|(a, b)| (a - b).abs()).sum();
        rank = next;
        if delta < params.tolerance {
            break;
        }
    }

    let total: f64 = rank.iter().sum();
    if total > 0.0 {
        for r in &mut rank {
            *r /= total;
        }
    }
    rank
}
