//! JSON graph file: `{nodes: [...], edges: [...], stats: {...}}`.
//!
//! `stats` is written for human readers and ignored on load. Derived data such as importance
//! scores is never persisted.

use std::path::Path;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use citegraph_core::error::{CitegraphError, Result};
use citegraph_core::types::{Edge, Node};

use crate::store::{GraphStore, ImportanceParams};

/// Outcome of loading a graph file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub nodes_loaded: usize,
    pub edges_loaded: usize,
    pub nodes_skipped: usize,
    pub edges_skipped: usize,
}

impl LoadReport {
    pub fn skipped(&self) -> usize {
        self.nodes_skipped + self.edges_skipped
    }
}

/// Serialize the store into the graph file document.
pub fn to_document(store: &GraphStore) -> Result<Value> {
    let nodes = store.nodes()?;
    let edges = store.edges()?;
    let stats = store.stats()?;
    Ok(json!({
        "nodes": nodes,
        "edges": edges,
        "stats": stats,
    }))
}

/// Write the graph file, creating parent directories as needed.
pub fn save(store: &GraphStore, path: &Path) -> Result<()> {
    let document = to_document(store)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(&document)?)?;
    info!(
        path = %path.display(),
        nodes = store.node_count(),
        edges = store.edge_count(),
        "Graph saved"
    );
    Ok(())
}

/// Read a graph file into a fresh store.
///
/// An unreadable file is an `Io` error and a file that is not a graph document is
/// `CorruptPersistedFile`. Individual records that fail to parse or violate graph
/// integrity are skipped with a warning and counted in the [`LoadReport`].
pub fn load(path: &Path, params: ImportanceParams) -> Result<(GraphStore, LoadReport)> {
    let content = std::fs::read_to_string(path)?;
    let corrupt = |reason: String| CitegraphError::CorruptPersistedFile {
        path: path.display().to_string(),
        reason,
    };
    let document: Value = serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;
    let (store, report) = from_document(document, params).map_err(|e| match e {
        CitegraphError::CorruptPersistedFile { reason, .. } => corrupt(reason),
        other => other,
    })?;
    info!(
        path = %path.display(),
        nodes = report.nodes_loaded,
        edges = report.edges_loaded,
        skipped = report.skipped(),
        "Graph loaded"
    );
    Ok((store, report))
}

/// Build a store from an already-parsed graph document.
///
/// Bad records are skipped, but a document whose node (or edge) records all fail is
/// rejected as corrupt rather than loaded as an empty graph.
pub fn from_document(document: Value, params: ImportanceParams) -> Result<(GraphStore, LoadReport)> {
    let corrupt = |reason: &str| CitegraphError::CorruptPersistedFile {
        path: "<document>".to_string(),
        reason: reason.to_string(),
    };
    let Value::Object(mut root) = document else {
        return Err(corrupt("top-level value is not an object"));
    };
    let nodes = match root.remove("nodes") {
        Some(Value::Array(nodes)) => nodes,
        Some(_) => return Err(corrupt("`nodes` is not an array")),
        None => return Err(corrupt("missing `nodes`")),
    };
    let edges = match root.remove("edges") {
        Some(Value::Array(edges)) => edges,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => return Err(corrupt("`edges` is not an array")),
    };

    let store = GraphStore::with_params(params);
    let mut report = LoadReport::default();

    let node_records = nodes.len();
    for (index, raw) in nodes.into_iter().enumerate() {
        let outcome = serde_json::from_value::<Node>(raw)
            .map_err(CitegraphError::from)
            .and_then(|node| store.add_node(node));
        match outcome {
            Ok(_) => report.nodes_loaded += 1,
            Err(e) => {
                warn!(index, error = %e, "Skipping unreadable node record");
                report.nodes_skipped += 1;
            }
        }
    }

    if node_records > 0 && report.nodes_loaded == 0 {
        return Err(corrupt("no node record could be read"));
    }

    let edge_records = edges.len();
    for (index, raw) in edges.into_iter().enumerate() {
        let outcome = serde_json::from_value::<Edge>(raw)
            .map_err(CitegraphError::from)
            .and_then(|edge| store.add_edge(edge));
        match outcome {
            Ok(()) => report.edges_loaded += 1,
            Err(e) => {
                warn!(index, error = %e, "Skipping unreadable edge record");
                report.edges_skipped += 1;
            }
        }
    }

    if edge_records > 0 && report.edges_loaded == 0 {
        return Err(corrupt("no edge record could be read"));
    }

    Ok((store, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::PaperFields;
    use citegraph_core::types::{EdgeKind, NodeAttributes, PaperCategory};

    fn sample_store() -> GraphStore {
        let store = GraphStore::new();
        let paper = PaperFields {
            arxiv_id: "2506.12508".to_string(),
            title: "Agentic Memory".to_string(),
            abstract_text: "Graphs for agents.".to_string(),
            authors: vec!["Ada Lovelace".to_string()],
            key_concepts: vec!["agent memory".to_string()],
            cites: vec!["2401.00001".to_string(), "2401.00001".to_string()],
            ..Default::default()
        };
        store.apply(paper.to_batch().unwrap().1).unwrap();
        store
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graphs").join("semantic_graph.json");
        let store = sample_store();
        save(&store, &path).unwrap();

        let (loaded, report) = load(&path, ImportanceParams::default()).unwrap();
        assert_eq!(report.skipped(), 0);
        assert_eq!(loaded.nodes().unwrap(), store.nodes().unwrap());
        assert_eq!(loaded.edges().unwrap(), store.edges().unwrap());
        assert_eq!(
            loaded.outgoing("paper_2506.12508", Some(EdgeKind::Cites)).unwrap().len(),
            2
        );
    }

    #[test]
    fn test_document_has_stats_and_wire_names() {
        let document = to_document(&sample_store()).unwrap();
        assert_eq!(document["stats"]["total_nodes"], 4);
        assert_eq!(document["nodes"][0]["type"], "academic_paper");
        assert_eq!(document["edges"][0]["type"], "authored_by");
    }

    #[test]
    fn test_load_skips_bad_records() {
        let document = json!({
            "nodes": [
                {"id": "paper_1", "type": "paper", "attributes": {"title": "One"}},
                {"id": "paper_2", "type": "hologram"},
                {"type": "concept"},
                {"id": "concept_rag", "type": "concept", "attributes": {"name": "rag"}}
            ],
            "edges": [
                {"source": "paper_1", "target": "concept_rag", "type": "introduces"},
                {"source": "paper_1", "target": "paper_2", "type": "cites"},
                {"source": "paper_1", "target": "concept_rag", "type": "teleports"},
                {"source": "paper_1", "target": "concept_rag", "type": "introduces", "weight": -2.0}
            ],
            "stats": {"ignored": true}
        });
        let (store, report) = from_document(document, ImportanceParams::default()).unwrap();
        assert_eq!(
            report,
            LoadReport {
                nodes_loaded: 2,
                edges_loaded: 1,
                nodes_skipped: 2,
                edges_skipped: 3,
            }
        );
        assert_eq!(store.node_count(), 2);
        assert_eq!(store.edge_count(), 1);
    }

    #[test]
    fn test_load_accepts_free_form_paper_categories() {
        let document = json!({
            "nodes": [
                {"id": "paper_a", "type": "academic_paper",
                 "attributes": {"arxiv_id": "a", "title": "A", "type_category": "benchmark",
                                "url_markdown": "[A](https://arxiv.org/abs/a)"}},
                {"id": "paper_b", "type": "academic_paper",
                 "attributes": {"arxiv_id": "b", "title": "B", "type_category": null, "venue": null}},
                {"id": "paper_c", "type": "academic_paper",
                 "attributes": {"arxiv_id": "c", "title": "C", "type_category": "root"}}
            ],
            "edges": [
                {"source": "paper_a", "target": "paper_b", "type": "cites",
                 "attributes": {}, "weight": 1.0}
            ]
        });
        let (store, report) = from_document(document, ImportanceParams::default()).unwrap();
        assert_eq!(report.nodes_loaded, 3);
        assert_eq!(report.edges_loaded, 1);
        assert_eq!(report.skipped(), 0);

        match store.node("paper_a").unwrap().map(|n| n.attributes) {
            Some(NodeAttributes::Paper(p)) => {
                assert_eq!(p.category, PaperCategory::Sota);
                assert_eq!(
                    p.extra.get("url_markdown").map(String::as_str),
                    Some("[A](https://arxiv.org/abs/a)")
                );
            }
            other => panic!("expected paper attributes, got {:?}", other),
        }
        assert!(matches!(
            store.node("paper_c").unwrap().map(|n| n.attributes),
            Some(NodeAttributes::Paper(p)) if p.category == PaperCategory::Root
        ));
    }

    #[test]
    fn test_load_rejects_document_with_no_readable_records() {
        let document = json!({
            "nodes": [{"id": 1}, "junk", {"type": "hologram"}],
            "edges": [{"x": 1}]
        });
        assert!(matches!(
            from_document(document, ImportanceParams::default()),
            Err(CitegraphError::CorruptPersistedFile { .. })
        ));

        let document = json!({
            "nodes": [{"id": "paper_1", "type": "paper"}],
            "edges": [{"source": "paper_1", "target": "paper_9", "type": "cites"}]
        });
        assert!(matches!(
            from_document(document, ImportanceParams::default()),
            Err(CitegraphError::CorruptPersistedFile { .. })
        ));

        let (store, report) = from_document(
            json!({"nodes": [], "edges": []}),
            ImportanceParams::default(),
        )
        .unwrap();
        assert!(store.is_empty());
        assert_eq!(report, LoadReport::default());
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ \"nodes\": [ ").unwrap();
        match load(&path, ImportanceParams::default()) {
            Err(CitegraphError::CorruptPersistedFile { path: p, .. }) => {
                assert!(p.ends_with("broken.json"));
            }
            other => panic!("expected corrupt file error, got {:?}", other.map(|(_, r)| r)),
        }

        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(
            load(&path, ImportanceParams::default()),
            Err(CitegraphError::CorruptPersistedFile { .. })
        ));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = load(Path::new("/nonexistent/graph.json"), ImportanceParams::default());
        assert!(matches!(result, Err(CitegraphError::Io(_))));
    }
}
