//! Reading the collectors' research output files into ingestable entities.

use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use citegraph_core::error::{CitegraphError, Result};
use citegraph_graph::ingest::{parse_record, DiscussionFields, PaperFields, ProjectFields};
use citegraph_retrieval::{Entity, SkippedEntity};

pub const ACADEMIC_FILE: &str = "academic_research_output.json";
pub const GITHUB_FILE: &str = "github_research_output.json";
pub const COMMUNITY_FILE: &str = "community_research_output.json";

/// Entities parsed from one output file plus records that could not be parsed.
#[derive(Debug, Default)]
pub struct ResearchFile {
    pub entities: Vec<Entity>,
    pub rejected: Vec<SkippedEntity>,
}

/// Every entity from the three research output files in `data_dir`.
///
/// Missing files are skipped. A file that is not JSON, or lacks its record array, is an
/// error.
pub fn read_research_outputs(data_dir: &Path) -> Result<ResearchFile> {
    let mut combined = ResearchFile::default();
    let sources: [(&str, &[&str], fn(Value) -> Result<Entity>); 3] = [
        (ACADEMIC_FILE, &["papers"], |v| {
            parse_record::<PaperFields>(v).map(Entity::Paper)
        }),
        (GITHUB_FILE, &["projects", "repositories"], |v| {
            parse_record::<ProjectFields>(v).map(Entity::Project)
        }),
        (COMMUNITY_FILE, &["discussions", "threads"], |v| {
            parse_record::<DiscussionFields>(v).map(Entity::Discussion)
        }),
    ];

    for (file, keys, parse) in sources {
        let path = data_dir.join(file);
        if !path.exists() {
            warn!(path = %path.display(), "Research output not found, skipping");
            continue;
        }
        let records = read_records(&path, keys)?;
        let count = records.len();
        for record in records {
            match parse(record) {
                Ok(entity) => combined.entities.push(entity),
                Err(e) => combined.rejected.push(SkippedEntity {
                    index: combined.entities.len() + combined.rejected.len(),
                    reason: format!("{}: {}", file, e),
                }),
            }
        }
        info!(path = %path.display(), records = count, "Research output read");
    }
    Ok(combined)
}

/// The record array stored under the first of `keys` present in the file.
fn read_records(path: &Path, keys: &[&str]) -> Result<Vec<Value>> {
    let malformed = |reason: String| {
        CitegraphError::MalformedDocument(format!("{}: {}", path.display(), reason))
    };
    let content = std::fs::read_to_string(path)?;
    let document: Value = serde_json::from_str(&content).map_err(|e| malformed(e.to_string()))?;
    let Value::Object(mut root) = document else {
        return Err(malformed("top-level value is not an object".to_string()));
    };
    for key in keys {
        match root.remove(*key) {
            Some(Value::Array(records)) => return Ok(records),
            Some(_) => return Err(malformed(format!("`{}` is not an array", key))),
            None => {}
        }
    }
    Err(malformed(format!("expected one of {:?}", keys)))
}
