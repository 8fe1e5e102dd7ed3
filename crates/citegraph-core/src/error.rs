use thiserror::Error;

/// Top-level error type for the citegraph workspace.
///
/// Graph integrity violations (`InvalidReference`, `KindConflict`, `InvalidWeight`) are
/// rejected outright. `MalformedDocument` is contained per entity by batch ingestion, and
/// `EmbeddingUnavailable` is absorbed by the embedding index, which degrades to lexical
/// matching instead of failing the query.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CitegraphError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid reference: edge {from} -> {to} points at missing node {missing}")]
    InvalidReference {
        from: String,
        to: String,
        missing: String,
    },

    #[error("Node kind conflict for {id}: stored as {existing}, re-added as {attempted}")]
    KindConflict {
        id: String,
        existing: String,
        attempted: String,
    },

    #[error("Invalid edge weight: {0}")]
    InvalidWeight(f64),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Corrupt persisted file {path}: {reason}")]
    CorruptPersistedFile { path: String, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for CitegraphError {
    fn from(err: toml::de::Error) -> Self {
        CitegraphError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CitegraphError {
    fn from(err: toml::ser::Error) -> Self {
        CitegraphError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CitegraphError {
    fn from(err: serde_json::Error) -> Self {
        CitegraphError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for citegraph operations.
pub type Result<T> = std::result::Result<T, CitegraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(CitegraphError, &str)> = vec![
            (
                CitegraphError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                CitegraphError::InvalidReference {
                    from: "paper_a".to_string(),
                    to: "paper_b".to_string(),
                    missing: "paper_b".to_string(),
                },
                "Invalid reference: edge paper_a -> paper_b points at missing node paper_b",
            ),
            (
                CitegraphError::KindConflict {
                    id: "concept_rag".to_string(),
                    existing: "concept".to_string(),
                    attempted: "author".to_string(),
                },
                "Node kind conflict for concept_rag: stored as concept, re-added as author",
            ),
            (CitegraphError::InvalidWeight(-1.0), "Invalid edge weight: -1"),
            (
                CitegraphError::MalformedDocument("missing arxiv_id".to_string()),
                "Malformed document: missing arxiv_id",
            ),
            (
                CitegraphError::EmbeddingUnavailable("model offline".to_string()),
                "Embedding unavailable: model offline",
            ),
            (
                CitegraphError::EntityNotFound("paper_x".to_string()),
                "Entity not found: paper_x",
            ),
            (
                CitegraphError::CorruptPersistedFile {
                    path: "graph.json".to_string(),
                    reason: "expected value".to_string(),
                },
                "Corrupt persisted file graph.json: expected value",
            ),
            (
                CitegraphError::Storage("lock poisoned".to_string()),
                "Storage error: lock poisoned",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err: CitegraphError = io_err.into();
        match &err {
            CitegraphError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            _ => panic!("Expected Io variant"),
        }
        assert!(err.to_string().starts_with("I/O error:"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let err: CitegraphError = err.unwrap_err().into();
        assert!(matches!(err, CitegraphError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let err: CitegraphError = err.unwrap_err().into();
        assert!(matches!(err, CitegraphError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
