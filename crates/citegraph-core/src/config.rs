use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CitegraphError, Result};

/// Top-level configuration for citegraph.
///
/// Loaded from `~/.citegraph/config.toml` by default. Every section is optional in the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CitegraphConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl CitegraphConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CitegraphConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        let (config, error) = Self::load_or_default_reporting(path);
        if let Some(e) = error {
            warn!(
                "Failed to load config from {}: {}. Using defaults.",
                path.display(),
                e
            );
        }
        config
    }

    /// Like [`load_or_default`](Self::load_or_default) but hands back the load error
    /// instead of logging it, for callers that log only after tracing is set up.
    ///
    /// A missing file is not an error. A file that exists but cannot be read, parsed,
    /// or validated yields defaults plus the error.
    pub fn load_or_default_reporting(path: &Path) -> (Self, Option<CitegraphError>) {
        if !path.exists() {
            return (Self::default(), None);
        }
        match Self::load(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CitegraphError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the algorithms cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.graph.damping) {
            return Err(CitegraphError::Config(format!(
                "graph.damping must be in [0, 1), got {}",
                self.graph.damping
            )));
        }
        if self.graph.tolerance <= 0.0 || !self.graph.tolerance.is_finite() {
            return Err(CitegraphError::Config(format!(
                "graph.tolerance must be positive, got {}",
                self.graph.tolerance
            )));
        }
        if self.retrieval.search_depth == 0 {
            return Err(CitegraphError::Config(
                "retrieval.search_depth must be at least 1".to_string(),
            ));
        }
        if self.retrieval.rrf_k < 0.0 || !self.retrieval.rrf_k.is_finite() {
            return Err(CitegraphError::Config(format!(
                "retrieval.rrf_k must be non-negative, got {}",
                self.retrieval.rrf_k
            )));
        }
        Ok(())
    }

    /// Data directory with a leading `~` expanded against `$HOME`.
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.general.data_dir)
    }

    /// Default location of the persisted graph file.
    pub fn graph_path(&self) -> PathBuf {
        self.data_dir().join(&self.general.graph_file)
    }
}

/// Expand a leading `~/` using the `HOME` (or `USERPROFILE`) environment variable.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"));
        if let Ok(home) = home {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding research output files and the persisted graph.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// File name of the persisted graph inside `data_dir`.
    pub graph_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.citegraph/data".to_string(),
            log_level: "info".to_string(),
            graph_file: "semantic_graph.json".to_string(),
        }
    }
}

/// Importance (PageRank) parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub damping: f64,
    /// L1 convergence threshold between iterations.
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            damping: 0.85,
            tolerance: 1e-6,
            max_iterations: 100,
        }
    }
}

/// Embedding index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Directory with `model.onnx` and `tokenizer.json`. Unset means lexical fallback.
    pub embedding_model_dir: Option<String>,
    /// Embedding dimension.
    pub embedding_dim: usize,
    /// Default number of results.
    pub default_top_k: usize,
    /// Minimum cosine score for vector results.
    pub min_score: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            embedding_model_dir: None,
            embedding_dim: 384,
            default_top_k: 10,
            min_score: 0.0,
        }
    }
}

/// Graph traversal and fusion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// RRF smoothing constant.
    pub rrf_k: f64,
    /// Graph retriever depth; 1 means no expansion rounds.
    pub search_depth: usize,
    /// Each source fetches `top_k * candidate_multiplier` before hybrid fusion.
    pub candidate_multiplier: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            search_depth: 2,
            candidate_multiplier: 2,
        }
    }
}
