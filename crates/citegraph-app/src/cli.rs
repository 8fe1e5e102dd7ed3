//! CLI argument definitions for the citegraph binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// citegraph: hybrid graph and embedding retrieval over collected research.
#[derive(Parser, Debug)]
#[command(name = "citegraph", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Directory holding the research output files.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Ingest the academic, GitHub, and community research outputs from the data directory.
    #[arg(long = "build")]
    pub build: bool,

    /// Load a persisted graph file before doing anything else.
    #[arg(long = "load", value_name = "PATH")]
    pub load: Option<PathBuf>,

    /// Write the graph to this file after building.
    #[arg(long = "save", value_name = "PATH")]
    pub save: Option<PathBuf>,

    /// Run a retrieval query.
    #[arg(short = 'q', long = "query")]
    pub query: Option<String>,

    /// Retrieval method: vector, graph, hybrid, or auto.
    #[arg(short = 'm', long = "method", default_value = "auto")]
    pub method: String,

    /// Number of results to return.
    #[arg(short = 'k', long = "top-k")]
    pub top_k: Option<usize>,

    /// List entities related to a node id.
    #[arg(long = "related", value_name = "NODE_ID")]
    pub related: Option<String>,

    /// Print graph, index, and citation statistics.
    #[arg(long = "stats")]
    pub stats: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > CITEGRAPH_CONFIG env var > ~/.citegraph/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("CITEGRAPH_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the data directory path.
    ///
    /// Returns `None` if not overridden (use config value).
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Resolve the log level. Returns `None` if not overridden.
    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }

    /// Resolve the result count: --top-k flag > config value.
    pub fn resolve_top_k(&self, config_top_k: usize) -> usize {
        self.top_k.unwrap_or(config_top_k).max(1)
    }

    /// True when at least one action flag was given.
    pub fn has_action(&self) -> bool {
        self.build
            || self.load.is_some()
            || self.save.is_some()
            || self.query.is_some()
            || self.related.is_some()
            || self.stats
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".citegraph").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".citegraph").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::parse_from(std::iter::once("citegraph").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.method, "auto");
        assert!(!args.has_action());
        assert_eq!(args.resolve_top_k(10), 10);
        assert!(args.resolve_data_dir().is_none());
    }

    #[test]
    fn test_query_flags() {
        let args = parse(&["--query", "agent memory", "--method", "graph", "-k", "3"]);
        assert_eq!(args.query.as_deref(), Some("agent memory"));
        assert_eq!(args.method, "graph");
        assert_eq!(args.resolve_top_k(10), 3);
        assert!(args.has_action());
    }

    #[test]
    fn test_explicit_config_wins() {
        let args = parse(&["--config", "/tmp/custom.toml", "--data-dir", "/data"]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/custom.toml"));
        assert_eq!(args.resolve_data_dir().as_deref(), Some("/data"));
    }

    #[test]
    fn test_top_k_is_at_least_one() {
        assert_eq!(parse(&["--top-k", "0"]).resolve_top_k(10), 1);
    }
}
