//! Typed, directed knowledge multigraph of research entities.
//!
//! [`GraphStore`] owns nodes and edges, [`ingest`] turns research payloads into
//! [`GraphBatch`]es, [`persist`] reads and writes the JSON graph file, and
//! [`citation`] derives citation-network views.

pub mod citation;
pub mod ingest;
pub mod persist;
pub mod store;

pub use citation::{CitationNetwork, CitationSummary};
pub use ingest::{DiscussionFields, PaperFields, ProjectFields};
pub use persist::LoadReport;
pub use store::{GraphBatch, GraphStats, GraphStore, ImportanceParams};
