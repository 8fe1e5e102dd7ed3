//! Hybrid retrieval over the knowledge graph and the embedding index.
//!
//! The [`RetrievalPolicy`] picks a method per query, runs the [`GraphRetriever`], the
//! embedding index, or both, and merges them with [`RrfFusion`]. [`KnowledgeBase`] is the
//! facade that ingests research entities and answers queries.

pub mod facade;
pub mod fusion;
pub mod graph_retriever;
pub mod policy;

pub use facade::{BatchReport, Entity, KnowledgeBase, KnowledgeBaseStats, SkippedEntity};
pub use fusion::RrfFusion;
pub use graph_retriever::GraphRetriever;
pub use policy::{DecisionStats, RetrievalPolicy};
