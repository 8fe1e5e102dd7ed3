//! Embedding capability and the document similarity index.
//!
//! Provides an embedding service trait with an ONNX backend (behind the `onnx` feature)
//! and a hash-based mock for tests, plus an in-memory index that searches by cosine
//! similarity and falls back to token overlap when no embeddings are available.

pub mod embedding;
pub mod index;

pub use embedding::{DynEmbeddingService, EmbeddingService, MockEmbedding};
#[cfg(feature = "onnx")]
pub use embedding::OnnxEmbeddingService;
pub use index::EmbeddingIndex;
