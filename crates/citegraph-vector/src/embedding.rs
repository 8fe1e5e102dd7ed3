//! Embedding service trait and implementations.
//!
//! - `OnnxEmbeddingService` loads a sentence-transformer ONNX model (e.g.
//!   all-MiniLM-L6-v2) via ort and tokenizes with the HuggingFace tokenizers
//!   crate. Compiled with the `onnx` feature.
//! - `MockEmbedding` provides deterministic hash-based vectors for testing.
//!
//! Every backend failure is reported as `EmbeddingUnavailable` so callers can
//! degrade instead of failing.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use citegraph_core::error::CitegraphError;

/// Service for generating text embeddings.
///
/// Implementations convert text into fixed-dimensional vectors that capture
/// semantic meaning. Used for both indexing and querying.
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, CitegraphError>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// Because `EmbeddingService::embed` returns `impl Future` it is not
/// object-safe. This trait uses a boxed future instead, allowing
/// `Box<dyn DynEmbeddingService>` to be stored in structs without generics.
///
/// A blanket implementation is provided so that every `EmbeddingService`
/// automatically implements `DynEmbeddingService`.
pub trait DynEmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text (boxed future).
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<f32>, CitegraphError>> + Send + 'a>,
    >;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Blanket impl: any `EmbeddingService` automatically implements `DynEmbeddingService`.
impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<f32>, CitegraphError>> + Send + 'a>,
    > {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

fn l2_normalize(values: &mut [f32]) {
    let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in values.iter_mut() {
            *val /= norm;
        }
    }
}

// ---------------------------------------------------------------------------
// OnnxEmbeddingService - real ONNX Runtime inference
// ---------------------------------------------------------------------------

#[cfg(feature = "onnx")]
pub use onnx::OnnxEmbeddingService;

#[cfg(feature = "onnx")]
mod onnx {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use ort::session::Session;
    use ort::value::TensorRef;
    use tokenizers::Tokenizer;
    use tracing::info;

    use citegraph_core::error::CitegraphError;

    use super::{l2_normalize, EmbeddingService};

    fn unavailable(context: &str, err: impl std::fmt::Display) -> CitegraphError {
        CitegraphError::EmbeddingUnavailable(format!("{}: {}", context, err))
    }

    /// ONNX Runtime-backed embedding service using a sentence-transformer model.
    ///
    /// Expects a model directory containing:
    /// - `model.onnx`  (the sentence-transformer ONNX export)
    /// - `tokenizer.json` (the HuggingFace fast-tokenizer file)
    ///
    /// The model should accept `input_ids`, `attention_mask`, and `token_type_ids`
    /// as i64 inputs and produce token-level embeddings. Masked mean pooling
    /// produces a single L2-normalized vector per input.
    #[derive(Clone)]
    pub struct OnnxEmbeddingService {
        session: Arc<Mutex<Session>>,
        tokenizer: Arc<Tokenizer>,
        dimensions: usize,
    }

    impl std::fmt::Debug for OnnxEmbeddingService {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("OnnxEmbeddingService")
                .field("dimensions", &self.dimensions)
                .finish()
        }
    }

    impl OnnxEmbeddingService {
        /// Load a sentence-transformer model from the given directory.
        pub fn from_directory(model_dir: &Path) -> Result<Self, CitegraphError> {
            Self::from_files(
                &model_dir.join("model.onnx"),
                &model_dir.join("tokenizer.json"),
            )
        }

        /// Load from explicit model and tokenizer file paths.
        pub fn from_files(model_path: &Path, tokenizer_path: &Path) -> Result<Self, CitegraphError> {
            if !model_path.exists() {
                return Err(CitegraphError::EmbeddingUnavailable(format!(
                    "ONNX model not found at {}",
                    model_path.display()
                )));
            }
            if !tokenizer_path.exists() {
                return Err(CitegraphError::EmbeddingUnavailable(format!(
                    "Tokenizer not found at {}",
                    tokenizer_path.display()
                )));
            }

            let session = Session::builder()
                .map_err(|e| unavailable("ONNX session builder", e))?
                .with_intra_threads(1)
                .map_err(|e| unavailable("ONNX set threads", e))?
                .commit_from_file(model_path)
                .map_err(|e| unavailable("ONNX load model", e))?;

            // Output is [batch, seq_len, hidden_dim].
            let dimensions = session
                .outputs()
                .first()
                .and_then(|out| out.dtype().tensor_shape())
                .and_then(|shape| shape.last().copied())
                .map(|d| if d > 0 { d as usize } else { 384 })
                .unwrap_or(384);

            let tokenizer = Tokenizer::from_file(tokenizer_path)
                .map_err(|e| unavailable("Failed to load tokenizer", e))?;

            info!(
                model = %model_path.display(),
                dimensions,
                "Loaded ONNX embedding model"
            );

            Ok(Self {
                session: Arc::new(Mutex::new(session)),
                tokenizer: Arc::new(tokenizer),
                dimensions,
            })
        }

        /// Tokenize, run inference, and mean-pool the output.
        fn embed_sync(&self, text: &str) -> Result<Vec<f32>, CitegraphError> {
            if text.trim().is_empty() {
                return Err(CitegraphError::EmbeddingUnavailable(
                    "Cannot embed empty text".to_string(),
                ));
            }

            let encoding = self
                .tokenizer
                .encode(text, true)
                .map_err(|e| unavailable("Tokenization failed", e))?;

            let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
            let attention_mask: Vec<i64> = encoding
                .get_attention_mask()
                .iter()
                .map(|&m| m as i64)
                .collect();
            let token_type_ids: Vec<i64> =
                encoding.get_type_ids().iter().map(|&t| t as i64).collect();
            let seq_len = input_ids.len();

            let ids_array = ndarray::Array2::from_shape_vec((1, seq_len), input_ids)
                .map_err(|e| unavailable("input_ids array", e))?;
            let mask_array = ndarray::Array2::from_shape_vec((1, seq_len), attention_mask.clone())
                .map_err(|e| unavailable("attention_mask array", e))?;
            let type_array = ndarray::Array2::from_shape_vec((1, seq_len), token_type_ids)
                .map_err(|e| unavailable("token_type_ids array", e))?;

            let ids_ref = TensorRef::from_array_view(&ids_array)
                .map_err(|e| unavailable("TensorRef input_ids", e))?;
            let mask_ref = TensorRef::from_array_view(&mask_array)
                .map_err(|e| unavailable("TensorRef attention_mask", e))?;
            let type_ref = TensorRef::from_array_view(&type_array)
                .map_err(|e| unavailable("TensorRef token_type_ids", e))?;

            let mut session = self
                .session
                .lock()
                .map_err(|e| unavailable("Session lock poisoned", e))?;
            let outputs = session
                .run(ort::inputs![ids_ref, mask_ref, type_ref])
                .map_err(|e| unavailable("ONNX inference failed", e))?;

            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| unavailable("Extract embeddings", e))?;

            let shape_dims: Vec<i64> = shape.iter().copied().collect();
            let hidden_dim = match shape_dims.as_slice() {
                [.., _, last] => *last as usize,
                _ => {
                    return Err(CitegraphError::EmbeddingUnavailable(format!(
                        "Unexpected output shape: {:?}",
                        shape_dims
                    )))
                }
            };

            let mut pooled = vec![0.0f32; hidden_dim];
            let mut count = 0.0f32;
            for (tok_idx, &mask_val) in attention_mask.iter().enumerate() {
                if mask_val > 0 {
                    let offset = tok_idx * hidden_dim;
                    for (dim, value) in pooled.iter_mut().enumerate() {
                        *value += data[offset + dim];
                    }
                    count += 1.0;
                }
            }
            if count > 0.0 {
                for val in &mut pooled {
                    *val /= count;
                }
            }

            l2_normalize(&mut pooled);
            Ok(pooled)
        }
    }

    impl EmbeddingService for OnnxEmbeddingService {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, CitegraphError> {
            // Inference is CPU-bound; run on a blocking thread.
            let service = self.clone();
            let text_owned = text.to_string();
            tokio::task::spawn_blocking(move || service.embed_sync(&text_owned))
                .await
                .map_err(|e| unavailable("Embedding task panicked", e))?
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }
    }

}

// ---------------------------------------------------------------------------
// MockEmbedding - deterministic hash-based vectors for testing
// ---------------------------------------------------------------------------

/// Mock embedding service that returns deterministic vectors (384 dimensions by default).
///
/// The output is derived from a hash of the input text, so identical inputs
/// always produce identical outputs. Similar texts do not produce similar
/// vectors; this is a test double, never a production fallback.
#[derive(Debug, Clone)]
pub struct MockEmbedding {
    dimensions: usize,
}

impl Default for MockEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmbedding {
    pub fn new() -> Self {
        Self::with_dimensions(384)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut result = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }
        l2_normalize(&mut result);
        result
    }
}

impl EmbeddingService for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CitegraphError> {
        if text.trim().is_empty() {
            return Err(CitegraphError::EmbeddingUnavailable(
                "Cannot embed empty text".to_string(),
            ));
        }
        Ok(self.hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
