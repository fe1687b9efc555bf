//! Embedder trait for text-to-vector conversion.
//!
//! Implementations (HTTP embedding APIs) live in personae-infra.

use personae_types::error::IndexError;

/// Trait for converting text into embedding vectors.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait Embedder: Send + Sync {
    /// Embed one or more texts into vectors.
    ///
    /// Returns one vector per input text, in input order. An unreachable
    /// backend is reported as `IndexError::EmbeddingUnavailable`.
    fn embed(
        &self,
        texts: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<Vec<f32>>, IndexError>> + Send;

    /// The model name used for embeddings (e.g., "mistral-embed").
    fn model_name(&self) -> &str;

    /// The dimensionality of the output vectors.
    fn dimension(&self) -> usize;
}
