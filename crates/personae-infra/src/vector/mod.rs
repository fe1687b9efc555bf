//! Reference vector storage and embedding backends.
//!
//! LanceDB is the persistent store; the in-memory store serves tests and
//! throwaway runs. Embeddings come from an OpenAI-compatible HTTP API.

pub mod embedder;
pub mod in_memory;
pub mod lance;
pub mod schema;

use std::path::Path;

use personae_core::rag::box_store::BoxReferenceStore;
use personae_types::config::{EmbeddingConfig, IndexConfig, VectorBackend};
use personae_types::error::IndexError;

use self::in_memory::InMemoryReferenceStore;
use self::lance::LanceReferenceStore;

/// Open the reference store selected by `[index] backend`.
///
/// The LanceDB store lives in `{data_dir}/vector_store`.
pub async fn open_reference_store(
    data_dir: &Path,
    index: &IndexConfig,
    embedding: &EmbeddingConfig,
) -> Result<BoxReferenceStore, IndexError> {
    match index.backend {
        VectorBackend::Lance => {
            let store = LanceReferenceStore::open(&data_dir.join("vector_store"), embedding.dimension).await?;
            Ok(BoxReferenceStore::new(store))
        }
        VectorBackend::Memory => Ok(BoxReferenceStore::new(InMemoryReferenceStore::new())),
    }
}
