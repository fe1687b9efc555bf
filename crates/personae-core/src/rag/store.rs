//! Reference vector store trait.
//!
//! One similarity index is shared by every persona. Rows are tagged with
//! their persona id and every search filters on it.

use personae_types::error::IndexError;
use personae_types::persona::PersonaId;
use personae_types::reference::{EmbeddedChunk, RankedChunk};

/// Trait for similarity-searchable storage of reference chunks.
///
/// Implementations (LanceDB, in-memory) live in personae-infra.
pub trait ReferenceStore: Send + Sync {
    /// Insert embedded chunks.
    fn insert(
        &self,
        chunks: &[EmbeddedChunk],
    ) -> impl std::future::Future<Output = Result<(), IndexError>> + Send;

    /// Top-`limit` chunks of `persona_id` closest to `query_embedding`,
    /// most similar first. Chunks of other personas are never returned.
    fn search(
        &self,
        persona_id: PersonaId,
        query_embedding: &[f32],
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<RankedChunk>, IndexError>> + Send;

    /// Remove every chunk of a persona. Returns the number removed.
    fn delete_persona(
        &self,
        persona_id: PersonaId,
    ) -> impl std::future::Future<Output = Result<u64, IndexError>> + Send;

    /// Count the chunks stored for a persona.
    fn count(
        &self,
        persona_id: PersonaId,
    ) -> impl std::future::Future<Output = Result<u64, IndexError>> + Send;

    /// Whether stored chunks outlive the process. Durable index markers are
    /// only meaningful for a durable store.
    fn is_durable(&self) -> bool {
        true
    }
}
