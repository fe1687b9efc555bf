//! BoxReferenceStore -- object-safe dynamic dispatch wrapper for ReferenceStore.

use std::future::Future;
use std::pin::Pin;

use personae_types::error::IndexError;
use personae_types::persona::PersonaId;
use personae_types::reference::{EmbeddedChunk, RankedChunk};

use super::store::ReferenceStore;

/// Object-safe version of [`ReferenceStore`] with boxed futures.
pub trait ReferenceStoreDyn: Send + Sync {
    fn insert_boxed<'a>(
        &'a self,
        chunks: &'a [EmbeddedChunk],
    ) -> Pin<Box<dyn Future<Output = Result<(), IndexError>> + Send + 'a>>;

    fn search_boxed<'a>(
        &'a self,
        persona_id: PersonaId,
        query_embedding: &'a [f32],
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RankedChunk>, IndexError>> + Send + 'a>>;

    fn delete_persona_boxed(
        &self,
        persona_id: PersonaId,
    ) -> Pin<Box<dyn Future<Output = Result<u64, IndexError>> + Send + '_>>;

    fn count_boxed(
        &self,
        persona_id: PersonaId,
    ) -> Pin<Box<dyn Future<Output = Result<u64, IndexError>> + Send + '_>>;

    fn is_durable_dyn(&self) -> bool;
}

impl<T: ReferenceStore> ReferenceStoreDyn for T {
    fn insert_boxed<'a>(
        &'a self,
        chunks: &'a [EmbeddedChunk],
    ) -> Pin<Box<dyn Future<Output = Result<(), IndexError>> + Send + 'a>> {
        Box::pin(self.insert(chunks))
    }

    fn search_boxed<'a>(
        &'a self,
        persona_id: PersonaId,
        query_embedding: &'a [f32],
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RankedChunk>, IndexError>> + Send + 'a>> {
        Box::pin(self.search(persona_id, query_embedding, limit))
    }

    fn delete_persona_boxed(
        &self,
        persona_id: PersonaId,
    ) -> Pin<Box<dyn Future<Output = Result<u64, IndexError>> + Send + '_>> {
        Box::pin(self.delete_persona(persona_id))
    }

    fn count_boxed(
        &self,
        persona_id: PersonaId,
    ) -> Pin<Box<dyn Future<Output = Result<u64, IndexError>> + Send + '_>> {
        Box::pin(self.count(persona_id))
    }

    fn is_durable_dyn(&self) -> bool {
        ReferenceStore::is_durable(self)
    }
}

/// Type-erased reference store for runtime backend selection
/// (LanceDB on disk vs in-memory).
pub struct BoxReferenceStore {
    inner: Box<dyn ReferenceStoreDyn + Send + Sync>,
}

impl BoxReferenceStore {
    pub fn new<T: ReferenceStore + 'static>(store: T) -> Self {
        Self {
            inner: Box::new(store),
        }
    }

    pub async fn insert(&self, chunks: &[EmbeddedChunk]) -> Result<(), IndexError> {
        self.inner.insert_boxed(chunks).await
    }

    pub async fn search(
        &self,
        persona_id: PersonaId,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<RankedChunk>, IndexError> {
        self.inner.search_boxed(persona_id, query_embedding, limit).await
    }

    pub async fn delete_persona(&self, persona_id: PersonaId) -> Result<u64, IndexError> {
        self.inner.delete_persona_boxed(persona_id).await
    }

    pub async fn count(&self, persona_id: PersonaId) -> Result<u64, IndexError> {
        self.inner.count_boxed(persona_id).await
    }

    pub fn is_durable(&self) -> bool {
        self.inner.is_durable_dyn()
    }
}
