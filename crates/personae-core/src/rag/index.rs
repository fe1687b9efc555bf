//! Reference index: lazily built, persona-filtered similarity search.
//!
//! The index for a persona is built on first use: chunk the persona's
//! reference material, embed it in batches, insert it into the shared store,
//! then record the build marker. The marker is written only after every
//! chunk is stored, so a failed build is retried on the next call.
//!
//! A volatile store loses its chunks when the process exits while the
//! repository marker survives. For such stores the index answers "built?"
//! from a process-local record instead, so each process builds once.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use personae_types::error::IndexError;
use personae_types::persona::PersonaId;
use personae_types::reference::{EmbeddedChunk, RankedChunk};

use crate::rag::box_embedder::BoxEmbedder;
use crate::rag::box_store::BoxReferenceStore;
use crate::rag::chunker::ReferenceChunker;
use crate::repository::index_marker::IndexMarkerRepository;
use crate::repository::persona::PersonaRepository;

/// Outcome of [`ReferenceIndex::ensure_built`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBuild {
    /// A marker already existed; nothing was done.
    AlreadyBuilt,
    /// This call built the index.
    Built { chunk_count: u64 },
}

/// Retrieval capability over the shared reference store.
pub struct ReferenceIndex<R> {
    repo: Arc<R>,
    embedder: Arc<BoxEmbedder>,
    store: Arc<BoxReferenceStore>,
    chunker: ReferenceChunker,
    batch_size: usize,
    build_locks: DashMap<PersonaId, Arc<Mutex<()>>>,
    /// Builds completed by this process, consulted for volatile stores.
    built_here: DashMap<PersonaId, u64>,
}

impl<R> ReferenceIndex<R>
where
    R: PersonaRepository + IndexMarkerRepository,
{
    pub fn new(
        repo: Arc<R>,
        embedder: Arc<BoxEmbedder>,
        store: Arc<BoxReferenceStore>,
        chunker: ReferenceChunker,
        batch_size: usize,
    ) -> Self {
        Self {
            repo,
            embedder,
            store,
            chunker,
            batch_size: batch_size.max(1),
            build_locks: DashMap::new(),
            built_here: DashMap::new(),
        }
    }

    async fn is_built(&self, persona_id: PersonaId) -> Result<bool, IndexError> {
        if self.store.is_durable() {
            Ok(self.repo.marker_exists(persona_id).await?)
        } else {
            Ok(self.built_here.contains_key(&persona_id))
        }
    }

    /// Build the persona's index unless its marker already exists.
    ///
    /// Concurrent callers for the same persona are serialized; the second one
    /// sees the marker written by the first and returns `AlreadyBuilt`.
    #[tracing::instrument(name = "reference_index.ensure_built", skip(self), fields(persona_id = %persona_id))]
    pub async fn ensure_built(&self, persona_id: PersonaId) -> Result<IndexBuild, IndexError> {
        if self.is_built(persona_id).await? {
            return Ok(IndexBuild::AlreadyBuilt);
        }

        let lock = self
            .build_locks
            .entry(persona_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if self.is_built(persona_id).await? {
            return Ok(IndexBuild::AlreadyBuilt);
        }

        let persona = self
            .repo
            .get_persona(persona_id)
            .await?
            .ok_or(IndexError::PersonaNotFound(persona_id))?;

        let chunks = self.chunker.chunk_persona(&persona);
        tracing::info!(chunk_count = chunks.len(), "building reference index");

        // Rows left behind by an earlier failed build.
        let stale = self.store.delete_persona(persona_id).await?;
        if stale > 0 {
            tracing::debug!(stale, "removed chunks from an incomplete build");
        }

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = self.embedder.embed(&texts).await.inspect_err(|e| {
                tracing::warn!(error = %e, "embedding failed, index build abandoned");
            })?;
            if embeddings.len() != batch.len() {
                return Err(IndexError::EmbeddingUnavailable(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embeddings.len()
                )));
            }

            let embedded: Vec<EmbeddedChunk> = batch
                .iter()
                .cloned()
                .zip(embeddings)
                .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding })
                .collect();
            self.store.insert(&embedded).await?;
        }

        let chunk_count = chunks.len() as u64;
        self.repo.record_index_built(persona_id, chunk_count).await?;
        self.built_here.insert(persona_id, chunk_count);
        tracing::info!(chunk_count, "reference index built");

        Ok(IndexBuild::Built { chunk_count })
    }

    /// Top-`k` chunks of `persona_id` most similar to `text`.
    #[tracing::instrument(name = "reference_index.query", skip(self, text), fields(persona_id = %persona_id, k))]
    pub async fn query(
        &self,
        persona_id: PersonaId,
        text: &str,
        k: usize,
    ) -> Result<Vec<RankedChunk>, IndexError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut embeddings = self.embedder.embed(&[text.to_string()]).await?;
        let embedding = embeddings.pop().ok_or_else(|| {
            IndexError::EmbeddingUnavailable("no embedding returned for query".to_string())
        })?;

        let results = self.store.search(persona_id, &embedding, k).await?;
        tracing::debug!(hits = results.len(), "reference chunks retrieved");
        Ok(results)
    }

    /// Drop the marker and every stored chunk, then build again.
    pub async fn rebuild(&self, persona_id: PersonaId) -> Result<IndexBuild, IndexError> {
        self.repo.clear_marker(persona_id).await?;
        self.built_here.remove(&persona_id);
        self.store.delete_persona(persona_id).await?;
        self.ensure_built(persona_id).await
    }
}
