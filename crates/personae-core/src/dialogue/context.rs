//! Collaborators shared by every dialogue engine instance.

use std::sync::Arc;

use personae_types::config::EngineConfig;
use personae_types::error::IndexError;

use crate::dialogue::prompt::PromptTemplates;
use crate::llm::box_provider::BoxLlmProvider;
use crate::persona::summary::PersonaSummaryCache;
use crate::rag::box_embedder::BoxEmbedder;
use crate::rag::box_store::BoxReferenceStore;
use crate::rag::chunker::ReferenceChunker;
use crate::rag::index::ReferenceIndex;
use crate::repository::index_marker::IndexMarkerRepository;
use crate::repository::persona::PersonaRepository;

/// Process-wide capabilities the engines are built from.
///
/// `R` is the persistence backend; it serves both persona records and index
/// build markers.
pub struct EngineContext<R> {
    pub repo: Arc<R>,
    pub provider: Arc<BoxLlmProvider>,
    pub index: ReferenceIndex<R>,
    pub summaries: PersonaSummaryCache<R>,
    pub prompts: Arc<dyn PromptTemplates>,
    pub config: EngineConfig,
}

impl<R> EngineContext<R>
where
    R: PersonaRepository + IndexMarkerRepository,
{
    pub fn new(
        repo: Arc<R>,
        provider: BoxLlmProvider,
        embedder: BoxEmbedder,
        store: BoxReferenceStore,
        prompts: Arc<dyn PromptTemplates>,
        config: EngineConfig,
    ) -> Result<Self, IndexError> {
        let provider = Arc::new(provider);
        let chunker = ReferenceChunker::new(config.index.chunk_size, config.index.chunk_overlap)?;
        let index = ReferenceIndex::new(
            repo.clone(),
            Arc::new(embedder),
            Arc::new(store),
            chunker,
            config.embedding.batch_size,
        );
        let summaries = PersonaSummaryCache::new(
            repo.clone(),
            provider.clone(),
            prompts.clone(),
            config.llm.clone(),
        );

        Ok(Self {
            repo,
            provider,
            index,
            summaries,
            prompts,
            config,
        })
    }
}
