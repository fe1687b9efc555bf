//! Persona summary cache.
//!
//! The condensed personality is generated once per persona and written back
//! to the persona record. Once set it is never recomputed, even if the raw
//! personality text later changes.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{Instrument, info_span};

use personae_types::config::LlmConfig;
use personae_types::error::DialogueError;
use personae_types::llm::CompletionRequest;
use personae_types::persona::{Persona, PersonaField, PersonaId};

use crate::dialogue::prompt::PromptTemplates;
use crate::llm::box_provider::BoxLlmProvider;
use crate::repository::persona::PersonaRepository;

pub struct PersonaSummaryCache<R> {
    repo: Arc<R>,
    provider: Arc<BoxLlmProvider>,
    prompts: Arc<dyn PromptTemplates>,
    llm: LlmConfig,
    locks: DashMap<PersonaId, Arc<Mutex<()>>>,
}

impl<R: PersonaRepository> PersonaSummaryCache<R> {
    pub fn new(
        repo: Arc<R>,
        provider: Arc<BoxLlmProvider>,
        prompts: Arc<dyn PromptTemplates>,
        llm: LlmConfig,
    ) -> Self {
        Self {
            repo,
            provider,
            prompts,
            llm,
            locks: DashMap::new(),
        }
    }

    /// Return the persona's summarized personality, generating and persisting
    /// it on first use.
    #[tracing::instrument(name = "persona_summary.get", skip(self, persona), fields(persona_id = %persona.id))]
    pub async fn get_summary(&self, persona: &Persona) -> Result<String, DialogueError> {
        if let Some(summary) = &persona.summarized_personality {
            return Ok(summary.clone());
        }
        if persona.personality.trim().is_empty() {
            return Ok(String::new());
        }

        let lock = self
            .locks
            .entry(persona.id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another caller may have finished while we waited.
        if let Some(summary) = self.stored_summary(persona.id).await? {
            return Ok(summary);
        }

        let prompt = self
            .prompts
            .summarize_personality(&persona.name, &persona.personality);
        let request = CompletionRequest {
            model: self.llm.light_model.clone(),
            messages: prompt.messages,
            system: prompt.system,
            max_tokens: self.provider.output_budget(self.llm.max_tokens),
            temperature: Some(self.llm.temperature),
            stream: false,
        };

        let span = info_span!(
            "gen_ai.complete",
            gen_ai.system = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.operation.name = "summarize_personality",
        );
        let response = self.provider.complete(&request).instrument(span).await?;
        let summary = response.content.trim().to_string();

        let wrote = self
            .repo
            .update_persona_field(persona.id, PersonaField::SummarizedPersonality, &summary)
            .await?;
        if wrote {
            tracing::info!("persona summary generated and stored");
            return Ok(summary);
        }

        tracing::debug!("persona summary already stored by another writer");
        Ok(self.stored_summary(persona.id).await?.unwrap_or(summary))
    }

    async fn stored_summary(&self, id: PersonaId) -> Result<Option<String>, DialogueError> {
        let persona = self
            .repo
            .get_persona(id)
            .await?
            .ok_or(DialogueError::PersonaNotFound(id))?;
        Ok(persona.summarized_personality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::prompt::DefaultPrompts;
    use crate::testing::{InMemoryRepo, ScriptedProvider, sample_persona};

    fn cache(repo: Arc<InMemoryRepo>, provider: ScriptedProvider) -> PersonaSummaryCache<InMemoryRepo> {
        PersonaSummaryCache::new(
            repo,
            Arc::new(BoxLlmProvider::new(provider)),
            Arc::new(DefaultPrompts),
            LlmConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_summary_generated_once() {
        let repo = Arc::new(InMemoryRepo::with_personas(vec![sample_persona(7, "Sasuke")]));
        let provider = ScriptedProvider::with_reply(|_| "Proud and loyal.".to_string());
        let cache = cache(repo.clone(), provider.clone());

        let persona = repo.persona(PersonaId(7)).unwrap();
        let first = cache.get_summary(&persona).await.unwrap();
        let second = cache.get_summary(&persona).await.unwrap();

        assert_eq!(first, "Proud and loyal.");
        assert_eq!(first, second);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(repo.field_writes(), 1);
        assert_eq!(
            repo.persona(PersonaId(7)).unwrap().summarized_personality.as_deref(),
            Some("Proud and loyal.")
        );
    }

    #[tokio::test]
    async fn test_existing_summary_is_never_recomputed() {
        let mut persona = sample_persona(7, "Sasuke");
        persona.summarized_personality = Some("Cached.".to_string());
        persona.personality = "Completely different now.".to_string();
        let repo = Arc::new(InMemoryRepo::with_personas(vec![persona.clone()]));
        let provider = ScriptedProvider::default();
        let cache = cache(repo, provider.clone());

        assert_eq!(cache.get_summary(&persona).await.unwrap(), "Cached.");
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_personality_skips_generation() {
        let mut persona = sample_persona(7, "Sasuke");
        persona.personality = "  ".to_string();
        let repo = Arc::new(InMemoryRepo::with_personas(vec![persona.clone()]));
        let provider = ScriptedProvider::default();
        let cache = cache(repo.clone(), provider.clone());

        assert_eq!(cache.get_summary(&persona).await.unwrap(), "");
        assert_eq!(provider.call_count(), 0);
        assert_eq!(repo.field_writes(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_first_callers_share_one_generation() {
        let repo = Arc::new(InMemoryRepo::with_personas(vec![sample_persona(7, "Sasuke")]));
        let provider = ScriptedProvider::with_reply(|_| "Brooding.".to_string());
        let cache = Arc::new(cache(repo.clone(), provider.clone()));
        let persona = repo.persona(PersonaId(7)).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let persona = persona.clone();
                tokio::spawn(async move { cache.get_summary(&persona).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "Brooding.");
        }
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_is_retryable_and_not_stored() {
        let repo = Arc::new(InMemoryRepo::with_personas(vec![sample_persona(7, "Sasuke")]));
        let provider = ScriptedProvider::default();
        provider.fail_from_call(0);
        let cache = cache(repo.clone(), provider);

        let persona = repo.persona(PersonaId(7)).unwrap();
        let err = cache.get_summary(&persona).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(repo.persona(PersonaId(7)).unwrap().summarized_personality.is_none());
    }
}
