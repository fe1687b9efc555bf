//! Per-session dialogue engine.
//!
//! Every exchange walks the same linear pipeline:
//! `SUMMARIZE_HISTORY -> CHARACTERIZE_USER -> GENERATE_RESPONSE`.
//! Stages run against a working copy of the conversation state which replaces
//! the committed state only when the whole exchange succeeds. Exchanges on
//! one engine are serialized.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span};

use personae_types::conversation::{
    ChatTurn, ConversationState, SessionKey, Stage, TokenFragment,
};
use personae_types::error::DialogueError;
use personae_types::llm::{CompletionRequest, StreamEvent};

use crate::dialogue::context::EngineContext;
use crate::dialogue::prompt::{AnswerContext, Prompt};
use crate::repository::index_marker::IndexMarkerRepository;
use crate::repository::persona::PersonaRepository;

/// Internal generation calls made before the answer once history exists:
/// history summary, user characterization, query contextualization.
const INTERNAL_CALLS_WITH_HISTORY: usize = 3;

/// What an exchange reports to an observer while it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEvent {
    /// The exchange acquired the session and is about to run. Carries the
    /// number of streamed generation calls that precede the answer.
    Started { internal_calls: usize },
    /// A piece of generated text from any stage.
    Fragment(TokenFragment),
}

/// Where generated text goes while an exchange runs.
struct Sink<'a> {
    tx: Option<&'a mpsc::Sender<ExchangeEvent>>,
    cancel: &'a CancellationToken,
}

/// Dialogue state machine bound to one (thread, persona) pair.
pub struct DialogueEngine<R> {
    key: SessionKey,
    persona_name: String,
    personality_summary: String,
    ctx: Arc<EngineContext<R>>,
    state: RwLock<ConversationState>,
    turn: Mutex<()>,
}

impl<R> DialogueEngine<R>
where
    R: PersonaRepository + IndexMarkerRepository + 'static,
{
    /// Build an engine for `key`.
    ///
    /// Loads the persona, builds its reference index if needed, and makes
    /// sure its personality summary is cached.
    #[tracing::instrument(name = "dialogue.create", skip(ctx), fields(thread_id = %key.thread_id, persona_id = %key.persona_id))]
    pub async fn create(ctx: Arc<EngineContext<R>>, key: SessionKey) -> Result<Self, DialogueError> {
        let persona = ctx
            .repo
            .get_persona(key.persona_id)
            .await?
            .ok_or(DialogueError::PersonaNotFound(key.persona_id))?;

        ctx.index.ensure_built(persona.id).await?;
        let personality_summary = ctx.summaries.get_summary(&persona).await?;

        info!(persona = %persona.name, "dialogue engine ready");

        Ok(Self {
            key,
            persona_name: persona.name,
            personality_summary,
            ctx,
            state: RwLock::new(ConversationState::default()),
            turn: Mutex::new(()),
        })
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn persona_name(&self) -> &str {
        &self.persona_name
    }

    /// Snapshot of the committed conversation state.
    pub async fn state(&self) -> ConversationState {
        self.state.read().await.clone()
    }

    /// Committed chat history, oldest first.
    pub async fn history(&self) -> Vec<ChatTurn> {
        self.state.read().await.chat_history.clone()
    }

    /// Number of streamed generation calls preceding the answer call when an
    /// exchange starts from `state`.
    pub fn internal_calls_before_answer(state: &ConversationState) -> usize {
        if state.chat_history.is_empty() {
            0
        } else {
            INTERNAL_CALLS_WITH_HISTORY
        }
    }

    /// Run one exchange without observing its tokens.
    pub async fn exchange(&self, input: &str) -> Result<ConversationState, DialogueError> {
        self.run_exchange(input, None, CancellationToken::new()).await
    }

    /// Run one exchange, reporting progress to `events`.
    ///
    /// Returns the committed state. On error or cancellation the committed
    /// state is left exactly as it was.
    #[tracing::instrument(name = "dialogue.exchange", skip(self, input, events, cancel), fields(thread_id = %self.key.thread_id, persona_id = %self.key.persona_id))]
    pub async fn run_exchange(
        &self,
        input: &str,
        events: Option<mpsc::Sender<ExchangeEvent>>,
        cancel: CancellationToken,
    ) -> Result<ConversationState, DialogueError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(DialogueError::Validation("message must not be empty".to_string()));
        }

        let _turn = tokio::select! {
            guard = self.turn.lock() => guard,
            _ = cancel.cancelled() => return Err(DialogueError::Cancelled),
        };

        let mut working = self.state.read().await.clone();
        working.input = input.to_string();
        working.context.clear();
        working.answer.clear();

        if let Some(tx) = &events {
            let internal_calls = Self::internal_calls_before_answer(&working);
            if tx.send(ExchangeEvent::Started { internal_calls }).await.is_err() {
                return Err(DialogueError::Cancelled);
            }
        }

        let sink = Sink {
            tx: events.as_ref(),
            cancel: &cancel,
        };

        self.summarize_history(&mut working, &sink).await?;
        self.characterize_user(&mut working, &sink).await?;
        self.generate_response(&mut working, &sink).await?;

        *self.state.write().await = working.clone();
        debug!(history_len = working.chat_history.len(), "exchange committed");
        Ok(working)
    }

    async fn summarize_history(
        &self,
        working: &mut ConversationState,
        sink: &Sink<'_>,
    ) -> Result<(), DialogueError> {
        if working.chat_history.is_empty() {
            working.chat_summary.clear();
            return Ok(());
        }

        let window = working.history_window(self.ctx.config.dialogue.history_window);
        let prompt =
            self.ctx
                .prompts
                .summarize_history(&self.persona_name, &working.chat_summary, window);
        let model = self.ctx.config.llm.light_model.clone();
        let summary = self.generate(Stage::SummarizeHistory, model, prompt, sink).await?;
        working.chat_summary = summary.trim().to_string();
        Ok(())
    }

    async fn characterize_user(
        &self,
        working: &mut ConversationState,
        sink: &Sink<'_>,
    ) -> Result<(), DialogueError> {
        if working.chat_history.is_empty() {
            return Ok(());
        }

        let window = working.history_window(self.ctx.config.dialogue.history_window);
        let prompt = self.ctx.prompts.characterize_user(
            &self.persona_name,
            &working.user_characterization,
            &working.chat_summary,
            window,
        );
        let model = self.ctx.config.llm.light_model.clone();
        let characterization = self.generate(Stage::CharacterizeUser, model, prompt, sink).await?;
        let characterization = characterization.trim();
        if !characterization.is_empty() {
            working.user_characterization = characterization.to_string();
        }
        Ok(())
    }

    async fn generate_response(
        &self,
        working: &mut ConversationState,
        sink: &Sink<'_>,
    ) -> Result<(), DialogueError> {
        let query = if working.chat_history.is_empty() {
            working.input.clone()
        } else {
            let prompt = self.ctx.prompts.contextualize_query(
                &self.persona_name,
                &working.chat_history,
                &working.input,
            );
            let model = self.ctx.config.llm.light_model.clone();
            let query = self
                .generate(Stage::ContextualizeQuery, model, prompt, sink)
                .await?;
            let query = query.trim();
            if query.is_empty() {
                working.input.clone()
            } else {
                query.to_string()
            }
        };

        let hits = tokio::select! {
            biased;
            _ = sink.cancel.cancelled() => return Err(DialogueError::Cancelled),
            hits = self.ctx.index.query(self.key.persona_id, &query, self.ctx.config.retrieval.k) => hits?,
        };
        working.context = hits
            .iter()
            .map(|hit| hit.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = self.ctx.prompts.answer(AnswerContext {
            persona_name: &self.persona_name,
            personality_summary: &self.personality_summary,
            user_characterization: &working.user_characterization,
            chat_summary: &working.chat_summary,
            context: &working.context,
            chat_history: &working.chat_history,
            input: &working.input,
        });
        let model = self.ctx.config.llm.capable_model.clone();
        let answer = self.generate(Stage::GenerateResponse, model, prompt, sink).await?;

        working.chat_history.push(ChatTurn::human(working.input.clone()));
        working.chat_history.push(ChatTurn::persona(answer.clone()));
        working.answer = answer;
        Ok(())
    }

    /// Stream one generation call, forwarding every text delta to the sink,
    /// and return the concatenated text.
    async fn generate(
        &self,
        stage: Stage,
        model: String,
        prompt: Prompt,
        sink: &Sink<'_>,
    ) -> Result<String, DialogueError> {
        let llm = &self.ctx.config.llm;
        let request = CompletionRequest {
            model,
            messages: prompt.messages,
            system: prompt.system,
            max_tokens: self.ctx.provider.output_budget(llm.max_tokens),
            temperature: Some(llm.temperature),
            stream: true,
        };

        let span = info_span!(
            "gen_ai.stream",
            gen_ai.system = self.ctx.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.operation.name = %stage,
        );

        async move {
            let mut stream = self.ctx.provider.stream(request);
            let mut text = String::new();

            loop {
                let event = tokio::select! {
                    biased;
                    _ = sink.cancel.cancelled() => return Err(DialogueError::Cancelled),
                    event = stream.next() => event,
                };

                match event {
                    None | Some(Ok(StreamEvent::Done)) => break,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "generation failed");
                        return Err(e.into());
                    }
                    Some(Ok(StreamEvent::TextDelta {
                        generation_id,
                        text: delta,
                    })) => {
                        text.push_str(&delta);
                        if let Some(tx) = sink.tx {
                            let fragment = TokenFragment {
                                stage,
                                generation_id,
                                text: delta,
                            };
                            if tx.send(ExchangeEvent::Fragment(fragment)).await.is_err() {
                                return Err(DialogueError::Cancelled);
                            }
                        }
                    }
                    Some(Ok(StreamEvent::Usage(usage))) => {
                        debug!(
                            input_tokens = usage.input_tokens,
                            output_tokens = usage.output_tokens,
                            "generation usage"
                        );
                    }
                    Some(Ok(_)) => {}
                }
            }

            Ok(text)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::testing::{
        InMemoryRepo, ScriptedProvider, WordEmbedder, sample_persona, test_context, test_context_with,
    };
    use personae_types::config::EngineConfig;
    use personae_types::conversation::Speaker;
    use personae_types::persona::PersonaId;

    async fn engine(provider: ScriptedProvider) -> (DialogueEngine<InMemoryRepo>, Arc<InMemoryRepo>) {
        let repo = Arc::new(InMemoryRepo::with_personas(vec![sample_persona(7, "Sasuke")]));
        let ctx = test_context(repo.clone(), provider);
        let engine = DialogueEngine::create(ctx, SessionKey::new("t1", PersonaId(7)))
            .await
            .unwrap();
        (engine, repo)
    }

    #[tokio::test]
    async fn test_first_exchange_appends_one_pair() {
        let provider = ScriptedProvider::default();
        let (engine, _) = engine(provider.clone()).await;
        // Persona summary generation at construction.
        assert_eq!(provider.call_count(), 1);

        let state = engine.exchange("Where do you train?").await.unwrap();

        assert!(!state.answer.is_empty());
        assert_eq!(state.chat_history.len(), 2);
        assert_eq!(state.chat_history[0].speaker, Speaker::Human);
        assert_eq!(state.chat_history[0].text, "Where do you train?");
        assert_eq!(state.chat_history[1].speaker, Speaker::Persona);
        assert_eq!(state.chat_history[1].text, state.answer);
        assert_eq!(state.user_characterization, "a complete stranger");
        assert!(state.chat_summary.is_empty());
        assert!(!state.context.is_empty());
        // Empty history: only the answer call.
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_second_exchange_runs_every_stage() {
        let provider = ScriptedProvider::with_reply(|request| {
            let prompt = request
                .messages
                .last()
                .map(|m| m.content.as_str())
                .unwrap_or_default();
            if prompt.contains("running summary") {
                "They met.".to_string()
            } else if prompt.contains("Describe in one or two sentences") {
                "A curious traveler.".to_string()
            } else if prompt.ends_with("Query:") {
                "Sasuke training place".to_string()
            } else if request.system.is_some() {
                "The forest.".to_string()
            } else {
                "Aloof.".to_string()
            }
        });
        let (engine, _) = engine(provider.clone()).await;

        engine.exchange("Hi there").await.unwrap();
        let state = engine.exchange("Where do you train?").await.unwrap();

        assert_eq!(state.chat_summary, "They met.");
        assert_eq!(state.user_characterization, "A curious traveler.");
        assert_eq!(state.answer, "The forest.");
        assert_eq!(state.chat_history.len(), 4);

        let models: Vec<String> = provider.requests().iter().map(|r| r.model.clone()).collect();
        let config = personae_types::config::LlmConfig::default();
        // summary, answer, then summarize/characterize/contextualize/answer
        assert_eq!(
            models,
            vec![
                config.light_model.clone(),
                config.capable_model.clone(),
                config.light_model.clone(),
                config.light_model.clone(),
                config.light_model.clone(),
                config.capable_model.clone(),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_exchange_commits_nothing() {
        let provider = ScriptedProvider::default();
        let (engine, _) = engine(provider.clone()).await;
        engine.exchange("Hi there").await.unwrap();
        let before = engine.state().await;

        // Calls so far: summary, answer. Next exchange fails at characterize.
        provider.fail_from_call(3);
        let err = engine.exchange("Where do you train?").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(engine.state().await, before);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let (engine, _) = engine(ScriptedProvider::default()).await;
        let err = engine.exchange("   ").await.unwrap_err();
        assert!(matches!(err, DialogueError::Validation(_)));
        assert!(engine.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_internal_call_count() {
        let mut state = ConversationState::default();
        assert_eq!(DialogueEngine::<InMemoryRepo>::internal_calls_before_answer(&state), 0);
        state.chat_history.push(ChatTurn::human("hi"));
        state.chat_history.push(ChatTurn::persona("hn."));
        assert_eq!(DialogueEngine::<InMemoryRepo>::internal_calls_before_answer(&state), 3);
    }

    #[tokio::test]
    async fn test_fragments_are_stage_tagged() {
        let provider = ScriptedProvider::default();
        let (engine, _) = engine(provider).await;
        engine.exchange("Hi there").await.unwrap();

        let (tx, mut rx) = mpsc::channel(256);
        let state = engine
            .run_exchange("Where do you train?", Some(tx), CancellationToken::new())
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events[0], ExchangeEvent::Started { internal_calls: 3 });

        let fragments: Vec<TokenFragment> = events
            .into_iter()
            .filter_map(|e| match e {
                ExchangeEvent::Fragment(f) => Some(f),
                ExchangeEvent::Started { .. } => None,
            })
            .collect();
        let stages: Vec<Stage> = {
            let mut seen = Vec::new();
            for f in &fragments {
                if seen.last() != Some(&f.stage) {
                    seen.push(f.stage);
                }
            }
            seen
        };
        assert_eq!(
            stages,
            vec![
                Stage::SummarizeHistory,
                Stage::CharacterizeUser,
                Stage::ContextualizeQuery,
                Stage::GenerateResponse,
            ]
        );
        let answer: String = fragments
            .iter()
            .filter(|f| f.stage == Stage::GenerateResponse)
            .map(|f| f.text.as_str())
            .collect();
        assert_eq!(answer, state.answer);
    }

    #[tokio::test]
    async fn test_cancelled_exchange_keeps_prior_state() {
        let provider = ScriptedProvider::default();
        let (engine, _) = engine(provider.clone()).await;
        engine.exchange("Hi there").await.unwrap();
        let before = engine.state().await;

        provider.hang_after_first_token(true);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let (tx, mut rx) = mpsc::channel(16);
        let run = engine.run_exchange("Where do you train?", Some(tx), cancel);
        let stop = async move {
            // Wait for the first fragment, then cancel.
            while let Some(event) = rx.recv().await {
                if matches!(event, ExchangeEvent::Fragment(_)) {
                    trigger.cancel();
                    break;
                }
            }
        };
        let (result, ()) = tokio::join!(run, stop);

        assert!(matches!(result, Err(DialogueError::Cancelled)));
        assert_eq!(engine.state().await, before);
    }

    #[tokio::test]
    async fn test_requests_respect_provider_output_limit() {
        let provider = ScriptedProvider::default().with_output_limit(256);
        let (engine, _) = engine(provider.clone()).await;
        engine.exchange("Hi there").await.unwrap();
        engine.exchange("Where do you train?").await.unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 6);
        assert!(requests.iter().all(|r| r.max_tokens == 256));
    }

    #[tokio::test]
    async fn test_cancel_during_retrieval() {
        let repo = Arc::new(InMemoryRepo::with_personas(vec![sample_persona(7, "Sasuke")]));
        let embedder = WordEmbedder::default();
        let ctx = test_context_with(
            repo,
            ScriptedProvider::default(),
            embedder.clone(),
            EngineConfig::default(),
        );
        let engine = DialogueEngine::create(ctx, SessionKey::new("t1", PersonaId(7)))
            .await
            .unwrap();

        // The first exchange goes straight to retrieval, which now stalls.
        embedder.set_hanging(true);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            engine.run_exchange("Where do you train?", None, cancel),
        )
        .await
        .expect("retrieval ignored cancellation");
        assert!(matches!(result, Err(DialogueError::Cancelled)));
        assert!(engine.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_persona() {
        let repo = Arc::new(InMemoryRepo::default());
        let ctx = test_context(repo, ScriptedProvider::default());
        let result = DialogueEngine::create(ctx, SessionKey::new("t1", PersonaId(404))).await;
        assert!(matches!(result, Err(DialogueError::PersonaNotFound(PersonaId(404)))));
    }
}
