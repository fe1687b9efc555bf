//! In-process fakes shared by the unit tests of this crate.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{Stream, StreamExt, stream};

use personae_types::config::EngineConfig;
use personae_types::error::{IndexError, RepositoryError};
use personae_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities, StopReason,
    StreamEvent, Usage,
};
use personae_types::persona::{Persona, PersonaField, PersonaId, ReferenceSection};
use personae_types::reference::{EmbeddedChunk, RankedChunk};

use crate::dialogue::context::EngineContext;
use crate::dialogue::prompt::DefaultPrompts;
use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::provider::LlmProvider;
use crate::rag::box_embedder::BoxEmbedder;
use crate::rag::box_store::BoxReferenceStore;
use crate::rag::embedder::Embedder;
use crate::rag::store::ReferenceStore;
use crate::repository::index_marker::IndexMarkerRepository;
use crate::repository::persona::PersonaRepository;

pub fn sample_persona(id: i64, name: &str) -> Persona {
    Persona {
        id: PersonaId(id),
        name: name.to_string(),
        biography: format!(
            "{name} is a shinobi from the Hidden Leaf Village. {name} left the village to grow stronger."
        ),
        personality: format!("{name} is proud, stubborn and fiercely loyal to a few friends."),
        summarized_personality: None,
        sections: vec![
            ReferenceSection {
                text: format!("{name} trains every morning in the forest near the river."),
                tag_1: Some("Abilities".to_string()),
                tag_2: Some("Training".to_string()),
                tag_3: None,
            },
            ReferenceSection {
                text: format!("{name} fights with a sword and lightning techniques."),
                tag_1: Some("Abilities".to_string()),
                tag_2: Some("Combat".to_string()),
                tag_3: None,
            },
        ],
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryRepo {
    personas: Mutex<HashMap<PersonaId, Persona>>,
    markers: Mutex<HashMap<PersonaId, u64>>,
    marker_writes: AtomicUsize,
    field_writes: AtomicUsize,
}

impl InMemoryRepo {
    pub fn with_personas(personas: Vec<Persona>) -> Self {
        let repo = Self::default();
        {
            let mut map = repo.personas.lock().unwrap();
            for persona in personas {
                map.insert(persona.id, persona);
            }
        }
        repo
    }

    pub fn persona(&self, id: PersonaId) -> Option<Persona> {
        self.personas.lock().unwrap().get(&id).cloned()
    }

    /// Number of successful `record_index_built` calls.
    pub fn marker_writes(&self) -> usize {
        self.marker_writes.load(Ordering::SeqCst)
    }

    /// Number of compare-and-set updates that actually wrote.
    pub fn field_writes(&self) -> usize {
        self.field_writes.load(Ordering::SeqCst)
    }
}

impl PersonaRepository for InMemoryRepo {
    async fn get_persona(&self, id: PersonaId) -> Result<Option<Persona>, RepositoryError> {
        Ok(self.persona(id))
    }

    async fn update_persona_field(
        &self,
        id: PersonaId,
        field: PersonaField,
        value: &str,
    ) -> Result<bool, RepositoryError> {
        let mut map = self.personas.lock().unwrap();
        let persona = map.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        match field {
            PersonaField::SummarizedPersonality => {
                if persona.summarized_personality.is_some() {
                    return Ok(false);
                }
                persona.summarized_personality = Some(value.to_string());
            }
        }
        self.field_writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

impl IndexMarkerRepository for InMemoryRepo {
    async fn marker_exists(&self, id: PersonaId) -> Result<bool, RepositoryError> {
        Ok(self.markers.lock().unwrap().contains_key(&id))
    }

    async fn record_index_built(&self, id: PersonaId, chunk_count: u64) -> Result<(), RepositoryError> {
        self.markers.lock().unwrap().insert(id, chunk_count);
        self.marker_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear_marker(&self, id: PersonaId) -> Result<bool, RepositoryError> {
        Ok(self.markers.lock().unwrap().remove(&id).is_some())
    }
}

// ---------------------------------------------------------------------------
// Embedder
// ---------------------------------------------------------------------------

const WORD_DIMENSION: usize = 32;

/// Bag-of-words embedder: each lowercase word is hashed into one of
/// `WORD_DIMENSION` buckets.
#[derive(Clone)]
pub struct WordEmbedder {
    state: Arc<WordEmbedderState>,
}

struct WordEmbedderState {
    failing: AtomicBool,
    hanging: AtomicBool,
    fail_after: AtomicUsize,
    calls: AtomicUsize,
}

impl Default for WordEmbedder {
    fn default() -> Self {
        Self {
            state: Arc::new(WordEmbedderState {
                failing: AtomicBool::new(false),
                hanging: AtomicBool::new(false),
                fail_after: AtomicUsize::new(usize::MAX),
                calls: AtomicUsize::new(0),
            }),
        }
    }
}

impl WordEmbedder {
    /// Toggle outright failure. Turning it off also clears `fail_after_calls`.
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
        if !failing {
            self.state.fail_after.store(usize::MAX, Ordering::SeqCst);
        }
    }

    /// Let the next `n` calls succeed and fail every call after them.
    pub fn fail_after_calls(&self, n: usize) {
        let seen = self.state.calls.load(Ordering::SeqCst);
        self.state.fail_after.store(seen + n, Ordering::SeqCst);
    }

    /// Calls never complete while set.
    pub fn set_hanging(&self, hanging: bool) {
        self.state.hanging.store(hanging, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; WORD_DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in word.to_lowercase().bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0100_0000_01b3);
            }
            v[(hash % WORD_DIMENSION as u64) as usize] += 1.0;
        }
        v
    }
}

impl Embedder for WordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        let call = self.state.calls.fetch_add(1, Ordering::SeqCst);
        if self.state.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.state.failing.load(Ordering::SeqCst)
            || call >= self.state.fail_after.load(Ordering::SeqCst)
        {
            return Err(IndexError::EmbeddingUnavailable("connection refused".to_string()));
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn model_name(&self) -> &str {
        "word-hash"
    }

    fn dimension(&self) -> usize {
        WORD_DIMENSION
    }
}

// ---------------------------------------------------------------------------
// Reference store
// ---------------------------------------------------------------------------

/// Volatile by default, like the in-process backend.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<EmbeddedChunk>>,
    durable: bool,
}

impl MemoryStore {
    /// A store that claims its rows survive restarts.
    pub fn durable() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            durable: true,
        }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

impl ReferenceStore for MemoryStore {
    async fn insert(&self, chunks: &[EmbeddedChunk]) -> Result<(), IndexError> {
        self.rows.lock().unwrap().extend_from_slice(chunks);
        Ok(())
    }

    async fn search(
        &self,
        persona_id: PersonaId,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<RankedChunk>, IndexError> {
        let rows = self.rows.lock().unwrap();
        let mut ranked: Vec<RankedChunk> = rows
            .iter()
            .filter(|r| r.chunk.persona_id == persona_id)
            .map(|r| RankedChunk {
                chunk: r.chunk.clone(),
                similarity: cosine(query_embedding, &r.embedding),
            })
            .collect();
        ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn delete_persona(&self, persona_id: PersonaId) -> Result<u64, IndexError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.chunk.persona_id != persona_id);
        Ok((before - rows.len()) as u64)
    }

    async fn count(&self, persona_id: PersonaId) -> Result<u64, IndexError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().filter(|r| r.chunk.persona_id == persona_id).count() as u64)
    }

    fn is_durable(&self) -> bool {
        self.durable
    }
}

// ---------------------------------------------------------------------------
// LLM provider
// ---------------------------------------------------------------------------

type ReplyFn = dyn Fn(&CompletionRequest) -> String + Send + Sync;

/// Provider that answers deterministically from the request contents and
/// streams the reply word by word.
#[derive(Clone)]
pub struct ScriptedProvider {
    inner: Arc<ScriptedInner>,
}

struct ScriptedInner {
    capabilities: ProviderCapabilities,
    reply: Box<ReplyFn>,
    requests: Mutex<Vec<CompletionRequest>>,
    next_id: AtomicU64,
    fail_from: AtomicUsize,
    hang: AtomicBool,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::with_reply(|request| {
            let words: usize = request
                .messages
                .iter()
                .map(|m| m.content.split_whitespace().count())
                .sum();
            format!("{} heard {} words.", request.model, words)
        })
    }
}

impl ScriptedProvider {
    pub fn with_reply(reply: impl Fn(&CompletionRequest) -> String + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(ScriptedInner {
                capabilities: ProviderCapabilities {
                    streaming: true,
                    max_context_tokens: 32_000,
                    max_output_tokens: 1024,
                },
                reply: Box::new(reply),
                requests: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                fail_from: AtomicUsize::new(usize::MAX),
                hang: AtomicBool::new(false),
            }),
        }
    }

    /// Advertise a smaller output budget than the default 1024 tokens.
    pub fn with_output_limit(mut self, max_output_tokens: u32) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.capabilities.max_output_tokens = max_output_tokens;
        }
        self
    }

    /// Make call number `n` (0-based) and every later call fail.
    pub fn fail_from_call(&self, n: usize) {
        self.inner.fail_from.store(n, Ordering::SeqCst);
    }

    /// Streams emit their first word and then never finish.
    pub fn hang_after_first_token(&self, hang: bool) {
        self.inner.hang.store(hang, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.inner.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.inner.requests.lock().unwrap().clone()
    }

    fn record(&self, request: &CompletionRequest) -> Result<(String, String), LlmError> {
        let index = {
            let mut requests = self.inner.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };
        if index >= self.inner.fail_from.load(Ordering::SeqCst) {
            return Err(LlmError::Provider {
                message: "connection reset".to_string(),
            });
        }
        let id = format!("gen-{}", self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        Ok((id, (self.inner.reply)(request)))
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.inner.capabilities
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (id, content) = self.record(request)?;
        Ok(CompletionResponse {
            id,
            content,
            model: request.model.clone(),
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
        })
    }

    fn stream(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>> {
        let (generation_id, reply) = match self.record(&request) {
            Ok(ok) => ok,
            Err(e) => return Box::pin(stream::iter(vec![Err(e)])),
        };

        let mut events = vec![Ok(StreamEvent::Connected)];
        let words: Vec<String> = reply.split_inclusive(' ').map(str::to_string).collect();

        if self.inner.hang.load(Ordering::SeqCst) {
            if let Some(first) = words.into_iter().next() {
                events.push(Ok(StreamEvent::TextDelta {
                    generation_id,
                    text: first,
                }));
            }
            return Box::pin(stream::iter(events).chain(stream::pending()));
        }

        events.extend(words.into_iter().map(|text| {
            Ok(StreamEvent::TextDelta {
                generation_id: generation_id.clone(),
                text,
            })
        }));
        events.push(Ok(StreamEvent::MessageDelta {
            stop_reason: StopReason::EndTurn,
        }));
        events.push(Ok(StreamEvent::Done));
        Box::pin(stream::iter(events))
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Engine context over in-memory fakes with default configuration.
pub fn test_context(
    repo: Arc<InMemoryRepo>,
    provider: ScriptedProvider,
) -> Arc<EngineContext<InMemoryRepo>> {
    test_context_with(repo, provider, WordEmbedder::default(), EngineConfig::default())
}

pub fn test_context_with(
    repo: Arc<InMemoryRepo>,
    provider: ScriptedProvider,
    embedder: WordEmbedder,
    config: EngineConfig,
) -> Arc<EngineContext<InMemoryRepo>> {
    Arc::new(
        EngineContext::new(
            repo,
            BoxLlmProvider::new(provider),
            BoxEmbedder::new(embedder),
            BoxReferenceStore::new(MemoryStore::default()),
            Arc::new(DefaultPrompts),
            config,
        )
        .unwrap(),
    )
}
