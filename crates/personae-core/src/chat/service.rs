//! Chat service: the transport-facing facade over sessions and exchanges.
//!
//! ChatService validates identifiers, resolves sessions through the
//! SessionRegistry, and hands out answer streams. It is generic over the
//! persistence backend so personae-core never depends on personae-infra.

use std::sync::Arc;

use tracing::info;

use personae_types::conversation::{ChatTurn, validate_thread_id};
use personae_types::error::DialogueError;
use personae_types::persona::PersonaId;

use crate::dialogue::context::EngineContext;
use crate::dialogue::engine::DialogueEngine;
use crate::rag::index::IndexBuild;
use crate::repository::index_marker::IndexMarkerRepository;
use crate::repository::persona::PersonaRepository;
use crate::session::registry::SessionRegistry;
use crate::streaming::exchange::{AnswerStream, stream_exchange};

pub struct ChatService<R> {
    registry: SessionRegistry<R>,
}

impl<R> ChatService<R>
where
    R: PersonaRepository + IndexMarkerRepository + 'static,
{
    pub fn new(ctx: Arc<EngineContext<R>>) -> Self {
        Self {
            registry: SessionRegistry::new(ctx),
        }
    }

    pub fn registry(&self) -> &SessionRegistry<R> {
        &self.registry
    }

    /// Resolve or create the session for a (thread, persona) pair.
    pub async fn get_or_create_session(
        &self,
        thread_id: &str,
        persona_id: PersonaId,
    ) -> Result<Arc<DialogueEngine<R>>, DialogueError> {
        validate_thread_id(thread_id).map_err(DialogueError::Validation)?;
        self.registry.get_or_create(thread_id, persona_id).await
    }

    /// Start an exchange on `session`, streaming only the answer text.
    pub fn run_exchange(&self, session: Arc<DialogueEngine<R>>, user_text: &str) -> AnswerStream {
        let streaming = &self.registry.context().config.streaming;
        stream_exchange(session, user_text.to_string(), streaming)
    }

    /// Resolve the session and start an exchange in one step.
    pub async fn chat(
        &self,
        thread_id: &str,
        persona_id: PersonaId,
        user_text: &str,
    ) -> Result<AnswerStream, DialogueError> {
        if user_text.trim().is_empty() {
            return Err(DialogueError::Validation("query must not be empty".to_string()));
        }
        let session = self.get_or_create_session(thread_id, persona_id).await?;
        Ok(self.run_exchange(session, user_text))
    }

    /// Committed history of an existing session, oldest first.
    pub async fn get_history(
        &self,
        thread_id: &str,
        persona_id: PersonaId,
    ) -> Result<Vec<ChatTurn>, DialogueError> {
        let session = self.registry.get(thread_id, persona_id).await.ok_or_else(|| {
            DialogueError::SessionNotFound {
                thread_id: thread_id.to_string(),
                persona_id,
            }
        })?;
        Ok(session.history().await)
    }

    /// Persona ids with a live session in `thread_id`.
    pub async fn list_sessions(&self, thread_id: &str) -> Vec<PersonaId> {
        self.registry.list_personas(thread_id).await
    }

    /// Discard a session and its in-memory state.
    pub async fn evict(&self, thread_id: &str, persona_id: PersonaId) -> bool {
        self.registry.evict(thread_id, persona_id).await
    }

    /// Throw away a persona's reference index and build it again.
    pub async fn reindex(&self, persona_id: PersonaId) -> Result<IndexBuild, DialogueError> {
        let build = self.registry.context().index.rebuild(persona_id).await?;
        info!(persona_id = %persona_id, ?build, "reference index rebuilt");
        Ok(build)
    }
}
