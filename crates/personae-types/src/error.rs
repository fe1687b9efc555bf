use thiserror::Error;

use crate::persona::PersonaId;

/// Errors from repository operations (used by trait definitions in personae-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from reference index builds and queries.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("persona {0} not found")]
    PersonaNotFound(PersonaId),

    /// The embedding backend could not be reached. The build was abandoned
    /// without recording a marker, so the next call retries.
    #[error("embedding backend unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("vector store error: {0}")]
    Store(String),

    #[error("chunking error: {0}")]
    Chunking(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl IndexError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexError::EmbeddingUnavailable(_))
    }
}

/// Errors surfaced by the dialogue engine and session layer.
#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("persona {0} not found")]
    PersonaNotFound(PersonaId),

    #[error("no session for persona {persona_id} in thread '{thread_id}'")]
    SessionNotFound {
        thread_id: String,
        persona_id: PersonaId,
    },

    /// A generation or retrieval backend failed; the caller may retry.
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("exchange cancelled")]
    Cancelled,
}

impl DialogueError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DialogueError::CapabilityUnavailable(_) => true,
            DialogueError::Index(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DialogueError::PersonaNotFound(_)
                | DialogueError::SessionNotFound { .. }
                | DialogueError::Index(IndexError::PersonaNotFound(_))
                | DialogueError::Repository(RepositoryError::NotFound)
        )
    }
}

impl From<crate::llm::LlmError> for DialogueError {
    fn from(e: crate::llm::LlmError) -> Self {
        DialogueError::CapabilityUnavailable(e.to_string())
    }
}
