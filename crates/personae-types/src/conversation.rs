//! Conversation state, session keys, and dialogue stages.
//!
//! `ConversationState` is the working memory the dialogue pipeline threads
//! through its stages. It lives only in process memory.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::persona::PersonaId;

/// Characterization used before anything is known about the human.
pub const DEFAULT_USER_CHARACTERIZATION: &str = "a complete stranger";

/// Longest accepted thread identifier, in characters.
pub const MAX_THREAD_ID_LEN: usize = 128;

/// Who said a line of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Human,
    Persona,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Human => write!(f, "human"),
            Speaker::Persona => write!(f, "persona"),
        }
    }
}

impl FromStr for Speaker {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Speaker::Human),
            "persona" => Ok(Speaker::Persona),
            other => Err(format!("invalid speaker: '{other}'")),
        }
    }
}

/// One line of chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    #[serde(rename = "sender")]
    pub speaker: Speaker,
    pub text: String,
}

impl ChatTurn {
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Human,
            text: text.into(),
        }
    }

    pub fn persona(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Persona,
            text: text.into(),
        }
    }
}

/// Per-session working memory of the dialogue pipeline.
///
/// `chat_history` is chronological and grows by one (human, persona) pair per
/// successful exchange. The other fields are overwritten stage by stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub input: String,
    pub chat_history: Vec<ChatTurn>,
    pub chat_summary: String,
    pub user_characterization: String,
    pub context: String,
    pub answer: String,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            input: String::new(),
            chat_history: Vec::new(),
            chat_summary: String::new(),
            user_characterization: DEFAULT_USER_CHARACTERIZATION.to_string(),
            context: String::new(),
            answer: String::new(),
        }
    }
}

impl ConversationState {
    /// The last `n` turns of history, oldest first.
    pub fn history_window(&self, n: usize) -> &[ChatTurn] {
        let start = self.chat_history.len().saturating_sub(n);
        &self.chat_history[start..]
    }
}

/// Identifies one dialogue engine instance: a persona within a thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub thread_id: String,
    pub persona_id: PersonaId,
}

impl SessionKey {
    pub fn new(thread_id: impl Into<String>, persona_id: PersonaId) -> Self {
        Self {
            thread_id: thread_id.into(),
            persona_id,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.thread_id, self.persona_id)
    }
}

/// Check a thread identifier at the transport boundary.
pub fn validate_thread_id(thread_id: &str) -> Result<(), String> {
    if thread_id.trim().is_empty() {
        return Err("thread_id must not be empty".to_string());
    }
    if thread_id.chars().count() > MAX_THREAD_ID_LEN {
        return Err(format!(
            "thread_id must be at most {MAX_THREAD_ID_LEN} characters"
        ));
    }
    Ok(())
}

/// Pipeline stage that produced a piece of generated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SummarizeHistory,
    CharacterizeUser,
    ContextualizeQuery,
    GenerateResponse,
}

impl Stage {
    /// Only the final response is shown to the human.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Stage::GenerateResponse)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::SummarizeHistory => write!(f, "summarize_history"),
            Stage::CharacterizeUser => write!(f, "characterize_user"),
            Stage::ContextualizeQuery => write!(f, "contextualize_query"),
            Stage::GenerateResponse => write!(f, "generate_response"),
        }
    }
}

/// A streamed piece of generated text, tagged with its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenFragment {
    pub stage: Stage,
    /// Identifier of the generation call that produced this fragment.
    pub generation_id: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_characterization() {
        let state = ConversationState::default();
        assert_eq!(state.user_characterization, "a complete stranger");
        assert!(state.chat_history.is_empty());
    }

    #[test]
    fn test_history_window() {
        let mut state = ConversationState::default();
        assert!(state.history_window(2).is_empty());
        state.chat_history.push(ChatTurn::human("hi"));
        state.chat_history.push(ChatTurn::persona("hello"));
        state.chat_history.push(ChatTurn::human("how are you?"));
        let window = state.history_window(2);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0], ChatTurn::persona("hello"));
        assert_eq!(state.history_window(10).len(), 3);
    }

    #[test]
    fn test_chat_turn_serializes_sender() {
        let json = serde_json::to_value(ChatTurn::human("yo")).unwrap();
        assert_eq!(json["sender"], "human");
        assert_eq!(json["text"], "yo");
    }

    #[test]
    fn test_validate_thread_id() {
        assert!(validate_thread_id("t1").is_ok());
        assert!(validate_thread_id("  ").is_err());
        assert!(validate_thread_id(&"x".repeat(129)).is_err());
        assert!(validate_thread_id(&"x".repeat(128)).is_ok());
    }

    #[test]
    fn test_stage_visibility() {
        assert!(Stage::GenerateResponse.is_user_visible());
        assert!(!Stage::SummarizeHistory.is_user_visible());
        assert!(!Stage::ContextualizeQuery.is_user_visible());
    }
}
