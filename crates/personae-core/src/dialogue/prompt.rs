//! Prompt templates for every generation call the engine makes.
//!
//! Wording is pluggable: the engine only depends on [`PromptTemplates`].
//! [`DefaultPrompts`] is what the service ships with.

use personae_types::conversation::{ChatTurn, Speaker};
use personae_types::llm::Message;

/// System text plus ordered messages for one generation call.
#[derive(Debug, Clone, Default)]
pub struct Prompt {
    pub system: Option<String>,
    pub messages: Vec<Message>,
}

/// Everything the final answer prompt is composed from.
#[derive(Debug, Clone, Copy)]
pub struct AnswerContext<'a> {
    pub persona_name: &'a str,
    pub personality_summary: &'a str,
    pub user_characterization: &'a str,
    pub chat_summary: &'a str,
    pub context: &'a str,
    pub chat_history: &'a [ChatTurn],
    pub input: &'a str,
}

pub trait PromptTemplates: Send + Sync {
    /// Condense a persona's raw personality description.
    fn summarize_personality(&self, persona_name: &str, personality: &str) -> Prompt;

    /// Update the rolling summary from the most recent turns.
    fn summarize_history(
        &self,
        persona_name: &str,
        prior_summary: &str,
        window: &[ChatTurn],
    ) -> Prompt;

    /// Update what is known about the human participant.
    fn characterize_user(
        &self,
        persona_name: &str,
        prior_characterization: &str,
        prior_summary: &str,
        window: &[ChatTurn],
    ) -> Prompt;

    /// Rewrite the latest input as a standalone retrieval query.
    fn contextualize_query(&self, persona_name: &str, history: &[ChatTurn], input: &str)
    -> Prompt;

    /// The persona's in-character reply.
    fn answer(&self, ctx: AnswerContext<'_>) -> Prompt;
}

/// Render turns as `HUMAN: ...` / `NAME: ...` lines.
pub fn transcript(persona_name: &str, turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .map(|turn| match turn.speaker {
            Speaker::Human => format!("HUMAN: {}", turn.text),
            Speaker::Persona => format!("{}: {}", persona_name.to_uppercase(), turn.text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Map turns onto user/assistant messages.
pub fn history_messages(turns: &[ChatTurn]) -> Vec<Message> {
    turns
        .iter()
        .map(|turn| match turn.speaker {
            Speaker::Human => Message::user(turn.text.clone()),
            Speaker::Persona => Message::assistant(turn.text.clone()),
        })
        .collect()
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() { "(none yet)" } else { text }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPrompts;

impl PromptTemplates for DefaultPrompts {
    fn summarize_personality(&self, persona_name: &str, personality: &str) -> Prompt {
        Prompt {
            system: None,
            messages: vec![Message::user(format!(
                "Below is a description of the personality of {persona_name}.\n\n\
                 {personality}\n\n\
                 Summarize this personality in at most five sentences. Keep the traits that \
                 shape how {persona_name} talks and behaves. Answer with the summary only."
            ))],
        }
    }

    fn summarize_history(
        &self,
        persona_name: &str,
        prior_summary: &str,
        window: &[ChatTurn],
    ) -> Prompt {
        Prompt {
            system: None,
            messages: vec![Message::user(format!(
                "You keep a running summary of a conversation between a HUMAN and \
                 {persona_name}.\n\n\
                 Summary so far:\n{}\n\n\
                 Latest messages:\n{}\n\n\
                 Write the updated summary in at most four sentences. Answer with the summary only.",
                or_none(prior_summary),
                transcript(persona_name, window),
            ))],
        }
    }

    fn characterize_user(
        &self,
        persona_name: &str,
        prior_characterization: &str,
        prior_summary: &str,
        window: &[ChatTurn],
    ) -> Prompt {
        Prompt {
            system: None,
            messages: vec![Message::user(format!(
                "{persona_name} is talking with a HUMAN. So far {persona_name} sees the HUMAN as: \
                 {prior_characterization}.\n\n\
                 Conversation summary:\n{}\n\n\
                 Latest messages:\n{}\n\n\
                 Describe in one or two sentences who the HUMAN is to {persona_name} now: \
                 their name if given, mood, intentions and relationship. \
                 Answer with the description only.",
                or_none(prior_summary),
                transcript(persona_name, window),
            ))],
        }
    }

    fn contextualize_query(
        &self,
        persona_name: &str,
        history: &[ChatTurn],
        input: &str,
    ) -> Prompt {
        let mut messages = history_messages(history);
        messages.push(Message::user(input.to_string()));
        messages.push(Message::user(format!(
            "Given the conversation above, write ONLY a search query that looks up information \
             relevant to the latest message. Whenever the HUMAN says 'you' they mean \
             {persona_name}. Query:"
        )));
        Prompt {
            system: None,
            messages,
        }
    }

    fn answer(&self, ctx: AnswerContext<'_>) -> Prompt {
        let name = ctx.persona_name;
        let system = format!(
            "Task: You are {name}. Stay in character and answer the HUMAN.\n\n\
             Name: {name}\n\
             Personality: {}\n\
             The HUMAN is: {}\n\
             Conversation so far: {}\n\n\
             Context:\n{}\n\n\
             Respond as {name} in three sentences at most. Never break character.",
            or_none(ctx.personality_summary),
            ctx.user_characterization,
            or_none(ctx.chat_summary),
            or_none(ctx.context),
        );

        let mut messages = history_messages(ctx.chat_history);
        messages.push(Message::user(ctx.input.to_string()));
        Prompt {
            system: Some(system),
            messages,
        }
    }
}
