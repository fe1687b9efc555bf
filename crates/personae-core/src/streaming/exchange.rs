//! Caller-facing answer streams.
//!
//! The exchange runs on its own task and reports fragments over a bounded
//! channel. The returned stream yields the filtered answer text, then a
//! final `Err` if the exchange failed. Dropping the stream cancels the
//! exchange, leaving the session's committed state untouched.

use std::pin::Pin;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use personae_types::config::StreamingConfig;
use personae_types::error::DialogueError;

use crate::dialogue::engine::{DialogueEngine, ExchangeEvent};
use crate::repository::index_marker::IndexMarkerRepository;
use crate::repository::persona::PersonaRepository;
use crate::streaming::filter::filter_for;

/// Ordered answer fragments for one exchange.
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<String, DialogueError>> + Send>>;

/// Start an exchange on `engine` and stream its user-visible text.
pub fn stream_exchange<R>(
    engine: Arc<DialogueEngine<R>>,
    input: String,
    config: &StreamingConfig,
) -> AnswerStream
where
    R: PersonaRepository + IndexMarkerRepository + 'static,
{
    let (tx, mut rx) = mpsc::channel(config.channel_capacity.max(1));
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let mut filter = filter_for(config.filter);

    let handle = tokio::spawn(async move { engine.run_exchange(&input, Some(tx), cancel).await });

    Box::pin(async_stream::stream! {
        let _guard = guard;

        while let Some(event) = rx.recv().await {
            match event {
                ExchangeEvent::Started { internal_calls } => filter.start(internal_calls),
                ExchangeEvent::Fragment(fragment) => {
                    if filter.accept(&fragment) {
                        yield Ok(fragment.text);
                    }
                }
            }
        }

        match handle.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => yield Err(e),
            Err(e) => yield Err(DialogueError::CapabilityUnavailable(format!(
                "exchange task failed: {e}"
            ))),
        }
    })
}

/// Drain an answer stream into the full answer text.
pub async fn collect_answer(mut stream: AnswerStream) -> Result<String, DialogueError> {
    let mut answer = String::new();
    while let Some(fragment) = stream.next().await {
        answer.push_str(&fragment?);
    }
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use personae_types::config::FilterMode;
    use personae_types::conversation::SessionKey;
    use personae_types::persona::PersonaId;

    use crate::testing::{InMemoryRepo, ScriptedProvider, sample_persona, test_context};

    async fn engine(provider: ScriptedProvider) -> Arc<DialogueEngine<InMemoryRepo>> {
        let repo = Arc::new(InMemoryRepo::with_personas(vec![sample_persona(7, "Sasuke")]));
        let ctx = test_context(repo, provider);
        Arc::new(
            DialogueEngine::create(ctx, SessionKey::new("t1", PersonaId(7)))
                .await
                .unwrap(),
        )
    }

    fn config(filter: FilterMode) -> StreamingConfig {
        StreamingConfig {
            filter,
            ..StreamingConfig::default()
        }
    }

    #[tokio::test]
    async fn test_streamed_answer_matches_plain_run() {
        for mode in [FilterMode::StageTag, FilterMode::CallBoundary] {
            let plain = engine(ScriptedProvider::default()).await;
            plain.exchange("Hi there").await.unwrap();
            let expected = plain.exchange("Where do you train?").await.unwrap().answer;

            let streamed = engine(ScriptedProvider::default()).await;
            streamed.exchange("Hi there").await.unwrap();
            let fragments: Vec<String> = stream_exchange(
                streamed.clone(),
                "Where do you train?".to_string(),
                &config(mode),
            )
            .map(|f| f.unwrap())
            .collect()
            .await;

            assert!(!fragments.is_empty(), "{mode}: no fragments");
            assert!(fragments.iter().all(|f| !f.is_empty()));
            assert_eq!(fragments.concat(), expected, "{mode}");
            assert_eq!(streamed.state().await.answer, expected);
            // The internal stages answer with the light model's name.
            assert!(!fragments.concat().contains("open-mixtral"));
        }
    }

    #[tokio::test]
    async fn test_first_exchange_streams_answer() {
        let engine = engine(ScriptedProvider::default()).await;
        let answer = collect_answer(stream_exchange(
            engine.clone(),
            "Where do you train?".to_string(),
            &StreamingConfig::default(),
        ))
        .await
        .unwrap();

        assert!(!answer.is_empty());
        assert_eq!(engine.history().await.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_last_item() {
        let provider = ScriptedProvider::default();
        let engine = engine(provider.clone()).await;
        provider.fail_from_call(provider.call_count());

        let items: Vec<Result<String, DialogueError>> = stream_exchange(
            engine.clone(),
            "Where do you train?".to_string(),
            &StreamingConfig::default(),
        )
        .collect()
        .await;

        let last = items.last().unwrap();
        assert!(matches!(last, Err(e) if e.is_retryable()));
        assert!(engine.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_dropping_stream_cancels_exchange() {
        let provider = ScriptedProvider::default();
        let engine = engine(provider.clone()).await;
        provider.hang_after_first_token(true);

        let mut stream = stream_exchange(
            engine.clone(),
            "Where do you train?".to_string(),
            &StreamingConfig::default(),
        );
        assert!(stream.next().await.unwrap().is_ok());
        drop(stream);

        // The cancelled exchange releases the session for the next one.
        provider.hang_after_first_token(false);
        let state = tokio::time::timeout(Duration::from_secs(5), engine.exchange("Hello?"))
            .await
            .expect("session still locked after cancellation")
            .unwrap();
        assert_eq!(state.chat_history.len(), 2);
        assert_eq!(state.chat_history[0].text, "Hello?");
    }
}
