//! Chat endpoints: streaming exchanges and session management.
//!
//! POST /chats/stream streams the persona's answer as Server-Sent Events:
//! - default (`message`) events carry one answer fragment each as UTF-8 text
//! - `error` carries `{ "message": "..." }` if the exchange fails midway
//! - `done` closes the stream with `{}`

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;

use personae_types::conversation::ChatTurn;
use personae_types::persona::PersonaId;

use crate::http::error::AppError;
use crate::http::response::DataResponse;
use crate::state::AppState;

/// Request body for the streaming chat endpoint.
#[derive(Debug, Deserialize)]
pub struct StreamChatRequest {
    pub query: String,
    pub character_id: PersonaId,
    pub thread_id: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub thread_id: String,
    pub character_id: PersonaId,
}

#[derive(Debug, Deserialize)]
pub struct ThreadParams {
    pub thread_id: String,
}

/// POST /chats/stream
///
/// The session is resolved before the response starts, so an unknown persona
/// or an invalid thread id is a plain HTTP error rather than an SSE event.
#[tracing::instrument(name = "http.stream_chat", skip(state, body), fields(thread_id = %body.thread_id, persona_id = %body.character_id))]
pub async fn stream_chat(
    State(state): State<AppState>,
    Json(body): Json<StreamChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let mut answer = state
        .chat_service
        .chat(&body.thread_id, body.character_id, &body.query)
        .await?;

    let sse_stream = async_stream::stream! {
        while let Some(item) = answer.next().await {
            match item {
                Ok(fragment) => yield Ok(Event::default().data(fragment)),
                Err(e) => {
                    tracing::warn!(error = %e, "exchange failed mid-stream");
                    let data = serde_json::json!({ "message": e.to_string() });
                    yield Ok(Event::default().event("error").data(data.to_string()));
                }
            }
        }
        yield Ok(Event::default().event("done").data("{}"));
    };

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

/// GET /chat/history?thread_id=..&character_id=..
pub async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<ChatTurn>>, AppError> {
    let history = state
        .chat_service
        .get_history(&params.thread_id, params.character_id)
        .await?;
    Ok(Json(history))
}

/// GET /chats?thread_id=..
pub async fn list_chats(
    State(state): State<AppState>,
    Query(params): Query<ThreadParams>,
) -> DataResponse<Vec<PersonaId>> {
    DataResponse::new(state.chat_service.list_sessions(&params.thread_id).await)
}

/// DELETE /chats/{thread_id}/{character_id}
///
/// Accepted whether or not a session existed.
pub async fn delete_chat(
    State(state): State<AppState>,
    Path((thread_id, character_id)): Path<(String, PersonaId)>,
) -> impl IntoResponse {
    let removed = state.chat_service.evict(&thread_id, character_id).await;
    tracing::debug!(%thread_id, persona_id = %character_id, removed, "chat deleted");
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": StatusCode::ACCEPTED.as_u16() })),
    )
}
