//! Read-only persona lookup.

use axum::Json;
use axum::extract::{Path, State};

use personae_core::repository::persona::PersonaRepository;
use personae_types::persona::{Persona, PersonaId};

use crate::http::error::AppError;
use crate::state::AppState;

/// GET /characters
///
/// Personas without their reference sections, ordered by id.
pub async fn list_characters(State(state): State<AppState>) -> Result<Json<Vec<Persona>>, AppError> {
    Ok(Json(state.personas.list_personas().await?))
}

/// GET /characters/{id}
pub async fn get_character(
    State(state): State<AppState>,
    Path(id): Path<PersonaId>,
) -> Result<Json<Persona>, AppError> {
    state
        .personas
        .get_persona(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("persona {id} not found")))
}
