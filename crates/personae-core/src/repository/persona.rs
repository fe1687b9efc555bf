//! Persona repository trait definition.

use personae_types::error::RepositoryError;
use personae_types::persona::{Persona, PersonaField, PersonaId};

/// Read access to persona records plus the one write the engine performs.
///
/// Implementations live in personae-infra (e.g., SqlitePersonaRepository).
pub trait PersonaRepository: Send + Sync {
    /// Get a persona, including its reference sections.
    fn get_persona(
        &self,
        id: PersonaId,
    ) -> impl std::future::Future<Output = Result<Option<Persona>, RepositoryError>> + Send;

    /// Compare-and-set a nullable persona field.
    ///
    /// Writes `value` only if the field is currently empty. Returns `true`
    /// when this call wrote the value, `false` when another writer already
    /// had. Fails with `NotFound` when the persona does not exist.
    fn update_persona_field(
        &self,
        id: PersonaId,
        field: PersonaField,
        value: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
