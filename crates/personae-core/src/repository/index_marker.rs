//! Index build marker repository trait definition.

use personae_types::error::RepositoryError;
use personae_types::persona::PersonaId;

/// Durable record of which personas have a built reference index.
///
/// The marker's presence is the only cache-validity signal; there is no TTL
/// or content hash.
pub trait IndexMarkerRepository: Send + Sync {
    fn marker_exists(
        &self,
        id: PersonaId,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Record that the index for `id` was built. Idempotent.
    fn record_index_built(
        &self,
        id: PersonaId,
        chunk_count: u64,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Forget the marker so the next access rebuilds. Returns whether one
    /// existed.
    fn clear_marker(
        &self,
        id: PersonaId,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
