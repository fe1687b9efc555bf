//! Process-local reference store.
//!
//! Brute-force cosine search over one flat list of chunks, filtered by
//! persona on every read. Used when `[index] backend = "memory"`; contents
//! vanish with the process.

use tokio::sync::RwLock;

use personae_core::rag::store::ReferenceStore;
use personae_types::error::IndexError;
use personae_types::persona::PersonaId;
use personae_types::reference::{EmbeddedChunk, RankedChunk};

#[derive(Default)]
pub struct InMemoryReferenceStore {
    rows: RwLock<Vec<EmbeddedChunk>>,
}

impl InMemoryReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x64 = f64::from(x);
        let y64 = f64::from(y);
        dot += x64 * y64;
        norm_a += x64 * x64;
        norm_b += y64 * y64;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some(dot / denom)
}

impl ReferenceStore for InMemoryReferenceStore {
    async fn insert(&self, chunks: &[EmbeddedChunk]) -> Result<(), IndexError> {
        self.rows.write().await.extend_from_slice(chunks);
        Ok(())
    }

    async fn search(
        &self,
        persona_id: PersonaId,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<RankedChunk>, IndexError> {
        let rows = self.rows.read().await;
        let mut ranked: Vec<RankedChunk> = rows
            .iter()
            .filter(|row| row.chunk.persona_id == persona_id)
            .map(|row| RankedChunk {
                chunk: row.chunk.clone(),
                similarity: cosine_similarity(query_embedding, &row.embedding)
                    .map_or(0.0, |s| s.clamp(0.0, 1.0) as f32),
            })
            .collect();
        // Stable sort keeps insertion order among ties.
        ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn delete_persona(&self, persona_id: PersonaId) -> Result<u64, IndexError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|row| row.chunk.persona_id != persona_id);
        Ok((before - rows.len()) as u64)
    }

    async fn count(&self, persona_id: PersonaId) -> Result<u64, IndexError> {
        let rows = self.rows.read().await;
        Ok(rows.iter().filter(|row| row.chunk.persona_id == persona_id).count() as u64)
    }

    fn is_durable(&self) -> bool {
        false
    }
}
