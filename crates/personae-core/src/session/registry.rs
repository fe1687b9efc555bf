//! Session registry: thread id -> persona id -> live dialogue engine.
//!
//! Engines are created on demand and live until evicted. There is no expiry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use personae_types::conversation::SessionKey;
use personae_types::error::DialogueError;
use personae_types::persona::PersonaId;

use crate::dialogue::context::EngineContext;
use crate::dialogue::engine::DialogueEngine;
use crate::repository::index_marker::IndexMarkerRepository;
use crate::repository::persona::PersonaRepository;

type ThreadSessions<R> = HashMap<PersonaId, Arc<DialogueEngine<R>>>;

pub struct SessionRegistry<R> {
    ctx: Arc<EngineContext<R>>,
    threads: RwLock<HashMap<String, ThreadSessions<R>>>,
}

impl<R> SessionRegistry<R>
where
    R: PersonaRepository + IndexMarkerRepository + 'static,
{
    pub fn new(ctx: Arc<EngineContext<R>>) -> Self {
        Self {
            ctx,
            threads: RwLock::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &Arc<EngineContext<R>> {
        &self.ctx
    }

    /// Existing engine for the key, if any.
    pub async fn get(&self, thread_id: &str, persona_id: PersonaId) -> Option<Arc<DialogueEngine<R>>> {
        self.threads
            .read()
            .await
            .get(thread_id)
            .and_then(|sessions| sessions.get(&persona_id))
            .cloned()
    }

    /// Return the engine for the key, creating it if needed.
    ///
    /// Construction (index build, persona summary) runs outside the registry
    /// lock. If two callers race on the same key, the first engine inserted
    /// wins and both get it.
    #[tracing::instrument(name = "session.get_or_create", skip(self), fields(thread_id = %thread_id, persona_id = %persona_id))]
    pub async fn get_or_create(
        &self,
        thread_id: &str,
        persona_id: PersonaId,
    ) -> Result<Arc<DialogueEngine<R>>, DialogueError> {
        if let Some(engine) = self.get(thread_id, persona_id).await {
            return Ok(engine);
        }

        let key = SessionKey::new(thread_id, persona_id);
        let created = Arc::new(DialogueEngine::create(self.ctx.clone(), key).await?);

        let mut threads = self.threads.write().await;
        let engine = threads
            .entry(thread_id.to_string())
            .or_default()
            .entry(persona_id)
            .or_insert(created)
            .clone();
        tracing::debug!("session ready");
        Ok(engine)
    }

    /// Persona ids with a live engine under `thread_id`, ascending.
    pub async fn list_personas(&self, thread_id: &str) -> Vec<PersonaId> {
        let threads = self.threads.read().await;
        let mut ids: Vec<PersonaId> = threads
            .get(thread_id)
            .map(|sessions| sessions.keys().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Drop one engine and its conversation state. Returns whether it existed.
    #[tracing::instrument(name = "session.evict", skip(self), fields(thread_id = %thread_id, persona_id = %persona_id))]
    pub async fn evict(&self, thread_id: &str, persona_id: PersonaId) -> bool {
        let mut threads = self.threads.write().await;
        let Some(sessions) = threads.get_mut(thread_id) else {
            return false;
        };
        let removed = sessions.remove(&persona_id).is_some();
        if sessions.is_empty() {
            threads.remove(thread_id);
        }
        if removed {
            tracing::info!("session evicted");
        }
        removed
    }

    /// Total live engines across all threads.
    pub async fn session_count(&self) -> usize {
        self.threads.read().await.values().map(HashMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryRepo, ScriptedProvider, sample_persona, test_context};

    fn registry(provider: ScriptedProvider) -> (SessionRegistry<InMemoryRepo>, Arc<InMemoryRepo>) {
        let repo = Arc::new(InMemoryRepo::with_personas(vec![
            sample_persona(7, "Sasuke"),
            sample_persona(8, "Naruto"),
        ]));
        let registry = SessionRegistry::new(test_context(repo.clone(), provider));
        (registry, repo)
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_engine() {
        let (registry, _) = registry(ScriptedProvider::default());
        let a = registry.get_or_create("t1", PersonaId(7)).await.unwrap();
        let b = registry.get_or_create("t1", PersonaId(7)).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_keys_do_not_share_engines() {
        let (registry, _) = registry(ScriptedProvider::default());
        let a = registry.get_or_create("t1", PersonaId(7)).await.unwrap();
        let b = registry.get_or_create("t2", PersonaId(7)).await.unwrap();
        let c = registry.get_or_create("t1", PersonaId(8)).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));

        a.exchange("Hi").await.unwrap();
        assert!(b.history().await.is_empty());
        assert!(c.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_personas_sorted() {
        let (registry, _) = registry(ScriptedProvider::default());
        registry.get_or_create("t1", PersonaId(8)).await.unwrap();
        registry.get_or_create("t1", PersonaId(7)).await.unwrap();
        registry.get_or_create("t2", PersonaId(7)).await.unwrap();

        assert_eq!(registry.list_personas("t1").await, vec![PersonaId(7), PersonaId(8)]);
        assert_eq!(registry.list_personas("t2").await, vec![PersonaId(7)]);
        assert!(registry.list_personas("nope").await.is_empty());
    }

    #[tokio::test]
    async fn test_evict_discards_state() {
        let (registry, _) = registry(ScriptedProvider::default());
        let engine = registry.get_or_create("t1", PersonaId(7)).await.unwrap();
        engine.exchange("Hi").await.unwrap();

        assert!(registry.evict("t1", PersonaId(7)).await);
        assert!(!registry.evict("t1", PersonaId(7)).await);
        assert!(registry.list_personas("t1").await.is_empty());
        assert_eq!(registry.session_count().await, 0);

        let fresh = registry.get_or_create("t1", PersonaId(7)).await.unwrap();
        assert!(!Arc::ptr_eq(&engine, &fresh));
        assert!(fresh.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_persona_not_registered() {
        let (registry, _) = registry(ScriptedProvider::default());
        let err = registry.get_or_create("t1", PersonaId(404)).await.err().unwrap();
        assert!(err.is_not_found());
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_racing_creators_get_same_engine() {
        let (registry, repo) = registry(ScriptedProvider::default());
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create("t1", PersonaId(7)).await })
            })
            .collect();
        let mut engines = Vec::new();
        for handle in handles {
            engines.push(handle.await.unwrap().unwrap());
        }

        assert!(engines.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.session_count().await, 1);
        assert_eq!(repo.marker_writes(), 1);
    }
}
