//! Application state wiring all services together.
//!
//! AppState pins the generic engine to the concrete infra implementations:
//! SQLite personas, the configured reference store, the HTTP embedder and
//! the OpenAI-compatible generation provider.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use secrecy::SecretString;

use personae_core::chat::service::ChatService;
use personae_core::dialogue::context::EngineContext;
use personae_core::dialogue::prompt::DefaultPrompts;
use personae_core::rag::box_embedder::BoxEmbedder;
use personae_infra::config::{api_key_from_env, load_config};
use personae_infra::llm::create_provider;
use personae_infra::sqlite::persona::SqlitePersonaRepository;
use personae_infra::sqlite::pool::{DatabasePool, database_url};
use personae_infra::vector::embedder::HttpEmbedder;
use personae_infra::vector::open_reference_store;

pub type ConcreteChatService = ChatService<SqlitePersonaRepository>;

/// Shared application state.
///
/// Used by both CLI commands and HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ConcreteChatService>,
    pub personas: Arc<SqlitePersonaRepository>,
}

/// Open the SQLite persona store in `data_dir`, running migrations.
pub async fn open_repository(data_dir: &Path) -> anyhow::Result<SqlitePersonaRepository> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
    let pool = DatabasePool::new(&database_url(data_dir))
        .await
        .context("failed to open persona database")?;
    Ok(SqlitePersonaRepository::new(pool))
}

impl AppState {
    /// Initialize the application state: load config, connect stores, wire the engine.
    pub async fn init(data_dir: PathBuf) -> anyhow::Result<Self> {
        let config = load_config(&data_dir).await;
        let personas = Arc::new(open_repository(&data_dir).await?);

        let llm_key = api_key_from_env(&config.llm.api_key_env);
        if llm_key.is_none() {
            tracing::warn!(env = %config.llm.api_key_env, "generation API key not set");
        }
        let provider = create_provider(&config.llm, llm_key.as_deref())
            .with_context(|| format!("set {} to your provider API key", config.llm.api_key_env))?;

        let embedding_key = api_key_from_env(&config.embedding.api_key_env).map(SecretString::from);
        let request_timeout = Duration::from_secs(config.llm.request_timeout_secs.max(1));
        let embedder = HttpEmbedder::new(&config.embedding, embedding_key, request_timeout)?;
        let store = open_reference_store(&data_dir, &config.index, &config.embedding).await?;

        tracing::info!(
            provider = provider.name(),
            light_model = %config.llm.light_model,
            capable_model = %config.llm.capable_model,
            backend = ?config.index.backend,
            "engine configured"
        );

        let ctx = EngineContext::new(
            personas.clone(),
            provider,
            BoxEmbedder::new(embedder),
            store,
            Arc::new(DefaultPrompts),
            config,
        )?;

        Ok(Self {
            chat_service: Arc::new(ChatService::new(Arc::new(ctx))),
            personas,
        })
    }
}
