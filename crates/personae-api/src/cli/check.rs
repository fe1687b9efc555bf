//! `personae check`: reachability of the configured capabilities.

use std::path::Path;
use std::time::Duration;

use console::style;
use secrecy::SecretString;

use personae_core::rag::embedder::Embedder;
use personae_infra::config::{api_key_from_env, load_config};
use personae_infra::llm::{create_provider, test_provider_connection};
use personae_infra::vector::embedder::HttpEmbedder;

/// Send one tiny completion and one embedding request.
///
/// Fails if either endpoint is unusable.
pub async fn check(data_dir: &Path) -> anyhow::Result<()> {
    let config = load_config(data_dir).await;
    println!();

    let llm_key = api_key_from_env(&config.llm.api_key_env);
    let provider = create_provider(&config.llm, llm_key.as_deref())?;
    let caps = provider.capabilities();
    print!(
        "  {} {} ({}, output up to {} tokens) ... ",
        style("generation").bold(),
        provider.name(),
        config.llm.light_model,
        caps.max_output_tokens
    );
    let generation = test_provider_connection(&provider, &config.llm).await;
    report(generation.as_ref().err());

    let embedding_key = api_key_from_env(&config.embedding.api_key_env).map(SecretString::from);
    let request_timeout = Duration::from_secs(config.llm.request_timeout_secs.max(1));
    let embedder = HttpEmbedder::new(&config.embedding, embedding_key, request_timeout)?;
    print!(
        "  {} {} ({} dimensions) ... ",
        style("embedding").bold(),
        embedder.model_name(),
        embedder.dimension()
    );
    let embedding = embedder.embed(&["ping".to_string()]).await;
    report(embedding.as_ref().err());
    println!();

    generation?;
    embedding?;
    Ok(())
}

fn report(error: Option<&impl std::fmt::Display>) {
    match error {
        None => println!("{}", style("ok").green()),
        Some(e) => println!("{} {e}", style("failed").red()),
    }
}
