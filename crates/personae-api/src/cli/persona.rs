//! Persona management commands: seed, list, reindex.

use std::path::Path;

use anyhow::Context;

use personae_core::rag::index::IndexBuild;
use personae_infra::sqlite::persona::SqlitePersonaRepository;
use personae_types::persona::{Persona, PersonaId};

use crate::state::AppState;

/// Parse a JSON array of personas.
pub fn parse_personas(json: &str) -> anyhow::Result<Vec<Persona>> {
    let personas: Vec<Persona> = serde_json::from_str(json).context("expected a JSON array of personas")?;
    for persona in &personas {
        anyhow::ensure!(
            !persona.name.trim().is_empty(),
            "persona {} has an empty name",
            persona.id
        );
    }
    Ok(personas)
}

/// Load personas from `file` and upsert them.
pub async fn seed(repo: &SqlitePersonaRepository, file: &Path) -> anyhow::Result<()> {
    let json = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let personas = parse_personas(&json)?;

    for persona in &personas {
        repo.upsert_persona(persona).await?;
        tracing::info!(persona_id = %persona.id, sections = persona.sections.len(), "persona stored");
    }

    println!();
    println!(
        "  {} Seeded {} persona(s) from {}",
        console::style("✓").green().bold(),
        personas.len(),
        console::style(file.display()).dim()
    );
    println!();
    Ok(())
}

/// Print stored personas.
pub async fn list(repo: &SqlitePersonaRepository) -> anyhow::Result<()> {
    let personas = repo.list_personas().await?;
    println!();
    if personas.is_empty() {
        println!("  No personas yet. Load some with `personae seed <file.json>`.");
    }
    for persona in personas {
        let summarized = if persona.summarized_personality.is_some() {
            console::style("summarized").green()
        } else {
            console::style("not summarized").dim()
        };
        println!(
            "  {:>5}  {}  ({})",
            persona.id,
            console::style(&persona.name).cyan(),
            summarized
        );
    }
    println!();
    Ok(())
}

/// Rebuild one persona's reference index.
pub async fn reindex(state: &AppState, persona_id: PersonaId) -> anyhow::Result<()> {
    let build = state.chat_service.reindex(persona_id).await?;
    let chunks = match build {
        IndexBuild::Built { chunk_count } => chunk_count,
        IndexBuild::AlreadyBuilt => 0,
    };
    println!();
    println!(
        "  {} Reindexed persona {} ({} chunks)",
        console::style("✓").green().bold(),
        persona_id,
        chunks
    );
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_personas() {
        let json = r#"[
            {
                "id": 7,
                "name": "Sasuke Uchiha",
                "biography": "Last of the Uchiha.",
                "personality": "Cold and proud.",
                "sections": [
                    { "text": "Trains in the forest.", "tag_1": "Abilities" }
                ]
            },
            { "id": 8, "name": "Naruto Uzumaki" }
        ]"#;
        let personas = parse_personas(json).unwrap();
        assert_eq!(personas.len(), 2);
        assert_eq!(personas[0].id, PersonaId(7));
        assert_eq!(personas[0].sections[0].tag_1.as_deref(), Some("Abilities"));
        assert!(personas[1].sections.is_empty());
        assert!(personas[1].summarized_personality.is_none());
    }

    #[test]
    fn test_parse_personas_rejects_bad_input() {
        assert!(parse_personas("{}").is_err());
        assert!(parse_personas(r#"[{ "id": 1, "name": "  " }]"#).is_err());
    }
}
