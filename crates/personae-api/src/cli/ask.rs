//! `personae ask`: one exchange from the command line.

use std::io::Write;

use futures_util::StreamExt;

use personae_types::persona::PersonaId;

use crate::state::AppState;

/// Run one exchange and print answer fragments as they arrive.
pub async fn ask(state: &AppState, thread_id: &str, persona_id: PersonaId, message: &str) -> anyhow::Result<()> {
    let session = state
        .chat_service
        .get_or_create_session(thread_id, persona_id)
        .await?;

    println!();
    print!("  {} ", console::style(format!("{}:", session.persona_name())).cyan().bold());

    let mut answer = state.chat_service.run_exchange(session, message);
    let mut stdout = std::io::stdout();
    while let Some(fragment) = answer.next().await {
        let fragment = fragment?;
        print!("{fragment}");
        stdout.flush()?;
    }
    println!();
    println!();
    Ok(())
}
