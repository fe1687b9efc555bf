//! Personae CLI and HTTP server entry point.
//!
//! Binary name: `personae`
//!
//! Parses CLI arguments, initializes tracing and the engine, then dispatches
//! to the requested command or starts the HTTP server.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use personae_infra::config::default_data_dir;
use personae_observe::tracing_setup::{init_tracing, shutdown_tracing};
use state::{AppState, open_repository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need tracing or app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "personae", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(cli.log_filter(), cli.otel).map_err(|e| anyhow::anyhow!("{e}"))?;

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let result = run(cli, data_dir).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli, data_dir: std::path::PathBuf) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve { port, host } => {
            let state = AppState::init(data_dir).await?;
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} Personae listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            println!("\n  Server stopped.");
        }

        Commands::Ask {
            thread,
            persona,
            message,
        } => {
            let state = AppState::init(data_dir).await?;
            cli::ask::ask(&state, &thread, persona, &message).await?;
        }

        Commands::Seed { file } => {
            let repo = open_repository(&data_dir).await?;
            cli::persona::seed(&repo, &file).await?;
        }

        Commands::Personas => {
            let repo = open_repository(&data_dir).await?;
            cli::persona::list(&repo).await?;
        }

        Commands::Check => {
            cli::check::check(&data_dir).await?;
        }

        Commands::Reindex { persona_id } => {
            let state = AppState::init(data_dir).await?;
            cli::persona::reindex(&state, persona_id).await?;
        }

        Commands::Completions { .. } => unreachable!("handled in main"),
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
