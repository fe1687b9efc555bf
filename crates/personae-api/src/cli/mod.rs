//! CLI command definitions for the `personae` binary.

pub mod ask;
pub mod check;
pub mod persona;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use personae_types::persona::PersonaId;

/// Talk to fictional personas grounded in their reference material.
#[derive(Parser)]
#[command(name = "personae", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Data directory holding config.toml, the database and the vector store.
    #[arg(long, global = true, env = "PERSONAE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default tracing filter for the requested verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "warn",
            1 => "info,personae=debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "8000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Send one message to a persona and print the streamed answer.
    Ask {
        /// Conversation thread id.
        #[arg(long, default_value = "cli")]
        thread: String,

        /// Persona id to talk to.
        #[arg(long)]
        persona: PersonaId,

        /// The message to send.
        message: String,
    },

    /// Load personas from a JSON file into the database.
    Seed {
        /// JSON array of personas with their reference sections.
        file: PathBuf,
    },

    /// List stored personas.
    Personas,

    /// Verify the generation and embedding endpoints are reachable.
    Check,

    /// Discard a persona's reference index and build it again.
    Reindex {
        /// Persona id to rebuild.
        persona_id: PersonaId,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from(["personae", "-v", "ask", "--persona", "7", "Where do you train?"]).unwrap();
        assert_eq!(cli.log_filter(), "info,personae=debug");
        match cli.command {
            Commands::Ask { thread, persona, message } => {
                assert_eq!(thread, "cli");
                assert_eq!(persona, PersonaId(7));
                assert_eq!(message, "Where do you train?");
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_parse_check() {
        let cli = Cli::try_parse_from(["personae", "--data-dir", "/tmp/p", "check"]).unwrap();
        assert!(matches!(cli.command, Commands::Check));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/p")));
    }

    #[test]
    fn test_parse_serve_defaults() {
        let cli = Cli::try_parse_from(["personae", "--quiet", "serve"]).unwrap();
        assert_eq!(cli.log_filter(), "error");
        assert!(matches!(cli.command, Commands::Serve { port: 8000, .. }));
    }
}
