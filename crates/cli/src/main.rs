//! UniLLM CLI — the main entry point.
//!
//! Commands:
//! - `init`    — Write a default config file
//! - `chat`    — Interactive or single-message chat mode
//! - `embed`   — Embed texts with the configured embedding model
//! - `serve`   — Start the OpenAI-compatible HTTP server
//! - `models`  — List providers and served models

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "unillm",
    about = "UniLLM — one interface for many LLM providers",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file to ~/.unillm/config.toml
    Init,

    /// Chat with the configured model
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// System prompt sent with every request
        #[arg(long)]
        system: Option<String>,

        /// Maximum number of generation steps per message
        #[arg(long)]
        max_steps: Option<u32>,
    },

    /// Embed one or more texts
    Embed {
        #[arg(required = true)]
        texts: Vec<String>,

        /// Provider-specific input type (e.g. "query" or "document")
        #[arg(long)]
        input_type: Option<String>,
    },

    /// Start the HTTP server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List configured providers and served models
    Models,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Chat {
            message,
            system,
            max_steps,
        } => {
            commands::chat::run(commands::chat::ChatOptions {
                message,
                system,
                max_steps,
                verbose: cli.verbose,
            })
            .await?
        }
        Commands::Embed { texts, input_type } => commands::embed::run(texts, input_type).await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Models => commands::models::run().await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_chat_flags() {
        let cli = Cli::parse_from([
            "unillm",
            "-v",
            "chat",
            "-m",
            "Who are you?",
            "--system",
            "You are Nyx.",
            "--max-steps",
            "3",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Chat {
                message,
                system,
                max_steps,
            } => {
                assert_eq!(message.as_deref(), Some("Who are you?"));
                assert_eq!(system.as_deref(), Some("You are Nyx."));
                assert_eq!(max_steps, Some(3));
            }
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn embed_requires_text() {
        assert!(Cli::try_parse_from(["unillm", "embed"]).is_err());
        let cli = Cli::parse_from(["unillm", "embed", "a", "b", "--input-type", "query"]);
        assert!(matches!(
            cli.command,
            Commands::Embed { ref texts, .. } if texts.len() == 2
        ));
    }
}
