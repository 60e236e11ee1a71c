// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reprise - resumable generation streaming.
//!
//! `reprise serve` runs the generation server; the other subcommands are
//! thin terminal clients for it.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod engine;
mod serve;
mod shutdown;
mod status;
mod watch;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use reprise_config::RepriseConfig;
use reprise_core::{ConversationId, MessageId, RepriseError};

/// Reprise - resumable generation streaming.
#[derive(Parser, Debug)]
#[command(name = "reprise", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the generation server.
    Serve,
    /// Follow a generation in the terminal until it finishes.
    Watch {
        message_id: String,
        /// Print the final text without the progressive reveal.
        #[arg(long)]
        plain: bool,
    },
    /// Show whether a generation is still running.
    Status {
        message_id: String,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Start a generation in a conversation.
    Start {
        conversation_id: String,
        prompt: String,
        /// Use this message id instead of a server-generated one.
        #[arg(long)]
        message_id: Option<String>,
        /// Follow the generation after starting it.
        #[arg(long)]
        watch: bool,
    },
    /// Ask a running generation to stop.
    Stop { message_id: String },
    /// Create a conversation owned by the configured token's user.
    Conversation,
}

fn load_config(path: Option<&std::path::Path>) -> RepriseConfig {
    let loaded = match path {
        Some(path) => reprise_config::load_and_validate_path(path),
        None => reprise_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            reprise_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

async fn run(command: Commands, config: RepriseConfig) -> Result<(), RepriseError> {
    match command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Watch { message_id, plain } => {
            watch::run_watch(&config, MessageId::from(message_id), plain).await
        }
        Commands::Status { message_id, json } => {
            status::run_status(&config, MessageId::from(message_id), json).await
        }
        Commands::Start {
            conversation_id,
            prompt,
            message_id,
            watch,
        } => {
            let client = reprise_client::GenerationClient::from_config(&config.client)?;
            let requested = message_id.map(MessageId::from);
            let started = client
                .start(
                    &ConversationId::from(conversation_id),
                    &prompt,
                    requested.as_ref(),
                )
                .await?;
            eprintln!("reprise: started {} (run {})", started.message_id, started.run_id);
            if watch {
                watch::run_watch(&config, started.message_id, false).await
            } else {
                println!("{}", started.message_id);
                Ok(())
            }
        }
        Commands::Stop { message_id } => {
            let client = reprise_client::GenerationClient::from_config(&config.client)?;
            let stopped = client.stop(&MessageId::from(message_id)).await?;
            println!("{}", if stopped { "stopped" } else { "not running" });
            Ok(())
        }
        Commands::Conversation => {
            let client = reprise_client::GenerationClient::from_config(&config.client)?;
            println!("{}", client.create_conversation().await?);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    let Some(command) = cli.command else {
        println!("reprise: use --help for available commands");
        return;
    };

    if let Err(e) = run(command, config).await {
        eprintln!("reprise: {e}");
        std::process::exit(1);
    }
}
