//! Steward CLI: the main entry point.
//!
//! Commands:
//! - `onboard`  : Write a starter config
//! - `sync`     : Converge the declared assistant and data files
//! - `drain`    : Tear one managed resource down
//! - `status`   : Show the last recorded state of every resource
//! - `doctor`   : Check config and credentials
//! - `chat`, `raw-chat`, `context`: Talk to the assistant
//! - `upload`, `files`, `delete-file`, `update-assistant`: One-off operations

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "steward",
    about = "Steward: keeps a Pinecone assistant and its data files in line with a declared config",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.steward/config.toml)
    #[arg(short, long, global = true, env = "STEWARD_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config file
    Onboard,

    /// Reconcile every declared resource until it settles
    Sync {
        /// Give up on a resource after this many cycles
        #[arg(long)]
        max_cycles: Option<usize>,
    },

    /// Drain a resource: `assistant`, a data file key, or a full key like `file:handbook`
    Drain { resource: String },

    /// Show recorded resource state
    Status,

    /// Diagnose config and credentials
    Doctor,

    /// Chat with the assistant, keeping conversation history
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,
    },

    /// Send an explicit message list; prefix a turn with `assistant:` to mark a reply
    RawChat {
        #[arg(required = true)]
        messages: Vec<String>,

        /// Metadata filter as JSON
        #[arg(long)]
        filter: Option<String>,
    },

    /// Retrieve context snippets for a query
    Context {
        query: String,

        /// Metadata filter as JSON
        #[arg(long)]
        filter: Option<String>,
    },

    /// Upload a local file and wait for processing
    Upload {
        path: PathBuf,

        /// Name to upload under (defaults to the local file name)
        #[arg(long)]
        filename: Option<String>,

        /// Metadata as key=value, repeatable
        #[arg(long = "meta")]
        metadata: Vec<String>,
    },

    /// List the assistant's files
    Files,

    /// Delete one file by id
    DeleteFile { file_id: String },

    /// Update the assistant's instructions and/or metadata
    UpdateAssistant {
        #[arg(long)]
        instructions: Option<String>,

        /// Metadata as key=value, repeatable
        #[arg(long = "meta")]
        metadata: Vec<String>,
    },
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
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Onboard => commands::onboard::run(config).await?,
        Commands::Sync { max_cycles } => commands::sync::run(config, max_cycles).await?,
        Commands::Drain { resource } => commands::drain::run(config, &resource).await?,
        Commands::Status => commands::status::run(config).await?,
        Commands::Doctor => commands::doctor::run(config).await?,
        Commands::Chat { message, conversation } => commands::chat::run(config, message, conversation).await?,
        Commands::RawChat { messages, filter } => commands::chat::run_raw(config, messages, filter).await?,
        Commands::Context { query, filter } => commands::context::run(config, query, filter).await?,
        Commands::Upload {
            path,
            filename,
            metadata,
        } => commands::files::upload(config, path, filename, metadata).await?,
        Commands::Files => commands::files::list(config).await?,
        Commands::DeleteFile { file_id } => commands::files::delete(config, file_id).await?,
        Commands::UpdateAssistant { instructions, metadata } => {
            commands::update::run(config, instructions, metadata).await?
        }
    }

    Ok(())
}
