//! Synthia - personal AI assistant

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{
    chat_command, init_command, learn_command, profile_activate_command, profile_list_command,
    profile_use_command, status_command,
};

/// Synthia - AI assistant for your terminal
#[derive(Parser)]
#[command(name = "synthia")]
#[command(about = "Personal AI assistant with tools and long-term memory")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config, profiles and data directory
    Init,
    /// Chat with the assistant
    Chat {
        /// Message to send
        #[arg(short, long, conflicts_with = "audio")]
        message: Option<String>,
        /// Conversation key
        #[arg(short, long, default_value = "cli:default")]
        conversation: String,
        /// Voice note to transcribe and send
        #[arg(long)]
        audio: Option<PathBuf>,
    },
    /// Store a fact in long-term memory
    Learn {
        /// The fact to remember
        #[arg(required = true, num_args = 1..)]
        fact: Vec<String>,
    },
    /// Manage persona profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Show system status
    Status,
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// List profiles
    List,
    /// Make a profile the default
    Activate { key: String },
    /// Pin a profile to one conversation
    Use {
        /// Conversation key
        conversation: String,
        /// Profile key
        #[arg(required_unless_present = "clear")]
        key: Option<String>,
        /// Remove the override
        #[arg(long, conflicts_with = "key")]
        clear: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Init => init_command().await,
        Commands::Chat {
            message,
            conversation,
            audio,
        } => chat_command(message, conversation, audio).await,
        Commands::Learn { fact } => learn_command(fact.join(" ")).await,
        Commands::Profile { command } => match command {
            ProfileCommands::List => profile_list_command().await,
            ProfileCommands::Activate { key } => profile_activate_command(key).await,
            ProfileCommands::Use {
                conversation,
                key,
                clear,
            } => profile_use_command(conversation, if clear { None } else { key }).await,
        },
        Commands::Status => status_command().await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
