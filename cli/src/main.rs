//! chanstate CLI - inspect and maintain channel state

mod commands;

use chanstate_state::{create_persistent_store, ChannelStates};
use clap::{Parser, Subcommand};
use commands::{execute, resolve_config, Action};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chanstate")]
#[command(about = "chanstate - shared channel state maintenance")]
#[command(version)]
struct Cli {
    /// Configuration file path (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory, overrides the config file
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Node id used for claim/release, overrides the config file
    #[arg(long)]
    node_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a channel's state
    Show {
        /// Channel ID
        channel: String,
    },

    /// List every channel holding state
    List,

    /// Enable a channel
    Enable {
        /// Channel ID
        channel: String,
    },

    /// Disable a channel
    Disable {
        /// Channel ID
        channel: String,
    },

    /// Add a user to a channel
    Join {
        /// Channel ID
        channel: String,

        /// User ID
        user: String,
    },

    /// Remove a user from a channel
    Leave {
        /// Channel ID
        channel: String,

        /// User ID
        user: String,
    },

    /// Claim ownership of a channel for this node
    Claim {
        /// Channel ID
        channel: String,
    },

    /// Release this node's ownership of a channel
    Release {
        /// Channel ID
        channel: String,
    },

    /// Delete a channel's state
    Remove {
        /// Channel ID
        channel: String,
    },

    /// Clear owners and users on every channel (safe to re-run)
    Cleanup,
}

impl From<Commands> for Action {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Show { channel } => Action::Show { channel },
            Commands::List => Action::List,
            Commands::Enable { channel } => Action::Enable { channel },
            Commands::Disable { channel } => Action::Disable { channel },
            Commands::Join { channel, user } => Action::Join { channel, user },
            Commands::Leave { channel, user } => Action::Leave { channel, user },
            Commands::Claim { channel } => Action::Claim { channel },
            Commands::Release { channel } => Action::Release { channel },
            Commands::Remove { channel } => Action::Remove { channel },
            Commands::Cleanup => Action::Cleanup,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref(), cli.data_dir, cli.node_id)?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!(node_id = %config.node_id, data_dir = %config.data_dir.display(), "loaded configuration");

    std::fs::create_dir_all(&config.data_dir)?;
    let store = create_persistent_store(&config.data_dir)?;
    let channels = ChannelStates::new(store.clone(), &config);

    let output = execute(cli.command.into(), &channels, &config.node_id).await;
    store.flush()?;

    println!("{}", output?);
    Ok(())
}
