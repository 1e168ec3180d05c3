//! CLI Commands

use chanstate_core::{KvStore, StateConfig};
use chanstate_state::{ChannelStates, UpdateReport};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Operation requested on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Show { channel: String },
    List,
    Enable { channel: String },
    Disable { channel: String },
    Join { channel: String, user: String },
    Leave { channel: String, user: String },
    Claim { channel: String },
    Release { channel: String },
    Remove { channel: String },
    Cleanup,
}

/// Load the config file if given, apply overrides and fill in a node id
pub fn resolve_config(
    config_path: Option<&Path>,
    data_dir: Option<PathBuf>,
    node_id: Option<String>,
) -> anyhow::Result<StateConfig> {
    let mut config = match config_path {
        Some(path) => StateConfig::from_json_file(path)?,
        None => StateConfig::default(),
    };

    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    if let Some(id) = node_id {
        config.node_id = id;
    }
    if config.node_id.is_empty() {
        config.node_id = uuid::Uuid::new_v4().to_string();
    }

    config.validate()?;
    Ok(config)
}

#[derive(Serialize)]
struct ListedChannel<'a> {
    channel: &'a str,
    #[serde(flatten)]
    state: &'a chanstate_core::ChannelState,
}

/// Run one action, returning the text to print
pub async fn execute<S: KvStore + ?Sized>(
    action: Action,
    channels: &ChannelStates<S>,
    node_id: &str,
) -> anyhow::Result<String> {
    let output = match action {
        Action::Show { channel } => match channels.get(&channel).await? {
            Some(state) => serde_json::to_string_pretty(&state)?,
            None => format!("No state for channel {}", channel),
        },
        Action::List => {
            let all = channels.list_all().await?;
            let listed: Vec<ListedChannel<'_>> = all
                .iter()
                .map(|(channel, state)| ListedChannel { channel, state })
                .collect();
            serde_json::to_string_pretty(&listed)?
        }
        Action::Enable { channel } => {
            describe(&channel, channels.set_enabled(&channel, true).await?)
        }
        Action::Disable { channel } => {
            describe(&channel, channels.set_enabled(&channel, false).await?)
        }
        Action::Join { channel, user } => {
            describe(&channel, channels.add_user(&channel, &user).await?)
        }
        Action::Leave { channel, user } => {
            describe(&channel, channels.remove_user(&channel, &user).await?)
        }
        Action::Claim { channel } => describe(&channel, channels.claim(&channel, node_id).await?),
        Action::Release { channel } => {
            describe(&channel, channels.release(&channel, node_id).await?)
        }
        Action::Remove { channel } => describe(&channel, channels.remove(&channel).await?),
        Action::Cleanup => {
            let report = channels.clean_up().await?;
            info!(keys = report.keys_visited, "cleanup finished");
            format!(
                "Cleaned {} keys over {} pages ({} updated, {} unchanged)",
                report.keys_visited, report.pages, report.updated, report.unchanged
            )
        }
    };

    Ok(output)
}

fn describe(channel: &str, report: UpdateReport) -> String {
    format!("{}: {:?} after {} attempt(s)", channel, report.outcome, report.attempts)
}
