//! Channel-level operations built on atomic updates
//!
//! Each operation is a small transform handed to the
//! [`AtomicStateUpdater`], so concurrent callers in other processes never
//! overwrite each other's changes.

use chanstate_core::{ChannelState, KvStore, StateConfig, StateError, StateResult};
use std::sync::Arc;

use crate::atomic::{ensure_id, AtomicStateUpdater, UpdateReport};
use crate::sweep::{clear_ownership, KeyspaceSweeper, SweepReport};

/// Per-channel state kept in a shared store
pub struct ChannelStates<S: ?Sized> {
    sweeper: KeyspaceSweeper<S>,
}

impl<S: KvStore + ?Sized> ChannelStates<S> {
    pub fn new(store: Arc<S>, config: &StateConfig) -> Self {
        let updater = AtomicStateUpdater::with_retry(store, config.retry.clone());
        Self {
            sweeper: KeyspaceSweeper::with_config(updater, &config.sweep),
        }
    }

    pub fn updater(&self) -> &AtomicStateUpdater<S> {
        self.sweeper.updater()
    }

    pub async fn get(&self, channel_id: &str) -> StateResult<Option<ChannelState>> {
        self.updater().get(channel_id).await
    }

    /// All channels holding a record, in store order
    pub async fn list_all(&self) -> StateResult<Vec<(String, ChannelState)>> {
        let store = self.updater().store();
        let page_size = self.sweeper.page_size();
        let mut channels = Vec::new();
        let mut page = 0;

        loop {
            let keys = store.list(page, page_size).await?;
            if keys.is_empty() {
                break;
            }
            for key in keys {
                if let Some(state) = self.get(&key).await? {
                    channels.push((key, state));
                }
            }
            page += 1;
        }

        Ok(channels)
    }

    /// Enable or disable a channel, creating its record if needed
    pub async fn set_enabled(&self, channel_id: &str, enabled: bool) -> StateResult<UpdateReport> {
        self.updater()
            .update(channel_id, |state| {
                let mut state = state.unwrap_or_default();
                state.enabled = enabled;
                Ok(Some(state))
            })
            .await
    }

    pub async fn add_user(&self, channel_id: &str, user_id: &str) -> StateResult<UpdateReport> {
        ensure_id("user id", user_id)?;
        self.updater()
            .update(channel_id, |state| {
                let mut state = state.unwrap_or_default();
                state.users.insert(user_id.to_string());
                Ok(Some(state))
            })
            .await
    }

    pub async fn remove_user(&self, channel_id: &str, user_id: &str) -> StateResult<UpdateReport> {
        ensure_id("user id", user_id)?;
        self.updater()
            .update(channel_id, |state| {
                Ok(state.map(|mut state| {
                    state.users.remove(user_id);
                    state
                }))
            })
            .await
    }

    /// Make `node_id` the owner unless another node already owns the channel
    pub async fn claim(&self, channel_id: &str, node_id: &str) -> StateResult<UpdateReport> {
        ensure_id("node id", node_id)?;
        self.updater()
            .update(channel_id, |state| {
                let mut state = state.unwrap_or_default();
                match state.owner() {
                    Some(owner) if owner != node_id => Err(StateError::OwnershipConflict {
                        channel: channel_id.to_string(),
                        owner: owner.to_string(),
                    }),
                    _ => {
                        state.node_id = node_id.to_string();
                        Ok(Some(state))
                    }
                }
            })
            .await
    }

    /// Drop ownership and members if `node_id` owns the channel
    pub async fn release(&self, channel_id: &str, node_id: &str) -> StateResult<UpdateReport> {
        ensure_id("node id", node_id)?;
        self.updater()
            .update(channel_id, |state| match state {
                Some(state) if state.is_owned_by(node_id) => clear_ownership(Some(state)),
                other => Ok(other),
            })
            .await
    }

    /// Delete the channel's record
    pub async fn remove(&self, channel_id: &str) -> StateResult<UpdateReport> {
        self.updater().update(channel_id, |_| Ok(None)).await
    }

    /// Clear ownership and members on every channel, keeping `enabled`.
    ///
    /// On failure some channels may already be cleaned; calling this again
    /// finishes the rest.
    pub async fn clean_up(&self) -> StateResult<SweepReport> {
        self.sweeper.sweep_all(clear_ownership).await
    }
}
