//! Paginated transformation of every key in the store
//!
//! The sweep walks the keyspace page by page and runs one transform
//! through the atomic updater for each key. There is no snapshot: keys
//! created behind the current page can be missed, and keys deleted after
//! listing simply arrive at the transform as `None`.
//!
//! A sweep that fails stops at the failing key. Keys before it keep their
//! new value, the rest are untouched, and running the sweep again is the
//! way to finish the job, so sweep transforms must be idempotent.

use chanstate_core::{ChannelState, KvStore, StateError, StateResult, SweepConfig};
use tracing::{debug, info};

use crate::atomic::{AtomicStateUpdater, UpdateOutcome};

/// Totals for a completed sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Non-empty pages processed
    pub pages: usize,
    pub keys_visited: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: UpdateOutcome) {
        self.keys_visited += 1;
        match outcome {
            UpdateOutcome::Created => self.created += 1,
            UpdateOutcome::Updated => self.updated += 1,
            UpdateOutcome::Deleted => self.deleted += 1,
            UpdateOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

/// Applies a transform to every key in the store
pub struct KeyspaceSweeper<S: ?Sized> {
    updater: AtomicStateUpdater<S>,
    page_size: usize,
}

impl<S: KvStore + ?Sized> KeyspaceSweeper<S> {
    pub fn with_config(updater: AtomicStateUpdater<S>, config: &SweepConfig) -> Self {
        Self {
            updater,
            page_size: config.page_size.max(1),
        }
    }

    pub fn updater(&self) -> &AtomicStateUpdater<S> {
        &self.updater
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Run `transform` over every key, stopping at the first failure.
    ///
    /// Keys that hold no record reach `transform` as `None`; returning
    /// `None` for them leaves them alone.
    pub async fn sweep_all<F>(&self, transform: F) -> StateResult<SweepReport>
    where
        F: Fn(Option<ChannelState>) -> StateResult<Option<ChannelState>>,
    {
        let mut report = SweepReport::default();
        let mut page = 0;

        loop {
            let keys = self
                .updater
                .store()
                .list(page, self.page_size)
                .await
                .map_err(|e| StateError::SweepAborted {
                    completed: report.keys_visited,
                    key: None,
                    source: Box::new(e),
                })?;

            if keys.is_empty() {
                break;
            }

            for key in &keys {
                let update = self.updater.update(key, &transform).await.map_err(|e| {
                    StateError::SweepAborted {
                        completed: report.keys_visited,
                        key: Some(key.clone()),
                        source: Box::new(e),
                    }
                })?;
                debug!(key = %key, outcome = ?update.outcome, "swept key");
                report.record(update.outcome);
            }

            report.pages += 1;
            page += 1;
        }

        info!(
            pages = report.pages,
            keys = report.keys_visited,
            updated = report.updated,
            deleted = report.deleted,
            "keyspace sweep complete"
        );
        Ok(report)
    }
}

/// Cleanup transform: drop ownership and members, keep `enabled`.
///
/// Keys without a record stay without one.
pub fn clear_ownership(state: Option<ChannelState>) -> StateResult<Option<ChannelState>> {
    Ok(state.map(|mut state| {
        state.node_id.clear();
        state.users.clear();
        state
    }))
}
