//! Optimistic read-transform-write of a single key
//!
//! Every update re-reads the key, applies the caller's transform to the
//! decoded record and writes the result back with a conditional write that
//! only succeeds if nobody changed the key in between. A lost race starts
//! the cycle again, so the transform may run several times for one call and
//! must not have side effects.

use chanstate_core::{ChannelState, KvStore, RetryConfig, StateError, StateResult};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::codec::StateCodec;

/// What a successful update did to the stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Transform returned the current value; nothing was written
    Unchanged,
    Created,
    Updated,
    Deleted,
}

/// Result of a successful update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateReport {
    pub outcome: UpdateOutcome,
    /// Read-transform-write cycles used, including the successful one
    pub attempts: u32,
}

/// Applies transforms to single keys with compare-and-swap retries
pub struct AtomicStateUpdater<S: ?Sized> {
    store: Arc<S>,
    retry: RetryConfig,
}

impl<S: KvStore + ?Sized> AtomicStateUpdater<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_retry(store, RetryConfig::default())
    }

    pub fn with_retry(store: Arc<S>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Read and decode the record at `key` without writing
    pub async fn get(&self, key: &str) -> StateResult<Option<ChannelState>> {
        ensure_id("key", key)?;
        let raw = self.store.get(key).await?;
        StateCodec::decode(key, raw.as_deref())
    }

    /// Atomically replace the record at `key` with `transform(current)`.
    ///
    /// `transform` receives `None` when the key holds no record and returns
    /// `None` to delete it. Only lost conditional writes are retried;
    /// malformed data, store failures and transform errors end the call
    /// with the key untouched.
    pub async fn update<F>(&self, key: &str, transform: F) -> StateResult<UpdateReport>
    where
        F: Fn(Option<ChannelState>) -> StateResult<Option<ChannelState>>,
    {
        ensure_id("key", key)?;
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let raw = self.store.get(key).await?;
            let current = StateCodec::decode(key, raw.as_deref())?;
            let desired = transform(current.clone())?;

            if desired == current {
                return Ok(UpdateReport {
                    outcome: UpdateOutcome::Unchanged,
                    attempts: attempt,
                });
            }

            let encoded = StateCodec::encode(desired.as_ref())?;
            if self
                .store
                .conditional_write(key, encoded.as_deref(), raw.as_deref())
                .await?
            {
                let outcome = match (current.is_some(), desired.is_some()) {
                    (false, true) => UpdateOutcome::Created,
                    (true, true) => UpdateOutcome::Updated,
                    (true, false) => UpdateOutcome::Deleted,
                    (false, false) => UpdateOutcome::Unchanged,
                };
                return Ok(UpdateReport { outcome, attempts: attempt });
            }

            debug!(key, attempt, "conditional write rejected, value changed concurrently");

            if attempt < max_attempts {
                let delay = self.backoff(attempt - 1);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(StateError::ConflictRetriesExhausted {
            key: key.to_string(),
            attempts: max_attempts,
        })
    }

    fn backoff(&self, retry: u32) -> Duration {
        let base = self.retry.backoff_for_retry(retry);
        if self.retry.jitter_ratio <= 0.0 || base.is_zero() {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=self.retry.jitter_ratio);
        base + base.mul_f64(jitter)
    }
}

/// Reject empty identifiers before touching the store
pub(crate) fn ensure_id(kind: &str, value: &str) -> StateResult<()> {
    if value.is_empty() {
        return Err(StateError::InvalidKey(format!("{} must not be empty", kind)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKvStore;
    use crate::testing::{encoded, stored, ContendedStore, FaultyStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn add_user(user: &'static str) -> impl Fn(Option<ChannelState>) -> StateResult<Option<ChannelState>> {
        move |state| {
            let mut state = state.unwrap_or_default();
            state.users.insert(user.to_string());
            Ok(Some(state))
        }
    }

    #[tokio::test]
    async fn test_update_creates_missing_record() {
        let store = Arc::new(MemoryKvStore::new());
        let updater = AtomicStateUpdater::new(store.clone());
        let seen = parking_lot::Mutex::new(Vec::new());

        let report = updater
            .update("chan-1", |state| {
                seen.lock().push(state);
                Ok(Some(ChannelState::new(true).with_owner("node-1")))
            })
            .await
            .unwrap();

        assert_eq!(report.outcome, UpdateOutcome::Created);
        assert_eq!(report.attempts, 1);
        assert_eq!(*seen.lock(), vec![None]);
        assert_eq!(
            stored(&store, "chan-1"),
            Some(ChannelState::new(true).with_owner("node-1"))
        );
    }

    #[tokio::test]
    async fn test_update_absent_to_absent_writes_nothing() {
        let store = Arc::new(FaultyStore::default());
        let updater = AtomicStateUpdater::new(store.clone());

        let report = updater.update("chan-1", |state| Ok(state)).await.unwrap();

        assert_eq!(report.outcome, UpdateOutcome::Unchanged);
        assert_eq!(store.writes(), 0);
        assert!(store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_identity_keeps_bytes() {
        // Non-canonical layout with an unknown field must survive untouched
        let raw = br#"{ "enabled": true, "users": {"u1": {}}, "future_field": 42 }"#;
        let store = Arc::new(FaultyStore::new(MemoryKvStore::with_data(vec![(
            "chan-1".to_string(),
            raw.to_vec(),
        )])));
        let updater = AtomicStateUpdater::new(store.clone());

        let report = updater.update("chan-1", |state| Ok(state)).await.unwrap();

        assert_eq!(report.outcome, UpdateOutcome::Unchanged);
        assert_eq!(store.writes(), 0);
        assert_eq!(store.inner.raw_get("chan-1"), Some(raw.to_vec()));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = Arc::new(MemoryKvStore::new());
        store.raw_put("chan-1", &encoded(&ChannelState::new(false)));
        let updater = AtomicStateUpdater::new(store.clone());

        let report = updater
            .update("chan-1", |state| {
                Ok(state.map(|mut s| {
                    s.enabled = true;
                    s
                }))
            })
            .await
            .unwrap();
        assert_eq!(report.outcome, UpdateOutcome::Updated);
        assert_eq!(stored(&store, "chan-1"), Some(ChannelState::new(true)));

        let report = updater.update("chan-1", |_| Ok(None)).await.unwrap();
        assert_eq!(report.outcome, UpdateOutcome::Deleted);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_record_is_not_retried_or_written() {
        let store = Arc::new(FaultyStore::new(MemoryKvStore::with_data(vec![(
            "chan-1".to_string(),
            b"\x00garbage".to_vec(),
        )])));
        let updater = AtomicStateUpdater::new(store.clone());
        let calls = AtomicUsize::new(0);

        let err = updater
            .update("chan-1", |state| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(state)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StateError::MalformedRecord { ref key, .. } if key == "chan-1"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.writes(), 0);
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_terminal() {
        let store = Arc::new(FaultyStore::default());
        store.fail_key("chan-1");
        let updater = AtomicStateUpdater::new(store.clone());

        let err = updater.update("chan-1", add_user("u1")).await.unwrap_err();

        assert!(matches!(err, StateError::StoreUnavailable(_)));
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_transform_rejection_leaves_key_untouched() {
        let store = Arc::new(FaultyStore::default());
        store.inner.raw_put("chan-1", &encoded(&ChannelState::new(true)));
        let updater = AtomicStateUpdater::new(store.clone());

        let err = updater
            .update("chan-1", |_| Err(StateError::InvalidKey("rejected".into())))
            .await
            .unwrap_err();

        assert!(matches!(err, StateError::InvalidKey(_)));
        assert_eq!(store.writes(), 0);
        assert_eq!(stored(&store.inner, "chan-1"), Some(ChannelState::new(true)));
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let store = Arc::new(FaultyStore::default());
        let updater = AtomicStateUpdater::new(store.clone());

        let err = updater.update("", add_user("u1")).await.unwrap_err();
        assert!(matches!(err, StateError::InvalidKey(_)));
        assert_eq!(store.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lost_race_reapplies_transform_on_fresh_value() {
        let inner = MemoryKvStore::new();
        inner.raw_put("chan-1", &encoded(&ChannelState::new(true)));
        let store = Arc::new(ContendedStore::new(inner, 1, |state| {
            state.map(|mut s| {
                s.users.insert("theirs".to_string());
                s
            })
        }));
        let updater = AtomicStateUpdater::with_retry(store.clone(), RetryConfig::no_backoff(5));
        let calls = AtomicUsize::new(0);

        let report = updater
            .update("chan-1", |state| {
                calls.fetch_add(1, Ordering::SeqCst);
                add_user("ours")(state)
            })
            .await
            .unwrap();

        assert_eq!(report.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            stored(&store.inner, "chan-1"),
            Some(ChannelState::new(true).with_users(["ours", "theirs"]))
        );
    }

    #[tokio::test]
    async fn test_conflict_retries_exhausted() {
        let inner = MemoryKvStore::new();
        inner.raw_put("chan-1", &encoded(&ChannelState::new(false)));
        let store = Arc::new(ContendedStore::new(inner, 100, |state| {
            state.map(|mut s| {
                s.enabled = !s.enabled;
                s
            })
        }));
        let updater = AtomicStateUpdater::with_retry(store.clone(), RetryConfig::no_backoff(3));

        let err = updater.update("chan-1", add_user("u1")).await.unwrap_err();

        assert!(err.is_conflict_exhausted());
        assert!(matches!(err, StateError::ConflictRetriesExhausted { attempts: 3, .. }));
        assert_eq!(store.writes.load(Ordering::SeqCst), 3);
        // Only the competing writer's changes landed
        assert!(!stored(&store.inner, "chan-1").unwrap().has_user("u1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_lose_nothing() {
        let store = Arc::new(MemoryKvStore::new());
        let mut handles = Vec::new();

        for i in 0..16 {
            let updater = AtomicStateUpdater::new(store.clone());
            handles.push(tokio::spawn(async move {
                let user = format!("user-{}", i);
                updater
                    .update("chan-1", move |state| {
                        let mut state = state.unwrap_or_default();
                        state.users.insert(user.clone());
                        Ok(Some(state))
                    })
                    .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let state = stored(&store, "chan-1").unwrap();
        assert_eq!(state.users.len(), 16);
        assert!((0..16).all(|i| state.has_user(&format!("user-{}", i))));
    }

    #[tokio::test]
    async fn test_get_decodes_without_writing() {
        let store = Arc::new(FaultyStore::default());
        store.inner.raw_put("chan-1", &encoded(&ChannelState::new(true)));
        let updater = AtomicStateUpdater::new(store.clone());

        assert_eq!(updater.get("chan-1").await.unwrap(), Some(ChannelState::new(true)));
        assert_eq!(updater.get("chan-2").await.unwrap(), None);
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let updater = AtomicStateUpdater::new(Arc::new(MemoryKvStore::new()));
        for retry in 0..10 {
            let base = updater.retry_config().backoff_for_retry(retry);
            let delay = updater.backoff(retry);
            assert!(delay >= base);
            assert!(delay <= base + base.mul_f64(0.25));
        }
    }
}
