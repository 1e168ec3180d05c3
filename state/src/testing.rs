//! Store wrappers that inject failures and contention in tests

use async_trait::async_trait;
use chanstate_core::{ChannelState, KvStore, StateError, StateResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::codec::StateCodec;
use crate::memory::MemoryKvStore;

/// Encode a record for seeding a store
pub fn encoded(state: &ChannelState) -> Vec<u8> {
    StateCodec::encode(Some(state)).unwrap().unwrap()
}

/// Decode whatever a memory store holds at `key`
pub fn stored(store: &MemoryKvStore, key: &str) -> Option<ChannelState> {
    StateCodec::decode(key, store.raw_get(key).as_deref()).unwrap()
}

/// Wraps a memory store, failing reads of selected keys and counting calls
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryKvStore,
    failing_keys: Mutex<HashSet<String>>,
    fail_list: Mutex<bool>,
    stale_keys: Mutex<Vec<String>>,
    pub gets: AtomicUsize,
    pub writes: AtomicUsize,
    pub lists: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: MemoryKvStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn fail_key(&self, key: &str) {
        self.failing_keys.lock().insert(key.to_string());
    }

    pub fn fail_list(&self) {
        *self.fail_list.lock() = true;
    }

    /// Report `key` on the first page as if it was deleted after listing
    pub fn list_stale_key(&self, key: &str) {
        self.stale_keys.lock().push(key.to_string());
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KvStore for FaultyStore {
    async fn get(&self, key: &str) -> StateResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.failing_keys.lock().contains(key) {
            return Err(StateError::StoreUnavailable(format!("injected failure on {}", key)));
        }
        self.inner.get(key).await
    }

    async fn conditional_write(
        &self,
        key: &str,
        new: Option<&[u8]>,
        expected: Option<&[u8]>,
    ) -> StateResult<bool> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.conditional_write(key, new, expected).await
    }

    async fn list(&self, page: usize, per_page: usize) -> StateResult<Vec<String>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if *self.fail_list.lock() {
            return Err(StateError::StoreUnavailable("injected list failure".to_string()));
        }
        let mut keys = self.inner.list(page, per_page).await?;
        if page == 0 {
            keys.extend(self.stale_keys.lock().iter().cloned());
        }
        Ok(keys)
    }
}

type Interference = Box<dyn Fn(Option<ChannelState>) -> Option<ChannelState> + Send + Sync>;

/// Simulates another writer that changes the key between our read and our
/// conditional write, for the first `rounds` write attempts.
pub struct ContendedStore {
    pub inner: MemoryKvStore,
    interference: Interference,
    rounds: AtomicUsize,
    pub writes: AtomicUsize,
}

impl ContendedStore {
    pub fn new<F>(inner: MemoryKvStore, rounds: usize, interference: F) -> Self
    where
        F: Fn(Option<ChannelState>) -> Option<ChannelState> + Send + Sync + 'static,
    {
        Self {
            inner,
            interference: Box::new(interference),
            rounds: AtomicUsize::new(rounds),
            writes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl KvStore for ContendedStore {
    async fn get(&self, key: &str) -> StateResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn conditional_write(
        &self,
        key: &str,
        new: Option<&[u8]>,
        expected: Option<&[u8]>,
    ) -> StateResult<bool> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let remaining = self.rounds.load(Ordering::SeqCst);
        if remaining > 0 {
            self.rounds.store(remaining - 1, Ordering::SeqCst);
            let current = self.inner.raw_get(key);
            let theirs = (self.interference)(StateCodec::decode(key, current.as_deref())?);
            let theirs = StateCodec::encode(theirs.as_ref())?;
            assert!(
                self.inner
                    .conditional_write(key, theirs.as_deref(), current.as_deref())
                    .await?
            );
        }
        self.inner.conditional_write(key, new, expected).await
    }

    async fn list(&self, page: usize, per_page: usize) -> StateResult<Vec<String>> {
        self.inner.list(page, per_page).await
    }
}
