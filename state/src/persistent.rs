//! Persistent key-value store using sled database

use async_trait::async_trait;
use chanstate_core::{KvStore, StateError, StateResult};
use parking_lot::Mutex;
use sled::{Db, IVec, Tree};
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

const CHANNELS_TREE: &str = "channels";

/// Where the previous `list` call stopped
struct ListCursor {
    next_page: usize,
    per_page: usize,
    last_key: IVec,
}

/// Persistent store backed by sled's atomic compare-and-swap
pub struct PersistentKvStore {
    db: Db,
    channels: Tree,
    cursor: Mutex<Option<ListCursor>>,
}

impl PersistentKvStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StateResult<Self> {
        let db = sled::open(path).map_err(|e| StateError::StoreUnavailable(e.to_string()))?;

        let channels = db
            .open_tree(CHANNELS_TREE)
            .map_err(|e| StateError::StoreUnavailable(e.to_string()))?;

        Ok(Self {
            db,
            channels,
            cursor: Mutex::new(None),
        })
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> StateResult<()> {
        self.db
            .flush()
            .map(|_| ())
            .map_err(|e| StateError::StoreUnavailable(e.to_string()))
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Resume point for `page`, if it directly follows the previous call
    fn resume_after(&self, page: usize, per_page: usize) -> Option<IVec> {
        match &*self.cursor.lock() {
            Some(c) if page > 0 && c.next_page == page && c.per_page == per_page => {
                Some(c.last_key.clone())
            }
            _ => None,
        }
    }
}

#[async_trait]
impl KvStore for PersistentKvStore {
    async fn get(&self, key: &str) -> StateResult<Option<Vec<u8>>> {
        self.channels
            .get(key)
            .map(|opt| opt.map(|v| v.to_vec()))
            .map_err(|e| StateError::StoreUnavailable(e.to_string()))
    }

    async fn conditional_write(
        &self,
        key: &str,
        new: Option<&[u8]>,
        expected: Option<&[u8]>,
    ) -> StateResult<bool> {
        let swapped = self
            .channels
            .compare_and_swap(key, expected, new)
            .map_err(|e| StateError::StoreUnavailable(e.to_string()))?;
        Ok(swapped.is_ok())
    }

    /// Sequential pages continue after the last returned key instead of
    /// re-skipping from the start, so a full sweep stays linear. Any other
    /// page is found by offset.
    async fn list(&self, page: usize, per_page: usize) -> StateResult<Vec<String>> {
        let keys = match self.resume_after(page, per_page) {
            Some(last) => self
                .channels
                .range((Bound::Excluded(last), Bound::Unbounded))
                .keys()
                .take(per_page)
                .collect::<Result<Vec<IVec>, _>>(),
            None => self
                .channels
                .iter()
                .keys()
                .skip(page.saturating_mul(per_page))
                .take(per_page)
                .collect::<Result<Vec<IVec>, _>>(),
        }
        .map_err(|e| StateError::StoreUnavailable(e.to_string()))?;

        *self.cursor.lock() = keys.last().map(|last| ListCursor {
            next_page: page + 1,
            per_page,
            last_key: last.clone(),
        });

        keys.into_iter()
            .map(|key| {
                String::from_utf8(key.to_vec())
                    .map_err(|_| StateError::InvalidKey(format!("non UTF-8 key {:?}", key)))
            })
            .collect()
    }
}

/// Thread-safe persistent store wrapper
pub type SharedPersistentKvStore = Arc<PersistentKvStore>;

/// Create a shared persistent store
pub fn create_persistent_store<P: AsRef<Path>>(path: P) -> StateResult<SharedPersistentKvStore> {
    Ok(Arc::new(PersistentKvStore::open(path)?))
}
