//! Core traits defining chanstate interfaces
//!
//! The shared key-value store is reached only through [`KvStore`], so any
//! backend offering single-key compare-and-swap can hold channel state.

use async_trait::async_trait;

/// Result type for chanstate operations
pub type StateResult<T> = Result<T, crate::error::StateError>;

/// Key-value store shared between independent processes
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get the raw payload stored at `key`
    async fn get(&self, key: &str) -> StateResult<Option<Vec<u8>>>;

    /// Replace the value at `key` only if it currently equals `expected`.
    ///
    /// `None` as `expected` means the key must be absent; `None` as `new`
    /// deletes the key. Returns `Ok(false)` without changing anything when
    /// the current value does not match.
    async fn conditional_write(
        &self,
        key: &str,
        new: Option<&[u8]>,
        expected: Option<&[u8]>,
    ) -> StateResult<bool>;

    /// List up to `per_page` keys for the zero-based `page`.
    ///
    /// An empty page marks the end of the keyspace.
    async fn list(&self, page: usize, per_page: usize) -> StateResult<Vec<String>>;
}
