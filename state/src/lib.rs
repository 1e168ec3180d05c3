//! chanstate State Management
//!
//! Keeps small per-channel records in a shared key-value store that
//! several processes write concurrently. Updates are optimistic
//! read-transform-write cycles guarded by single-key compare-and-swap;
//! sweeps apply one transform to every key page by page.

pub mod codec;
pub mod atomic;
pub mod sweep;
pub mod channel;
pub mod memory;
pub mod persistent;

#[cfg(test)]
mod testing;

pub use codec::*;
pub use atomic::*;
pub use sweep::*;
pub use channel::*;
pub use memory::*;
pub use persistent::*;
