//! chanstate Core Library
//!
//! Core types, traits, and abstractions for keeping per-channel state in a
//! shared key-value store. This crate provides the foundation for the
//! state and CLI crates.

pub mod types;
pub mod traits;
pub mod error;
pub mod config;

pub use types::*;
pub use traits::*;
pub use error::*;
pub use config::*;
