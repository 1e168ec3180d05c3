//! Error types for chanstate

use thiserror::Error;

/// Main error type for chanstate
#[derive(Error, Debug)]
pub enum StateError {
    // ============ Record Errors ============
    #[error("Malformed record at key {key}: {reason}")]
    MalformedRecord { key: String, reason: String },

    #[error("Record encoding failed: {0}")]
    Encoding(String),

    // ============ Store Errors ============
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Gave up on key {key} after {attempts} conflicting writes")]
    ConflictRetriesExhausted { key: String, attempts: u32 },

    #[error(
        "failed to clean up state after {completed} keys{location}: {source}",
        location = key_suffix(.key)
    )]
    SweepAborted {
        /// Keys fully processed before the failure
        completed: usize,
        /// Key being processed when the sweep stopped, if the failure was
        /// not in listing
        key: Option<String>,
        #[source]
        source: Box<StateError>,
    },

    // ============ Channel Errors ============
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Channel {channel} is owned by node {owner}")]
    OwnershipConflict { channel: String, owner: String },

    // ============ Configuration Errors ============
    #[error("Configuration error: {0}")]
    Config(String),
}

fn key_suffix(key: &Option<String>) -> String {
    match key {
        Some(k) => format!(" (at key {})", k),
        None => String::new(),
    }
}

impl StateError {
    /// True when an update gave up because other writers kept winning
    pub fn is_conflict_exhausted(&self) -> bool {
        matches!(self, StateError::ConflictRetriesExhausted { .. })
    }

    /// True when a sweep stopped partway; re-running the sweep is safe
    pub fn is_partial_sweep(&self) -> bool {
        matches!(self, StateError::SweepAborted { .. })
    }

    /// Innermost cause, looking through sweep wrappers
    pub fn root_cause(&self) -> &StateError {
        match self {
            StateError::SweepAborted { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
