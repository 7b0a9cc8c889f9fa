//! Error types shared across the crate.

use thiserror::Error;

/// Errors the simulator can report.
#[derive(Debug, Error)]
pub enum SimError {
    /// The configuration file was missing, malformed, or described a node
    /// class whose parameters cannot be satisfied (e.g. `k > n`, or not
    /// enough `storage_size` to hold the node's own blocks).
    #[error("configuration error: {0}")]
    Config(String),

    /// A node's dataset has become permanently unrecoverable. Never raised
    /// automatically by this implementation (see SPEC_FULL.md §9); reserved
    /// for an external oracle driven off `Summary`.
    #[error("data lost: {0}")]
    DataLost(String),
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, SimError>;
