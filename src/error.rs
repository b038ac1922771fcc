//! Galerouter Error Types

use thiserror::Error;

/// Result type alias for galerouter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Galerouter error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Routing errors
    #[error("No {role} node available. Tried: {tried:?}")]
    NoAvailableNode {
        role: &'static str,
        tried: Vec<String>,
    },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    // Connectivity faults are node-scoped and failover-eligible
    #[error("Connectivity fault on node {node}: {reason}")]
    Connectivity { node: String, reason: String },

    #[error("Sync wait timed out on node {node} after {waited_ms}ms")]
    SyncTimeout { node: String, waited_ms: u64 },

    // Deterministic statement faults pass through to the caller unchanged
    // and never trigger failover
    #[error("Query failed: {message}")]
    Query { code: Option<u32>, message: String },

    // Transaction replay errors are fatal to the transaction
    #[error("Replay checksum mismatch at statement #{index}: {statement}")]
    ReplayMismatch { index: usize, statement: String },

    #[error("Transaction history limit ({limit}) exceeded, replay disabled; connection lost")]
    HistoryLimitExceeded { limit: usize },

    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    // Session/state errors
    #[error("Session state error: {0}")]
    State(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is a node-scoped connectivity fault.
    ///
    /// Only connectivity faults are failover-eligible: a deterministic
    /// statement fault would recur identically on replay and must never
    /// be treated as node failure.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::Connectivity { .. })
    }

    /// Check if this error is fatal to an open transaction
    pub fn is_fatal_to_transaction(&self) -> bool {
        matches!(
            self,
            Error::ReplayMismatch { .. }
                | Error::HistoryLimitExceeded { .. }
                | Error::TransactionAborted(_)
        )
    }
}
