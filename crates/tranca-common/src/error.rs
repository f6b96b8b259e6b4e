//! Error types for Tranca
//!
//! Contention outcomes (timeout, token mismatch, lost quorum) are ordinary
//! return values throughout the lock crates. `TrancaError` covers programmer
//! errors and the execute-with-lock failure surface only.

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum TrancaError {
    #[error("caused: {0}")]
    IllegalArgument(String),

    #[error("could not acquire lock for: {0}")]
    AcquireTimeout(String),
}
