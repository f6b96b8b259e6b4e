//! Tranca Common - shared types for the lock simulations
//!
//! This crate provides the foundational pieces used across Tranca components:
//! - Error types
//! - The injectable millisecond clock
//! - The process-wide fencing token source

pub mod clock;
pub mod error;
pub mod token;

// Re-exports for convenience
pub use clock::{Clock, SimClock, SystemClock};
pub use error::TrancaError;
pub use token::FenceTokenSource;
