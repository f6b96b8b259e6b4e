//! Majority-quorum lock simulation
//!
//! This module provides:
//! - The node entry / config / grant model
//! - The node-store capability trait and its in-memory instantiation
//! - The quorum acquisition service with validity-budget arithmetic

mod model;
mod service;

pub use model::*;
pub use service::*;
