//! # teamsync testkit
//!
//! Test utilities for the teamsync crates.
//!
//! This crate provides:
//! - Entity fixtures and temporary file stores
//! - Property-based test generators using proptest
//! - Store doubles that fail or record writes
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust
//! use teamsync_testkit::prelude::*;
//!
//! let batch = sample_batch();
//! assert!(!batch.is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;
pub mod stores;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use crate::stores::*;
}

pub use fixtures::*;
pub use generators::*;
pub use logging::*;
pub use stores::*;
