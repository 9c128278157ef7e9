//! # Buildflow Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Scripted fake host that records every order
//! - Unit catalog and configuration fixtures
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fake_host;
pub mod fixtures;
pub mod strategies;

pub use fake_host::FakeHost;

/// Re-export proptest for convenience.
pub use proptest;
