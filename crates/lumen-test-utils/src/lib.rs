//! Shared test utilities for Lumen integration tests.
//!
//! This crate provides:
//! - [`RecordingGraphStore`]: In-memory graph store with operation recording
//!   and failure injection
//! - [`TopologyBuilder`]: Fluent construction of seeded topologies
//! - Fake path computer, provisioner and notification sink
//! - Custom assertion helpers
//!
//! # Example
//!
//! ```rust,ignore
//! use lumen_test_utils::{end_to_end_topology, e2e};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let store = end_to_end_topology().seed();
//!     // ... run test ...
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod assertions;
pub mod fixtures;
pub mod storage;

pub use assertions::*;
pub use fixtures::*;
pub use storage::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("lumen_tapi=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
