//! # lumen-core
//!
//! Core abstractions for the Lumen connectivity-state engine.
//!
//! This crate provides the foundational types used across all Lumen components:
//!
//! - **Identifiers**: Strongly-typed IDs for nodes, edge points, connections and services
//! - **Content Hashing**: Stable, content-derived identifiers for idempotent construction
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization and span helpers
//!
//! ## Crate Boundary
//!
//! `lumen-core` is the **only** crate allowed to define shared primitives.
//! The engine crate builds its model on top of these identifiers.
//!
//! ## Example
//!
//! ```rust
//! use lumen_core::prelude::*;
//!
//! let ep = EdgePointId::new("ROADM-A:DEG1-TTP");
//! let cep = CepId::derive(&["ROADM-A", ep.as_str(), "PHOTONIC_MEDIA", "a-end"]);
//! assert!(cep.as_str().starts_with("cep_"));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod observability;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::id::{CepId, ConnectionId, EdgePointId, NodeId, ServiceId, StreamId};
    pub use crate::observability::{LogFormat, init_logging};
}

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use id::{CepId, ConnectionId, EdgePointId, NodeId, ServiceId, StreamId, content_id};
pub use observability::{LogFormat, init_logging};
