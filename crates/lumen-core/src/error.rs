//! Errors raised by the shared primitives.
//!
//! Only identifier validation and configuration-value parsing fail in this
//! crate; the engine wraps these in its own error type.

/// Result alias for `lumen-core` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from identifier and value parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// An identifier was empty or contained whitespace or control characters.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// A textual value could not be parsed (for example a log format name).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
