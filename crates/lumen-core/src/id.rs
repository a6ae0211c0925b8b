//! Strongly-typed identifiers for topology and service entities.
//!
//! All identifiers in Lumen are:
//! - **Strongly typed**: Prevents mixing up different ID types at compile time
//! - **Opaque strings**: Upstream topology discovery owns edge point and node naming
//! - **Content-derivable**: Connection, CEP and service IDs built by the engine
//!   are stable digests of their qualifying attributes (see [`content_id`])
//!
//! # Example
//!
//! ```rust
//! use lumen_core::id::{ConnectionId, EdgePointId};
//!
//! let ep = EdgePointId::new("ROADM-A:DEG1-TTP");
//! let conn = ConnectionId::derive(&["PHOTONIC_MEDIA", "top", "ROADM-A", "ROADM-B"]);
//!
//! // IDs are different types - this won't compile:
//! // let wrong: ConnectionId = ep;
//! assert!(conn.as_str().starts_with("conn_"));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Number of digest bytes kept in a content-derived identifier (96 bits).
const CONTENT_ID_BYTES: usize = 12;

/// Computes a content-derived identifier from qualifying attributes.
///
/// Each part is length-prefixed before hashing so that `["ab", "c"]` and
/// `["a", "bc"]` never collide.
///
/// Format: `{prefix}_{hex(sha256(parts))[0..24]}`
#[must_use]
pub fn content_id(prefix: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    let hash = hasher.finalize();
    let hex_encoded = hex::encode(hash.get(..CONTENT_ID_BYTES).unwrap_or(&hash));
    format!("{prefix}_{hex_encoded}")
}

fn validate(kind: &str, s: &str) -> Result<()> {
    if s.is_empty() {
        return Err(Error::InvalidId {
            message: format!("{kind} ID must not be empty"),
        });
    }
    if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidId {
            message: format!("invalid {kind} ID '{s}': contains whitespace or control characters"),
        });
    }
    Ok(())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a trusted identifier without validation.
            ///
            /// Use [`FromStr`] for identifiers arriving from outside the process.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                validate($kind, s)?;
                Ok(Self(s.to_string()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a network element (ROADM, transponder, switch).
    NodeId,
    "node"
);

string_id!(
    /// Identifier of an edge point (node edge point in TAPI terms).
    ///
    /// Edge points are named by topology discovery, e.g. `ROADM-A:DEG1-TTP`.
    EdgePointId,
    "edge point"
);

string_id!(
    /// Identifier of a connection end point.
    CepId,
    "cep"
);

string_id!(
    /// Identifier of a connection (top or cross-connection).
    ConnectionId,
    "connection"
);

string_id!(
    /// Identifier of a connectivity service.
    ServiceId,
    "service"
);

string_id!(
    /// Identifier of an inbound lifecycle event stream (e.g. `pce`, `renderer`).
    StreamId,
    "stream"
);

impl CepId {
    /// Derives a CEP identifier from its qualifying attributes.
    #[must_use]
    pub fn derive(parts: &[&str]) -> Self {
        Self(content_id("cep", parts))
    }
}

impl ConnectionId {
    /// Derives a connection identifier from its qualifying attributes.
    #[must_use]
    pub fn derive(parts: &[&str]) -> Self {
        Self(content_id("conn", parts))
    }
}

impl ServiceId {
    /// Derives a service identifier from a customer-facing service name.
    #[must_use]
    pub fn derive(service_name: &str) -> Self {
        Self(content_id("svc", &[service_name]))
    }
}
