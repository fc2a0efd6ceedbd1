//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers and values.
//! Each newtype ensures data validity at construction time.
//!
//! Local identifiers come from the business database and are always positive
//! integers. Remote identifiers are opaque strings issued by a marketplace.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::errors::DomainError;

// ============================================================================
// Integer-based ID types
// ============================================================================

macro_rules! positive_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "i64", into = "i64")]
        pub struct $name(i64);

        impl $name {
            /// Creates the identifier, rejecting zero and negative values
            pub fn new(value: i64) -> Result<Self, DomainError> {
                if value <= 0 {
                    return Err(DomainError::InvalidId(format!(
                        "{} must be positive, got {}",
                        stringify!($name),
                        value
                    )));
                }
                Ok(Self(value))
            }

            /// Returns the raw integer value
            #[must_use]
            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value: i64 = s.trim().parse().map_err(|e| {
                    DomainError::InvalidId(format!("Invalid {} '{}': {}", stringify!($name), s, e))
                })?;
                Self::new(value)
            }
        }

        impl TryFrom<i64> for $name {
            type Error = DomainError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

positive_id!(
    /// Identifier of a local entity (product, price, property assignment, ...)
    LocalEntityId
);
positive_id!(
    /// Identifier of the tenant (multi-tenant company) owning an entity
    TenantId
);
positive_id!(
    /// Identifier of a configured sales channel
    ChannelId
);
positive_id!(
    /// Identifier of a marketplace view (country marketplace, store view)
    ViewId
);
positive_id!(
    /// Identifier of a mirror record row ("remote product" in channel terms)
    MirrorId
);
positive_id!(
    /// Identifier of a sync request row
    SyncRequestId
);

// ============================================================================
// RemoteId
// ============================================================================

/// Opaque identifier assigned by a marketplace to the remote counterpart
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteId(String);

impl RemoteId {
    /// Creates a remote id, rejecting empty or whitespace-only values
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::InvalidRemoteId(
                "remote ID cannot be empty".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// Returns the remote id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RemoteId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RemoteId> for String {
    fn from(id: RemoteId) -> String {
        id.0
    }
}

// ============================================================================
// Fingerprint
// ============================================================================

/// Content fingerprint (SHA-256, lowercase hex) of a channel payload projection
///
/// Two projections that differ only in object key order produce the same
/// fingerprint: keys are sorted before hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wraps an existing hex digest after validating its format
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let valid = value.len() == 64
            && value
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if !valid {
            return Err(DomainError::InvalidFingerprint(format!(
                "expected 64 lowercase hex characters, got '{}'",
                value
            )));
        }
        Ok(Self(value))
    }

    /// Computes the fingerprint of a JSON value in canonical form
    pub fn of_json(value: &Value) -> Self {
        let mut canonical = String::new();
        write_canonical(value, &mut canonical);
        Self::of_bytes(canonical.as_bytes())
    }

    /// Computes the fingerprint of raw bytes
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut hex = String::with_capacity(64);
        for byte in digest.iter() {
            hex.push_str(&format!("{byte:02x}"));
        }
        Self(hex)
    }

    /// Returns the hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first 12 characters, enough for log lines
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> String {
        fp.0
    }
}

/// Serializes a JSON value with object keys sorted, independent of the
/// `serde_json` map implementation in use.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
