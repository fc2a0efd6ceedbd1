//! Domain error types
//!
//! This module defines error types specific to domain operations
//! (validation failures, invalid state transitions) and the error taxonomy
//! that channel adapters report back to the reconciliation engine.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// ID parsing or range error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Invalid remote ID format
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Invalid fingerprint format (expected 64 lowercase hex characters)
    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Unknown enum tag (channel type, sync type, status)
    #[error("Unknown {kind}: {value}")]
    UnknownVariant {
        /// Which enum was being parsed
        kind: &'static str,
        /// The offending value
        value: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Error taxonomy reported by channel adapters
///
/// The variant decides what the reconciliation engine does next:
/// - `RemoteTransient` and `Throttled` keep the sync request pending for a
///   bounded retry; `Throttled` also sets the earliest next attempt
/// - `RemoteRejected` fails the mirror record and the sync request
/// - `LocalData` fails fast before any network call, without consuming
///   retry budget
/// - `TransientExhausted` is what a transient failure becomes once the
///   retry budget is spent
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Network failure, timeout or server-side error
    #[error("transient remote error: {0}")]
    RemoteTransient(String),

    /// The marketplace asked us to slow down (HTTP 429 with `Retry-After`)
    #[error("rate limited: {detail}")]
    Throttled {
        detail: String,
        /// Time the marketplace asked us to wait
        retry_after: Duration,
    },

    /// Permanent rejection by the marketplace (validation failure)
    #[error("remote rejected: {0}")]
    RemoteRejected(String),

    /// The local entity lacks data required by this channel
    #[error("local data error: {0}")]
    LocalData(String),

    /// Every allowed attempt failed transiently
    #[error("gave up after {attempts} transient failures: {last}")]
    TransientExhausted {
        attempts: u32,
        /// Detail of the last transient failure
        last: String,
    },
}

impl ChannelError {
    /// Returns true if the operation may succeed when retried unchanged
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChannelError::RemoteTransient(_) | ChannelError::Throttled { .. }
        )
    }

    /// Wait requested by the marketplace before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ChannelError::Throttled { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Short machine-readable code for logs and the CLI
    pub fn code(&self) -> &'static str {
        match self {
            ChannelError::RemoteTransient(_) => "REMOTE_TRANSIENT",
            ChannelError::Throttled { .. } => "THROTTLED",
            ChannelError::RemoteRejected(_) => "REMOTE_REJECTED",
            ChannelError::LocalData(_) => "LOCAL_DATA",
            ChannelError::TransientExhausted { .. } => "TRANSIENT_EXHAUSTED",
        }
    }

    /// The detail message without the variant prefix
    pub fn detail(&self) -> &str {
        match self {
            ChannelError::RemoteTransient(msg)
            | ChannelError::RemoteRejected(msg)
            | ChannelError::LocalData(msg)
            | ChannelError::Throttled { detail: msg, .. }
            | ChannelError::TransientExhausted { last: msg, .. } => msg,
        }
    }

    /// Shorthand for a missing required attribute
    pub fn missing_field(field: &str, channel: impl std::fmt::Display) -> Self {
        ChannelError::LocalData(format!("missing required field '{field}' for {channel}"))
    }
}
