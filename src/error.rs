//! Error types for the threshold protocol.

use thiserror::Error;

use crate::party::PartyId;

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running the DKG or signing protocols.
#[derive(Debug, Error)]
pub enum Error {
    /// Wire bytes failed a structural or canonicalization check.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// A constructor precondition was violated; the round was never built.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A message was dropped: unknown/unexpected sender, duplicate, or
    /// misrouted. The round continues.
    #[error("message from party {from} rejected: {reason}")]
    FailMsg { from: PartyId, reason: String },

    /// A cryptographic check failed for a specific party. The round aborts
    /// and the culprit is named; no key or signature is produced.
    #[error("protocol aborted, culprit party {culprit}: {reason}")]
    FailProtocol { culprit: PartyId, reason: String },

    /// An internal invariant was violated (RNG failure, field arithmetic
    /// impossibility). The round aborts.
    #[error("internal failure: {0}")]
    FailFatal(String),
}
