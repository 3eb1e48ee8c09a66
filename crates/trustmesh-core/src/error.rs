use thiserror::Error;

/// Coarse error category per the propagation policy: determines whether a
/// caller retries, drops silently, replies empty, or escalates to shutdown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed or semantically invalid input. Reject, never retry.
    Validation,
    /// The referenced object is absent locally. Benign, may trigger a fetch.
    NotFound,
    /// The peer lacked the access it needed. Reply empty, log a warning,
    /// do not disconnect.
    Unauthorized,
    /// The peer sent something that should be structurally impossible.
    /// Drop and log at error level; repeated occurrences may warrant
    /// disconnecting the peer.
    Attack,
    /// Transient failure (I/O, timeout). Retry with backoff.
    Transient,
    /// Unrecoverable. Surfaced to the operator; the node refuses to start
    /// or continue.
    Fatal,
}

/// Errors shared across the transaction/envelope model in [`crate::transaction`].
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("envelope is missing required header field: {0}")]
    MissingHeader(&'static str),

    #[error("transaction has no previous references but is not a root")]
    MissingPrev,

    #[error("root transaction must not declare previous references")]
    RootWithPrev,

    #[error("lamport clock mismatch: expected {expected}, got {got}")]
    ClockMismatch { expected: u64, got: u64 },

    #[error("ref does not match recomputed digest of the envelope")]
    RefMismatch,

    #[error("payload hash does not match the hash of the supplied payload")]
    PayloadHashMismatch,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("{0}")]
    Other(String),
}

impl CoreError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CoreError::InvalidSignature
            | CoreError::MissingHeader(_)
            | CoreError::MissingPrev
            | CoreError::RootWithPrev
            | CoreError::ClockMismatch { .. }
            | CoreError::RefMismatch
            | CoreError::PayloadHashMismatch => ErrorCategory::Validation,
            CoreError::Serialization(_) | CoreError::Encoding(_) => ErrorCategory::Validation,
            CoreError::Other(_) => ErrorCategory::Validation,
        }
    }
}
