//! trustmesh-core
//!
//! Shared types for the TrustMesh transaction model: content-addressed
//! references, the detached-signature envelope, and the error taxonomy
//! every other crate in the workspace maps its own errors into.

pub mod error;
pub mod keyresolver;
pub mod transaction;
pub mod types;

pub use error::{CoreError, ErrorCategory};
pub use keyresolver::{InlineOnlyResolver, RecipientKeyResolver, SigningKeyResolver};
pub use transaction::{
    next_lamport_clock, Envelope, Header, Pal, PalEntry, PalPlaintext, SigningKey, Transaction,
};
pub use types::{Did, Digest, LamportClock as LamportClockType, PayloadHash, PublicKey, Signature, Timestamp, TxRef};
