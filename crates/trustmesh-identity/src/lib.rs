//! trustmesh-identity
//!
//! Node-DID resolution and the external DID/credential service contracts
//! (`KeyStore`, `DocResolver`, `KeyResolver`, `DocFinder`) the rest of the
//! workspace depends on as traits rather than a concrete implementation.

pub mod contracts;
pub mod document;
pub mod error;
pub mod fakes;
pub mod resolver;

pub use contracts::{DocFinder, DocResolver, KeyResolver, KeyStore};
pub use document::{parse_nuts_comm_endpoint, DidDocument, NutsCommEndpoint, Service, VerificationMethod};
pub use error::IdentityError;
pub use resolver::{CertDocFinderAdapter, DidRecipientKeyResolver, DidSigningKeyResolver, NodeDidMode, NodeIdentity};
