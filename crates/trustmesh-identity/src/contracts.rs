//! External service contracts, narrowed to what this crate and
//! `trustmesh-transport` actually call through. Kept as traits so the
//! rest of the workspace depends on these seams rather than a concrete
//! credential/DID management stack.

use trustmesh_core::{Did, PublicKey, Signature, Timestamp};

use crate::document::DidDocument;
use crate::IdentityError;

/// Custody and use of private key material, referenced by key id (`kid`).
pub trait KeyStore: Send + Sync {
    fn sign(&self, kid: &str, bytes: &[u8]) -> Result<Signature, IdentityError>;
    fn decrypt(&self, kid: &str, bytes: &[u8]) -> Result<Vec<u8>, IdentityError>;
    fn exists(&self, kid: &str) -> bool;
    fn resolve(&self, kid: &str) -> Option<PublicKey>;
}

/// Resolves a DID to its current document.
pub trait DocResolver: Send + Sync {
    fn resolve(&self, did: &Did) -> Result<DidDocument, IdentityError>;
}

/// Resolves verification-method public keys out of DID documents.
pub trait KeyResolver: Send + Sync {
    fn resolve_signing_key(&self, kid: &str, at_time: Timestamp) -> Option<PublicKey>;
    fn resolve_key_agreement_key(&self, did: &Did) -> Option<PublicKey>;
    fn resolve_assertion_key_id(&self, did: &Did) -> Option<String>;
}

/// Finds DID documents by predicate. Narrowed here to the one search this
/// workspace performs: reverse-resolving a peer's TLS certificate key to the
/// DID whose `NutsComm` keyAgreement method matches it.
pub trait DocFinder: Send + Sync {
    fn find_by_key_agreement_public_key(&self, public_key: &PublicKey) -> Option<Did>;

    /// Every locally managed DID with a `NutsComm` service — the candidate
    /// set node-DID Auto mode scans (§4.5).
    fn list_managed_dids_with_nuts_comm(&self) -> Vec<Did>;
}
