use crate::transaction::SigningKey;
use crate::types::{Did, PublicKey};

/// Resolves a transaction's [`SigningKey`] header to the public key bytes
/// needed to verify its signature. `Kid` resolution requires looking up a
/// DID document (an external collaborator, §1/§6); `Jwk` resolution is
/// local. Implementations live where the DID-resolution machinery lives
/// (`trustmesh-identity`), kept here only as the narrow trait so
/// `trustmesh-state` doesn't need to depend on it.
pub trait SigningKeyResolver: Send + Sync {
    fn resolve(&self, signing_key: &SigningKey) -> Option<PublicKey>;
}

/// Resolves `Jwk`-carried keys only; any `Kid` reference is treated as
/// unresolvable. Useful for tests and for any deployment that only ever
/// sees self-describing transactions.
pub struct InlineOnlyResolver;

impl SigningKeyResolver for InlineOnlyResolver {
    fn resolve(&self, signing_key: &SigningKey) -> Option<PublicKey> {
        match signing_key {
            SigningKey::Jwk(pk) => Some(pk.clone()),
            SigningKey::Kid(_) => None,
        }
    }
}

/// Resolves a recipient DID to the X25519 public key its PAL entries should
/// be encrypted to (the DID's `keyAgreement` verification method).
/// Implemented against DID document resolution in `trustmesh-identity`.
pub trait RecipientKeyResolver: Send + Sync {
    fn resolve_key_agreement(&self, did: &Did) -> Option<PublicKey>;
}
