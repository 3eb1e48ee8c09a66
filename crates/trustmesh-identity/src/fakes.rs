//! In-memory fakes of the four external contracts, for this workspace's own
//! tests. Not behind `#[cfg(test)]` at the module level since other crates'
//! integration tests (`trustmesh-node`) also need them; each type is simple
//! enough that shipping it outside `cfg(test)` costs nothing.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use trustmesh_core::{Did, PublicKey, Signature};

use crate::contracts::{DocFinder, DocResolver, KeyResolver, KeyStore};
use crate::document::DidDocument;
use crate::IdentityError;

#[derive(Default)]
pub struct InMemoryDocResolver {
    documents: HashMap<Did, DidDocument>,
}

impl InMemoryDocResolver {
    pub fn insert(&mut self, document: DidDocument) {
        self.documents.insert(document.id.clone(), document);
    }
}

impl DocResolver for InMemoryDocResolver {
    fn resolve(&self, did: &Did) -> Result<DidDocument, IdentityError> {
        self.documents
            .get(did)
            .cloned()
            .ok_or_else(|| IdentityError::DidNotFound(did.clone()))
    }
}

#[derive(Default)]
pub struct InMemoryKeyStore {
    kids: Mutex<HashSet<String>>,
}

impl InMemoryKeyStore {
    pub fn insert(&mut self, kid: String) {
        self.kids.get_mut().expect("lock poisoned").insert(kid);
    }
}

impl KeyStore for InMemoryKeyStore {
    fn sign(&self, kid: &str, _bytes: &[u8]) -> Result<Signature, IdentityError> {
        if self.exists(kid) {
            Ok(Signature(vec![0u8; 64]))
        } else {
            Err(IdentityError::ResolutionFailed(format!("unknown kid {kid}")))
        }
    }

    fn decrypt(&self, kid: &str, bytes: &[u8]) -> Result<Vec<u8>, IdentityError> {
        if self.exists(kid) {
            Ok(bytes.to_vec())
        } else {
            Err(IdentityError::ResolutionFailed(format!("unknown kid {kid}")))
        }
    }

    fn exists(&self, kid: &str) -> bool {
        self.kids.lock().expect("lock poisoned").contains(kid)
    }

    fn resolve(&self, _kid: &str) -> Option<PublicKey> {
        None
    }
}

#[derive(Default)]
pub struct StaticDocFinder {
    by_key_agreement: HashMap<Vec<u8>, Did>,
    candidates: Vec<Did>,
}

impl StaticDocFinder {
    pub fn add_candidate(&mut self, did: Did) {
        self.candidates.push(did);
    }

    pub fn map_key_agreement(&mut self, public_key: PublicKey, did: Did) {
        self.by_key_agreement.insert(public_key.0, did);
    }
}

impl DocFinder for StaticDocFinder {
    fn find_by_key_agreement_public_key(&self, public_key: &PublicKey) -> Option<Did> {
        self.by_key_agreement.get(&public_key.0).cloned()
    }

    fn list_managed_dids_with_nuts_comm(&self) -> Vec<Did> {
        self.candidates.clone()
    }
}

#[derive(Default)]
pub struct StaticKeyResolver {
    signing_keys: HashMap<String, PublicKey>,
    key_agreement_keys: HashMap<Did, PublicKey>,
}

impl StaticKeyResolver {
    pub fn map_signing_key(&mut self, kid: String, public_key: PublicKey) {
        self.signing_keys.insert(kid, public_key);
    }

    pub fn map_key_agreement(&mut self, did: Did, public_key: PublicKey) {
        self.key_agreement_keys.insert(did, public_key);
    }
}

impl KeyResolver for StaticKeyResolver {
    fn resolve_signing_key(&self, kid: &str, _at_time: trustmesh_core::Timestamp) -> Option<PublicKey> {
        self.signing_keys.get(kid).cloned()
    }

    fn resolve_key_agreement_key(&self, did: &Did) -> Option<PublicKey> {
        self.key_agreement_keys.get(did).cloned()
    }

    fn resolve_assertion_key_id(&self, did: &Did) -> Option<String> {
        self.key_agreement_keys.get(did).map(|_| format!("{did}#assertion-1"))
    }
}
