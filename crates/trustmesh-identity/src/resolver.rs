use std::sync::Arc;

use trustmesh_core::{Did, PublicKey};

use crate::contracts::{DocFinder, DocResolver, KeyResolver, KeyStore};
use crate::document::parse_nuts_comm_endpoint;
use crate::IdentityError;

/// How the local node DID is selected (§4.5).
#[derive(Clone, Debug)]
pub enum NodeDidMode {
    /// Use this DID verbatim; no scanning.
    Fixed(Did),
    /// Scan locally managed DIDs for one with a usable `NutsComm` service.
    Auto,
}

/// The node's resolved local identity: a validated DID with a usable
/// `NutsComm` endpoint and key-agreement signing capability.
#[derive(Clone, Debug)]
pub struct NodeIdentity {
    pub did: Did,
    pub key_agreement_kid: String,
    pub nuts_comm_endpoint: crate::document::NutsCommEndpoint,
}

impl NodeIdentity {
    /// Select and fully validate the local node identity. Fails loudly,
    /// naming the exact deficiency, rather than starting in a half-working
    /// state (§4.5).
    pub fn configure(
        mode: NodeDidMode,
        doc_resolver: &dyn DocResolver,
        doc_finder: &dyn DocFinder,
        key_store: &dyn KeyStore,
    ) -> Result<Self, IdentityError> {
        let did = match mode {
            NodeDidMode::Fixed(did) => did,
            NodeDidMode::Auto => Self::scan_for_candidate(doc_resolver, doc_finder, key_store)?,
        };
        Self::validate(did, doc_resolver, key_store)
    }

    fn scan_for_candidate(
        doc_resolver: &dyn DocResolver,
        doc_finder: &dyn DocFinder,
        key_store: &dyn KeyStore,
    ) -> Result<Did, IdentityError> {
        for did in doc_finder.list_managed_dids_with_nuts_comm() {
            if Self::validate(did.clone(), doc_resolver, key_store).is_ok() {
                return Ok(did);
            }
        }
        Err(IdentityError::NoLocalDidFound)
    }

    fn validate(
        did: Did,
        doc_resolver: &dyn DocResolver,
        key_store: &dyn KeyStore,
    ) -> Result<Self, IdentityError> {
        let document = doc_resolver
            .resolve(&did)
            .map_err(|_| IdentityError::DidNotFound(did.clone()))?;

        if document.deactivated {
            return Err(IdentityError::DidDeactivated(did));
        }

        let key_agreement = document
            .key_agreement
            .first()
            .ok_or_else(|| IdentityError::MissingKeyAgreement(did.clone()))?;

        if !key_store.exists(&key_agreement.id) {
            return Err(IdentityError::PrivateKeyMissing(did));
        }

        let service = document
            .nuts_comm_service()
            .ok_or_else(|| IdentityError::MissingNutsCommService(did.clone()))?;
        let nuts_comm_endpoint = parse_nuts_comm_endpoint(&service.service_endpoint)?;

        Ok(Self {
            did,
            key_agreement_kid: key_agreement.id.clone(),
            nuts_comm_endpoint,
        })
    }
}

/// Adapts `KeyResolver` to `trustmesh-core`'s [`trustmesh_core::SigningKeyResolver`]
/// seam, resolving `Kid` references via DID document lookup and `Jwk`
/// references inline, same as `InlineOnlyResolver`.
pub struct DidSigningKeyResolver {
    key_resolver: Arc<dyn KeyResolver>,
    at_time: trustmesh_core::Timestamp,
}

impl DidSigningKeyResolver {
    pub fn new(key_resolver: Arc<dyn KeyResolver>, at_time: trustmesh_core::Timestamp) -> Self {
        Self { key_resolver, at_time }
    }
}

impl trustmesh_core::SigningKeyResolver for DidSigningKeyResolver {
    fn resolve(&self, signing_key: &trustmesh_core::SigningKey) -> Option<PublicKey> {
        match signing_key {
            trustmesh_core::SigningKey::Jwk(pk) => Some(pk.clone()),
            trustmesh_core::SigningKey::Kid(kid) => {
                self.key_resolver.resolve_signing_key(kid, self.at_time)
            }
        }
    }
}

/// Adapts `KeyResolver` to [`trustmesh_core::RecipientKeyResolver`] for PAL
/// encryption: a recipient DID resolves to its `keyAgreement` public key.
pub struct DidRecipientKeyResolver {
    key_resolver: Arc<dyn KeyResolver>,
}

impl DidRecipientKeyResolver {
    pub fn new(key_resolver: Arc<dyn KeyResolver>) -> Self {
        Self { key_resolver }
    }
}

impl trustmesh_core::RecipientKeyResolver for DidRecipientKeyResolver {
    fn resolve_key_agreement(&self, did: &Did) -> Option<PublicKey> {
        self.key_resolver.resolve_key_agreement_key(did)
    }
}

/// Adapts `DocFinder` to `trustmesh-transport`'s [`trustmesh_transport::server::PeerCertificateResolver`]:
/// extract the leaf certificate's public key and reverse-resolve it to a
/// node DID.
pub struct CertDocFinderAdapter {
    doc_finder: Arc<dyn DocFinder>,
}

impl CertDocFinderAdapter {
    pub fn new(doc_finder: Arc<dyn DocFinder>) -> Self {
        Self { doc_finder }
    }
}

impl trustmesh_transport::server::PeerCertificateResolver for CertDocFinderAdapter {
    fn resolve_did(&self, leaf_cert_der: &[u8]) -> Option<Did> {
        let (_, cert) = x509_parser::parse_x509_certificate(leaf_cert_der).ok()?;
        let spki = cert.public_key().subject_public_key.data.to_vec();
        self.doc_finder
            .find_by_key_agreement_public_key(&PublicKey(spki))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{InMemoryDocResolver, InMemoryKeyStore, StaticDocFinder};
    use crate::document::{DidDocument, Service, VerificationMethod};

    fn sample_document(did: &Did, deactivated: bool) -> DidDocument {
        DidDocument {
            id: did.clone(),
            deactivated,
            key_agreement: vec![VerificationMethod {
                id: format!("{did}#key-agreement-1"),
                public_key: PublicKey(vec![1, 2, 3]),
            }],
            services: vec![Service {
                id: format!("{did}#nutscomm"),
                service_type: "NutsComm".into(),
                service_endpoint: "grpc://node.example:7890".into(),
            }],
        }
    }

    #[test]
    fn fixed_mode_validates_the_configured_did() {
        let did = Did::from("did:trustmesh:node1");
        let mut resolver = InMemoryDocResolver::default();
        resolver.insert(sample_document(&did, false));
        let mut key_store = InMemoryKeyStore::default();
        key_store.insert(format!("{did}#key-agreement-1"));
        let finder = StaticDocFinder::default();

        let identity =
            NodeIdentity::configure(NodeDidMode::Fixed(did.clone()), &resolver, &finder, &key_store)
                .unwrap();
        assert_eq!(identity.did, did);
        assert_eq!(identity.nuts_comm_endpoint.port, 7890);
    }

    #[test]
    fn deactivated_did_is_rejected() {
        let did = Did::from("did:trustmesh:node1");
        let mut resolver = InMemoryDocResolver::default();
        resolver.insert(sample_document(&did, true));
        let key_store = InMemoryKeyStore::default();
        let finder = StaticDocFinder::default();

        let result =
            NodeIdentity::configure(NodeDidMode::Fixed(did), &resolver, &finder, &key_store);
        assert!(matches!(result, Err(IdentityError::DidDeactivated(_))));
    }

    #[test]
    fn missing_private_key_is_rejected() {
        let did = Did::from("did:trustmesh:node1");
        let mut resolver = InMemoryDocResolver::default();
        resolver.insert(sample_document(&did, false));
        let key_store = InMemoryKeyStore::default();
        let finder = StaticDocFinder::default();

        let result =
            NodeIdentity::configure(NodeDidMode::Fixed(did), &resolver, &finder, &key_store);
        assert!(matches!(result, Err(IdentityError::PrivateKeyMissing(_))));
    }

    #[test]
    fn auto_mode_scans_candidates() {
        let did = Did::from("did:trustmesh:node1");
        let mut resolver = InMemoryDocResolver::default();
        resolver.insert(sample_document(&did, false));
        let mut key_store = InMemoryKeyStore::default();
        key_store.insert(format!("{did}#key-agreement-1"));
        let mut finder = StaticDocFinder::default();
        finder.add_candidate(did.clone());

        let identity =
            NodeIdentity::configure(NodeDidMode::Auto, &resolver, &finder, &key_store).unwrap();
        assert_eq!(identity.did, did);
    }
}
