//! trustmesh-publisher
//!
//! Builds, signs, and applies new transactions: resolves parents from the
//! local head set plus any caller-supplied additional previous references,
//! computes the Lamport clock, optionally encrypts a Participant Access
//! List, and hands the signed envelope to the state store.

mod head_tracker;

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use trustmesh_core::transaction::{Envelope, Header, PalEntry, PalPlaintext, SigningKey};
use trustmesh_core::{Did, PublicKey, SigningKeyResolver, Transaction, TxRef};
use trustmesh_crypto::TrustMeshSigner;
use trustmesh_state::StateStore;

pub use head_tracker::HeadTracker;

#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("unknown or missing additional previous reference: {0}")]
    UnknownPrev(TxRef),
    #[error("failed to resolve key-agreement key for recipient {0}")]
    RecipientKeyResolutionFailed(Did),
    #[error("PAL encryption failed: {0}")]
    PalEncryption(#[from] trustmesh_crypto::PalError),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error(transparent)]
    Rejected(#[from] trustmesh_state::StateError),
}

/// Resolves recipient DIDs to the public key their PAL entry should be
/// encrypted to. A thin wrapper so the publisher can accept either a
/// `trustmesh-identity`-backed resolver or a test double.
pub trait RecipientKeys: trustmesh_core::RecipientKeyResolver {}
impl<T: trustmesh_core::RecipientKeyResolver> RecipientKeys for T {}

/// Template for a new transaction, supplied by the caller.
pub struct Template {
    pub payload_type: String,
    pub payload: Vec<u8>,
    /// Previous references beyond the local head set (used to explicitly
    /// merge a branch the publisher wouldn't otherwise reference).
    pub additional_prevs: Vec<TxRef>,
    /// DIDs authorized to read the payload. Empty means public.
    pub recipients: Vec<Did>,
}

pub struct Publisher<'a> {
    store: Arc<StateStore>,
    heads: Arc<HeadTracker>,
    signer: TrustMeshSigner,
    signing_key: SigningKey,
    recipient_keys: &'a dyn trustmesh_core::RecipientKeyResolver,
    signing_key_resolver: &'a dyn SigningKeyResolver,
}

impl<'a> Publisher<'a> {
    pub fn new(
        store: Arc<StateStore>,
        signer: TrustMeshSigner,
        signing_key: SigningKey,
        recipient_keys: &'a dyn trustmesh_core::RecipientKeyResolver,
        signing_key_resolver: &'a dyn SigningKeyResolver,
    ) -> Self {
        let heads = HeadTracker::attach(&store);
        Self {
            store,
            heads,
            signer,
            signing_key,
            recipient_keys,
            signing_key_resolver,
        }
    }

    pub fn heads(&self) -> Vec<TxRef> {
        self.heads.current()
    }

    pub fn create_transaction(
        &self,
        template: Template,
        sig_t: i64,
    ) -> Result<Transaction, PublisherError> {
        let mut parent_set: HashSet<TxRef> = self.heads.current().into_iter().collect();
        for extra in &template.additional_prevs {
            parent_set.insert(*extra);
        }
        let mut parents: Vec<TxRef> = parent_set.into_iter().collect();
        parents.sort_by_key(|r| *r.as_bytes());

        let mut parent_clocks = Vec::with_capacity(parents.len());
        for parent in &parents {
            let tx = self
                .store
                .get_tx(parent)?
                .ok_or(PublisherError::UnknownPrev(*parent))?;
            parent_clocks.push(tx.lamport_clock());
        }
        let lc = trustmesh_core::next_lamport_clock(&parent_clocks);

        let pal = if template.recipients.is_empty() {
            None
        } else {
            let plaintext = PalPlaintext {
                recipients: template.recipients.clone(),
            };
            let mut entries: Vec<PalEntry> = Vec::with_capacity(template.recipients.len());
            for recipient in &template.recipients {
                let key: PublicKey = self
                    .recipient_keys
                    .resolve_key_agreement(recipient)
                    .ok_or_else(|| {
                        PublisherError::RecipientKeyResolutionFailed(recipient.clone())
                    })?;
                entries.push(trustmesh_crypto::encrypt_for_recipient(
                    recipient, &key, &plaintext,
                )?);
            }
            Some(entries)
        };

        let header = Header {
            payload_type: template.payload_type.clone(),
            payload_hash: trustmesh_crypto::payload_hash(&template.payload),
            prev: parents,
            lc,
            sig_t,
            signing_key: self.signing_key.clone(),
            pal,
        };

        let signing_bytes = header
            .signing_bytes()
            .map_err(|e| PublisherError::Signing(e.to_string()))?;
        let signature = self
            .signer
            .sign(&signing_bytes)
            .map_err(|e| PublisherError::Signing(e.to_string()))?;

        let envelope = Envelope { header, signature };
        let tx = Transaction::from_envelope(envelope)
            .map_err(|e| PublisherError::Signing(e.to_string()))?;

        self.store
            .add(tx.clone(), self.signing_key_resolver, Some(template.payload), None)?;

        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustmesh_core::InlineOnlyResolver;
    use trustmesh_crypto::SigningKeyPair;

    struct NoRecipients;
    impl trustmesh_core::RecipientKeyResolver for NoRecipients {
        fn resolve_key_agreement(&self, _did: &Did) -> Option<PublicKey> {
            None
        }
    }

    #[test]
    fn publishes_root_then_child_advancing_heads() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::open(dir.path()).unwrap());
        let kp = SigningKeyPair::generate();
        let resolver = InlineOnlyResolver;
        let no_recipients = NoRecipients;

        let publisher = Publisher::new(
            store.clone(),
            kp.signer(),
            SigningKey::Jwk(kp.public_key.clone()),
            &no_recipients,
            &resolver,
        );

        let root = publisher
            .create_transaction(
                Template {
                    payload_type: "application/did+json".to_string(),
                    payload: b"root doc".to_vec(),
                    additional_prevs: vec![],
                    recipients: vec![],
                },
                1_700_000_000,
            )
            .unwrap();
        assert!(root.is_root());
        assert_eq!(publisher.heads(), vec![root.tx_ref]);

        let child = publisher
            .create_transaction(
                Template {
                    payload_type: "application/did+json".to_string(),
                    payload: b"update doc".to_vec(),
                    additional_prevs: vec![],
                    recipients: vec![],
                },
                1_700_000_001,
            )
            .unwrap();
        assert_eq!(child.prev(), &[root.tx_ref]);
        assert_eq!(publisher.heads(), vec![child.tx_ref]);
    }

    #[test]
    fn unknown_additional_prev_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::open(dir.path()).unwrap());
        let kp = SigningKeyPair::generate();
        let resolver = InlineOnlyResolver;
        let no_recipients = NoRecipients;

        let publisher = Publisher::new(
            store.clone(),
            kp.signer(),
            SigningKey::Jwk(kp.public_key.clone()),
            &no_recipients,
            &resolver,
        );

        let missing = TxRef::from_bytes([3u8; 32]);
        let result = publisher.create_transaction(
            Template {
                payload_type: "application/did+json".to_string(),
                payload: b"doc".to_vec(),
                additional_prevs: vec![missing],
                recipients: vec![],
            },
            1_700_000_000,
        );
        assert!(matches!(result, Err(PublisherError::UnknownPrev(_))));
    }
}
