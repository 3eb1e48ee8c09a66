//! Protocol message handlers, grounded directly in
//! `network/transport/v2/handlers.go`'s `handleTransactionPayloadQuery`,
//! `handleTransactionPayload`, and `handleGossip`.

use thiserror::Error;
use trustmesh_core::{Did, ErrorCategory, SigningKeyResolver, Transaction, TxRef};
use trustmesh_state::StateStore;

#[derive(Debug, Error)]
pub enum GossipError {
    #[error("message is missing a transaction reference")]
    MissingTransactionRef,

    #[error("peer sent payload for non-existing transaction {0}")]
    PayloadForUnknownTransaction(TxRef),

    #[error("peer sent payload that doesn't match the transaction's payload hash")]
    PayloadHashMismatch,

    #[error(transparent)]
    Storage(#[from] trustmesh_state::StateError),
}

impl GossipError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            GossipError::MissingTransactionRef => ErrorCategory::Validation,
            GossipError::PayloadForUnknownTransaction(_) => ErrorCategory::Attack,
            GossipError::PayloadHashMismatch => ErrorCategory::Attack,
            GossipError::Storage(e) => e.category(),
        }
    }
}

/// Answer a `TransactionPayloadQuery`. Never returns an error: every
/// rejection path replies with empty data, distinguished only by which
/// `tracing` event was emitted, matching the original's design of making
/// "not found" and "not authorized" indistinguishable on the wire.
pub fn handle_transaction_payload_query(
    store: &StateStore,
    requester_node_did: Option<&Did>,
    agreement_secret: Option<&x25519_dalek::StaticSecret>,
    tx_ref: TxRef,
) -> Vec<u8> {
    let tx = match store.get_tx(&tx_ref) {
        Ok(Some(tx)) => tx,
        Ok(None) => {
            tracing::debug!(tx_ref = %tx_ref, "payload query for unknown transaction");
            return Vec::new();
        }
        Err(e) => {
            tracing::warn!(tx_ref = %tx_ref, error = %e, "store error answering payload query");
            return Vec::new();
        }
    };

    if tx.is_private() {
        let requester = match requester_node_did {
            None => {
                tracing::warn!(tx_ref = %tx_ref, "unauthenticated peer queried private transaction payload");
                return Vec::new();
            }
            Some(did) => did,
        };

        let secret = match agreement_secret {
            None => {
                tracing::warn!(tx_ref = %tx_ref, "no local key-agreement key to decrypt PAL");
                return Vec::new();
            }
            Some(s) => s,
        };

        let pal = tx.pal().expect("is_private implies pal is Some and non-empty");
        let plaintext = match trustmesh_crypto::decrypt_pal(pal, secret) {
            Ok(Some(p)) => p,
            Ok(None) => {
                tracing::warn!(tx_ref = %tx_ref, "unable to decrypt PAL, not an intended recipient");
                return Vec::new();
            }
            Err(e) => {
                tracing::error!(tx_ref = %tx_ref, error = %e, "error decrypting PAL");
                return Vec::new();
            }
        };

        if !plaintext.contains(requester) {
            tracing::warn!(tx_ref = %tx_ref, peer_did = %requester, "peer not present in transaction's PAL");
            return Vec::new();
        }
    }

    match store.read_payload(&tx.payload_hash()) {
        Ok(Some(data)) => data,
        Ok(None) => {
            tracing::debug!(tx_ref = %tx_ref, "payload not yet present locally");
            Vec::new()
        }
        Err(e) => {
            tracing::warn!(tx_ref = %tx_ref, error = %e, "store error reading payload");
            Vec::new()
        }
    }
}

/// Process an incoming `TransactionPayload` reply.
pub fn handle_transaction_payload(
    store: &StateStore,
    tx_ref: TxRef,
    data: Vec<u8>,
) -> Result<(), GossipError> {
    if tx_ref.is_empty() {
        return Err(GossipError::MissingTransactionRef);
    }
    if data.is_empty() {
        // The peer doesn't have it (or we weren't authorized) — benign,
        // the payload scheduler will retry against another peer.
        tracing::debug!(tx_ref = %tx_ref, "peer does not have transaction payload");
        return Ok(());
    }

    let tx = store
        .get_tx(&tx_ref)?
        .ok_or(GossipError::PayloadForUnknownTransaction(tx_ref))?;

    let computed = trustmesh_crypto::payload_hash(&data);
    if computed != tx.payload_hash() {
        return Err(GossipError::PayloadHashMismatch);
    }

    store.write_payload(tx.payload_hash(), tx.payload_type().to_string(), data)?;
    Ok(())
}

/// Process an incoming `Gossip` advertisement: returns the subset of
/// advertised refs we don't yet have, for the caller to follow up with a
/// `TransactionListQuery`.
pub fn handle_gossip(store: &StateStore, refs: &[TxRef]) -> Vec<TxRef> {
    let unknown: Vec<TxRef> = refs.iter().copied().filter(|r| !store.is_present(r)).collect();
    if !unknown.is_empty() {
        tracing::debug!(count = unknown.len(), "gossip revealed unknown transactions");
    }
    unknown
}

/// Answer a `TransactionListQuery`: every requested ref we have, silently
/// omitting the rest.
pub fn handle_transaction_list_query(
    store: &StateStore,
    refs: &[TxRef],
) -> Result<Vec<Transaction>, GossipError> {
    let mut out = Vec::with_capacity(refs.len());
    for r in refs {
        if let Some(tx) = store.get_tx(r)? {
            out.push(tx);
        }
    }
    Ok(out)
}

/// Process an incoming `TransactionList`: validate and add each
/// transaction, continuing past individual failures so one bad entry
/// doesn't block the rest of the batch.
pub fn handle_transaction_list(
    store: &StateStore,
    transactions: Vec<Transaction>,
    key_resolver: &dyn SigningKeyResolver,
) -> Vec<(TxRef, trustmesh_state::StateError)> {
    let mut rejected = Vec::new();
    for tx in transactions {
        let tx_ref = tx.tx_ref;
        if let Err(e) = store.add(tx, key_resolver, None, None) {
            tracing::warn!(tx_ref = %tx_ref, error = %e, "rejected transaction from peer");
            rejected.push((tx_ref, e));
        }
    }
    rejected
}

/// XOR-fold of every known ref: a cheap divergence fingerprint exchanged in
/// `Gossip` messages (§4.3, §9).
pub fn compute_omnihash(store: &StateStore) -> [u8; 32] {
    let mut omnihash = [0u8; 32];
    let _ = store.walk(|tx| {
        for (a, b) in omnihash.iter_mut().zip(tx.tx_ref.as_bytes().iter()) {
            *a ^= b;
        }
        true
    });
    omnihash
}

/// Every ref this store currently knows about, for the "fuller exchange"
/// a peer's session task schedules when a `Gossip` round's sampled refs
/// didn't reveal anything new but the omnihashes still disagree — a larger
/// ref set gives the peer a real chance to spot what the sample missed.
pub fn collect_all_refs(store: &StateStore) -> Vec<TxRef> {
    let mut refs = Vec::new();
    let _ = store.walk(|tx| {
        refs.push(tx.tx_ref);
        true
    });
    refs
}

/// The highest Lamport clock among the store's current heads, used as the
/// `lc` field of an outgoing `Gossip` message. Heads are the DAG's frontier,
/// so this is a cheap stand-in for scanning every known transaction.
pub fn highest_known_lamport_clock(store: &StateStore) -> u64 {
    store
        .heads()
        .unwrap_or_default()
        .iter()
        .filter_map(|r| store.get_tx(r).ok().flatten())
        .map(|tx| tx.lamport_clock())
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustmesh_core::transaction::{Envelope, Header, SigningKey};
    use trustmesh_core::InlineOnlyResolver;
    use trustmesh_crypto::SigningKeyPair;

    fn signed_tx(kp: &SigningKeyPair, payload: &[u8]) -> Transaction {
        let header = Header {
            payload_type: "application/did+json".to_string(),
            payload_hash: trustmesh_crypto::payload_hash(payload),
            prev: vec![],
            lc: 0,
            sig_t: 1_700_000_000,
            signing_key: SigningKey::Jwk(kp.public_key.clone()),
            pal: None,
        };
        let signing_bytes = header.signing_bytes().unwrap();
        let signature = kp.signer().sign(&signing_bytes).unwrap();
        Transaction::from_envelope(Envelope { header, signature }).unwrap()
    }

    fn temp_store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn payload_query_for_unknown_tx_returns_empty() {
        let (_dir, store) = temp_store();
        let result = handle_transaction_payload_query(&store, None, None, TxRef::from_bytes([1u8; 32]));
        assert!(result.is_empty());
    }

    #[test]
    fn payload_query_for_public_tx_returns_payload() {
        let (_dir, store) = temp_store();
        let kp = SigningKeyPair::generate();
        let resolver = InlineOnlyResolver;
        let payload = b"a did document".to_vec();
        let tx = signed_tx(&kp, &payload);
        store.add(tx.clone(), &resolver, Some(payload.clone()), None).unwrap();

        let result = handle_transaction_payload_query(&store, None, None, tx.tx_ref);
        assert_eq!(result, payload);
    }

    #[test]
    fn payload_for_unknown_transaction_is_rejected() {
        let (_dir, store) = temp_store();
        let result = handle_transaction_payload(&store, TxRef::from_bytes([9u8; 32]), b"data".to_vec());
        assert!(matches!(result, Err(GossipError::PayloadForUnknownTransaction(_))));
    }

    #[test]
    fn payload_hash_mismatch_is_rejected() {
        let (_dir, store) = temp_store();
        let kp = SigningKeyPair::generate();
        let resolver = InlineOnlyResolver;
        let tx = signed_tx(&kp, b"expected payload");
        store.add(tx.clone(), &resolver, None, None).unwrap();

        let result = handle_transaction_payload(&store, tx.tx_ref, b"wrong bytes".to_vec());
        assert!(matches!(result, Err(GossipError::PayloadHashMismatch)));
    }

    #[test]
    fn empty_payload_reply_is_not_an_error() {
        let (_dir, store) = temp_store();
        let kp = SigningKeyPair::generate();
        let resolver = InlineOnlyResolver;
        let tx = signed_tx(&kp, b"payload");
        store.add(tx.clone(), &resolver, None, None).unwrap();

        let result = handle_transaction_payload(&store, tx.tx_ref, Vec::new());
        assert!(result.is_ok());
    }

    #[test]
    fn gossip_reveals_only_unknown_refs() {
        let (_dir, store) = temp_store();
        let kp = SigningKeyPair::generate();
        let resolver = InlineOnlyResolver;
        let known = signed_tx(&kp, b"already have this one");
        store.add(known.clone(), &resolver, None, None).unwrap();

        let unknown = TxRef::from_bytes([2u8; 32]);
        let result = handle_gossip(&store, &[known.tx_ref, unknown]);
        assert_eq!(result, vec![unknown]);
    }

    #[test]
    fn collect_all_refs_and_highest_clock_reflect_store_contents() {
        let (_dir, store) = temp_store();
        let kp = SigningKeyPair::generate();
        let resolver = InlineOnlyResolver;
        let root = signed_tx(&kp, b"root");
        store.add(root.clone(), &resolver, None, None).unwrap();

        assert_eq!(collect_all_refs(&store), vec![root.tx_ref]);
        assert_eq!(highest_known_lamport_clock(&store), root.lamport_clock());
    }
}
