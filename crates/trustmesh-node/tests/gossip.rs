//! End-to-end gossip scenario: two independent `StateStore`s, each
//! standing in for a node, synchronized purely through
//! `trustmesh-gossip`'s protocol handlers — no sockets involved, mirroring
//! how `handlers.go` is exercised in isolation from the transport layer.

use std::sync::Arc;

use trustmesh_core::{Did, InlineOnlyResolver, PublicKey, RecipientKeyResolver};
use trustmesh_crypto::SigningKeyPair;
use trustmesh_gossip::{
    compute_omnihash, handle_gossip, handle_transaction_list, handle_transaction_list_query,
    handle_transaction_payload, handle_transaction_payload_query,
};
use trustmesh_publisher::{Publisher, Template};
use trustmesh_state::StateStore;

struct NoRecipients;
impl RecipientKeyResolver for NoRecipients {
    fn resolve_key_agreement(&self, _did: &Did) -> Option<PublicKey> {
        None
    }
}

#[tokio::test]
async fn unknown_transaction_and_payload_propagate_via_gossip() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let store_a = Arc::new(StateStore::open(dir_a.path()).unwrap());
    let store_b = Arc::new(StateStore::open(dir_b.path()).unwrap());

    let kp = SigningKeyPair::generate();
    let resolver = InlineOnlyResolver;
    let no_recipients = NoRecipients;
    let publisher = Publisher::new(
        store_a.clone(),
        kp.signer(),
        trustmesh_core::SigningKey::Jwk(kp.public_key.clone()),
        &no_recipients,
        &resolver,
    );

    let tx = publisher
        .create_transaction(
            Template {
                payload_type: "application/did+json".to_string(),
                payload: b"published only on node A".to_vec(),
                additional_prevs: vec![],
                recipients: vec![],
            },
            1_700_000_000,
        )
        .unwrap();

    // Node B starts with nothing; its omnihash differs from A's.
    assert_ne!(compute_omnihash(&store_a), compute_omnihash(&store_b));

    // B advertises an empty ref set; A's handler tells it what's missing.
    let missing = handle_gossip(&store_a, &[]);
    assert_eq!(missing, vec![tx.tx_ref]);

    // B asks for the full transactions by ref and applies them.
    let fetched = handle_transaction_list_query(&store_a, &missing).unwrap();
    assert_eq!(fetched.len(), 1);
    let failures = handle_transaction_list(&store_b, fetched, &resolver);
    assert!(failures.is_empty());
    assert!(store_b.is_present(&tx.tx_ref));

    // The transaction is known on B now, but its payload isn't yet.
    assert!(!store_b.is_payload_present(&tx.payload_hash()));

    // B fetches the payload from A and applies it.
    let payload = handle_transaction_payload_query(&store_a, None, None, tx.tx_ref);
    assert_eq!(payload, b"published only on node A".to_vec());
    handle_transaction_payload(&store_b, tx.tx_ref, payload).unwrap();
    assert!(store_b.is_payload_present(&tx.payload_hash()));

    // Now that both stores hold the same transaction, a fresh gossip round
    // reveals nothing new in either direction.
    let b_refs = vec![tx.tx_ref];
    assert!(handle_gossip(&store_a, &b_refs).is_empty());
    assert_eq!(compute_omnihash(&store_a), compute_omnihash(&store_b));
}

#[tokio::test]
async fn payload_hash_mismatch_is_rejected_and_not_stored() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let store_a = Arc::new(StateStore::open(dir_a.path()).unwrap());
    let store_b = Arc::new(StateStore::open(dir_b.path()).unwrap());

    let kp = SigningKeyPair::generate();
    let resolver = InlineOnlyResolver;
    let no_recipients = NoRecipients;
    let publisher = Publisher::new(
        store_a.clone(),
        kp.signer(),
        trustmesh_core::SigningKey::Jwk(kp.public_key.clone()),
        &no_recipients,
        &resolver,
    );

    let tx = publisher
        .create_transaction(
            Template {
                payload_type: "application/did+json".to_string(),
                payload: b"the real payload".to_vec(),
                additional_prevs: vec![],
                recipients: vec![],
            },
            1_700_000_000,
        )
        .unwrap();

    // B learns of the transaction (metadata only) but never its payload.
    let fetched = handle_transaction_list_query(&store_a, &[tx.tx_ref]).unwrap();
    assert!(handle_transaction_list(&store_b, fetched, &resolver).is_empty());

    let forged = b"not what was signed for".to_vec();
    let result = handle_transaction_payload(&store_b, tx.tx_ref, forged);
    assert!(result.is_err());
    assert!(!store_b.is_payload_present(&tx.payload_hash()));
}
