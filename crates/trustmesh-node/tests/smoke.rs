//! End-to-end smoke test for `trustmesh-node`: configures a node in-process
//! against a fake identity backend, publishes a chain of transactions
//! through its composition root, and checks the DAG invariants from §8.

use trustmesh_core::{Did, InlineOnlyResolver, PublicKey, RecipientKeyResolver};
use trustmesh_crypto::{AgreementKeyPair, SigningKeyPair};
use trustmesh_identity::fakes::{InMemoryDocResolver, InMemoryKeyStore, StaticDocFinder};
use trustmesh_identity::{DidDocument, Service, VerificationMethod};
use trustmesh_node::config::NodeConfig;
use trustmesh_node::node::Node;
use trustmesh_publisher::Template;

struct NoRecipients;
impl RecipientKeyResolver for NoRecipients {
    fn resolve_key_agreement(&self, _did: &Did) -> Option<PublicKey> {
        None
    }
}

fn local_identity(did: &Did) -> (InMemoryDocResolver, InMemoryKeyStore, StaticDocFinder) {
    let mut doc_resolver = InMemoryDocResolver::default();
    doc_resolver.insert(DidDocument {
        id: did.clone(),
        deactivated: false,
        key_agreement: vec![VerificationMethod {
            id: format!("{did}#key-agreement-1"),
            public_key: PublicKey(vec![9, 9, 9]),
        }],
        services: vec![Service {
            id: format!("{did}#nutscomm"),
            service_type: "NutsComm".into(),
            service_endpoint: "grpc://node.example:7890".into(),
        }],
    });

    let mut key_store = InMemoryKeyStore::default();
    key_store.insert(format!("{did}#key-agreement-1"));

    let finder = StaticDocFinder::default();

    (doc_resolver, key_store, finder)
}

#[tokio::test]
async fn configure_publishes_root_then_child_and_tracks_heads() {
    let dir = tempfile::tempdir().unwrap();
    let did = Did::from("did:trustmesh:smoke-node");
    let (doc_resolver, key_store, finder) = local_identity(&did);

    let config = NodeConfig {
        node_did: Some(did.0.clone()),
        data_dir: dir.path().to_path_buf(),
        ..NodeConfig::default()
    };

    let node = Node::configure(
        config,
        &doc_resolver,
        &finder,
        &key_store,
        SigningKeyPair::generate(),
        AgreementKeyPair::generate(),
    )
    .expect("node should configure against a valid identity");

    assert_eq!(node.identity().did, did);

    let resolver = InlineOnlyResolver;
    let no_recipients = NoRecipients;
    let publisher = node.publisher(&no_recipients, &resolver);

    let root = publisher
        .create_transaction(
            Template {
                payload_type: "application/did+json".to_string(),
                payload: b"root document".to_vec(),
                additional_prevs: vec![],
                recipients: vec![],
            },
            1_700_000_000,
        )
        .expect("root transaction should publish");
    assert!(root.is_root());
    assert_eq!(publisher.heads(), vec![root.tx_ref]);

    let child = publisher
        .create_transaction(
            Template {
                payload_type: "application/did+json".to_string(),
                payload: b"updated document".to_vec(),
                additional_prevs: vec![],
                recipients: vec![],
            },
            1_700_000_001,
        )
        .expect("child transaction should publish");
    assert_eq!(child.prev(), &[root.tx_ref]);
    assert_eq!(child.lamport_clock(), 1);
    assert_eq!(publisher.heads(), vec![child.tx_ref]);

    let stats = node.store().statistics();
    assert_eq!(stats.transaction_count, 2);
    assert_eq!(stats.head_count, 1);

    node.shutdown().expect("shutdown should succeed");
    node.shutdown().expect("shutdown should be idempotent");
}

#[tokio::test]
async fn configure_rejects_deactivated_node_did() {
    let dir = tempfile::tempdir().unwrap();
    let did = Did::from("did:trustmesh:deactivated-node");
    let (mut doc_resolver, key_store, finder) = local_identity(&did);
    doc_resolver.insert(DidDocument {
        id: did.clone(),
        deactivated: true,
        key_agreement: vec![],
        services: vec![],
    });

    let config = NodeConfig {
        node_did: Some(did.0.clone()),
        data_dir: dir.path().to_path_buf(),
        ..NodeConfig::default()
    };

    let result = Node::configure(
        config,
        &doc_resolver,
        &finder,
        &key_store,
        SigningKeyPair::generate(),
        AgreementKeyPair::generate(),
    );
    assert!(result.is_err(), "a deactivated node DID must refuse to start");
}
