//! trustmesh-transport
//!
//! Authenticated TLS transport: mutual-TLS sessions, the outbound connector
//! with backoff, the inbound server, and the peer table state machine
//! (`DIALING -> AUTHENTICATING -> READY -> CLOSED`). Direct authenticated
//! peer sessions rather than DHT-routed pubsub — see DESIGN.md.

pub mod backoff;
pub mod config;
pub mod connector;
pub mod crl;
pub mod peer;
pub mod server;
pub mod session;
pub mod session_task;
pub mod tls;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use trustmesh_core::{Did, TxRef};
use trustmesh_gossip::{NetworkMessage, PayloadQuerySender, PeerSource};

pub use backoff::Backoff;
pub use config::TransportConfig;
pub use crl::{CrlValidator, RevocationList};
pub use peer::{PeerEntry, PeerState, PeerTable};
pub use server::{InboundServer, PeerCertificateResolver};
pub use session::{PeerSession, SessionError};

/// Ties the peer table to per-peer outbound channels, and is the type
/// `trustmesh-gossip`'s scheduler and protocol handlers are driven against.
/// Each `Ready` peer has one outbox registered by whichever task (connector
/// or inbound server) owns that session's write half.
#[derive(Clone)]
pub struct ConnectionManager {
    peer_table: PeerTable,
    outboxes: Arc<Mutex<HashMap<Did, mpsc::Sender<NetworkMessage>>>>,
}

impl ConnectionManager {
    pub fn new(peer_table: PeerTable) -> Self {
        Self {
            peer_table,
            outboxes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn peer_table(&self) -> &PeerTable {
        &self.peer_table
    }

    pub fn register_outbox(&self, did: Did, tx: mpsc::Sender<NetworkMessage>) {
        self.outboxes
            .lock()
            .expect("outbox map mutex poisoned")
            .insert(did, tx);
    }

    pub fn unregister_outbox(&self, did: &Did) {
        self.outboxes
            .lock()
            .expect("outbox map mutex poisoned")
            .remove(did);
    }

    /// Enqueues `message` onto `peer`'s outbox, if one is currently
    /// registered. Silently drops the message otherwise — the gossip ticker
    /// and payload scheduler both treat an unreachable peer as transient.
    pub fn send(&self, peer: &Did, message: NetworkMessage) {
        let outbox = self
            .outboxes
            .lock()
            .expect("outbox map mutex poisoned")
            .get(peer)
            .cloned();
        match outbox {
            Some(tx) => {
                if tx.try_send(message).is_err() {
                    tracing::warn!(peer = %peer, "outbox full or closed, dropping message");
                }
            }
            None => {
                tracing::debug!(peer = %peer, "no open outbox for peer, skipping message");
            }
        }
    }

    /// Sends `message` to every currently `Ready` peer with a registered
    /// outbox.
    pub fn broadcast(&self, message: NetworkMessage) {
        for peer in self.peer_table.ready_dids() {
            self.send(&peer, message.clone());
        }
    }
}

impl PeerSource for ConnectionManager {
    fn random_ready_peer(&self) -> Option<Did> {
        self.peer_table.random_ready_peer()
    }
}

impl PayloadQuerySender for ConnectionManager {
    fn send_transaction_payload_query(&self, peer: &Did, tx_ref: TxRef) {
        self.send(peer, NetworkMessage::TransactionPayloadQuery { tx_ref });
    }
}
