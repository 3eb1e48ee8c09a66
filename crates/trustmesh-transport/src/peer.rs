use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use trustmesh_core::Did;

/// State machine for a single peer connection (§4.4).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerState {
    /// Outbound dial in progress.
    Dialing,
    /// TCP connected, TLS handshake and DID resolution not yet complete.
    Authenticating,
    /// TLS handshake complete, peer resolved to a node DID, sessions open.
    Ready,
    /// Connection closed, either cleanly or due to a failure.
    Closed,
}

#[derive(Clone, Debug)]
pub struct PeerEntry {
    pub did: Option<Did>,
    pub state: PeerState,
    pub last_transition: SystemTime,
}

impl PeerEntry {
    fn new(state: PeerState) -> Self {
        Self {
            did: None,
            state,
            last_transition: SystemTime::now(),
        }
    }
}

/// Tracks every peer this node knows about, keyed by a locally-assigned
/// connection id (a socket addr or listener-accepted stream serves as the
/// key at the connector/server layer; the table itself is addressing-agnostic).
#[derive(Clone, Default)]
pub struct PeerTable {
    inner: Arc<Mutex<HashMap<String, PeerEntry>>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transition(&self, conn_id: &str, state: PeerState) {
        let mut table = self.inner.lock().expect("peer table mutex poisoned");
        let entry = table
            .entry(conn_id.to_string())
            .or_insert_with(|| PeerEntry::new(state));
        entry.state = state;
        entry.last_transition = SystemTime::now();
        tracing::info!(conn_id, ?state, "peer state transition");
    }

    pub fn set_did(&self, conn_id: &str, did: Did) {
        let mut table = self.inner.lock().expect("peer table mutex poisoned");
        if let Some(entry) = table.get_mut(conn_id) {
            entry.did = Some(did);
        }
    }

    pub fn remove(&self, conn_id: &str) {
        self.inner
            .lock()
            .expect("peer table mutex poisoned")
            .remove(conn_id);
    }

    pub fn get(&self, conn_id: &str) -> Option<PeerEntry> {
        self.inner
            .lock()
            .expect("peer table mutex poisoned")
            .get(conn_id)
            .cloned()
    }

    pub fn ready_dids(&self) -> Vec<Did> {
        self.inner
            .lock()
            .expect("peer table mutex poisoned")
            .values()
            .filter(|e| e.state == PeerState::Ready)
            .filter_map(|e| e.did.clone())
            .collect()
    }
}

/// Implements gossip's narrow peer-source seam: a random `Ready` peer DID.
impl trustmesh_gossip::PeerSource for PeerTable {
    fn random_ready_peer(&self) -> Option<Did> {
        let ready = self.ready_dids();
        if ready.is_empty() {
            return None;
        }
        use rand::seq::SliceRandom;
        ready.choose(&mut rand::thread_rng()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_visible_immediately() {
        let table = PeerTable::new();
        table.transition("peer-1", PeerState::Dialing);
        assert_eq!(table.get("peer-1").unwrap().state, PeerState::Dialing);

        table.transition("peer-1", PeerState::Authenticating);
        table.set_did("peer-1", Did::from("did:trustmesh:peer"));
        table.transition("peer-1", PeerState::Ready);

        let entry = table.get("peer-1").unwrap();
        assert_eq!(entry.state, PeerState::Ready);
        assert_eq!(entry.did, Some(Did::from("did:trustmesh:peer")));
    }

    #[test]
    fn only_ready_peers_are_offered_to_gossip() {
        use trustmesh_gossip::PeerSource;

        let table = PeerTable::new();
        table.transition("peer-1", PeerState::Authenticating);
        table.set_did("peer-1", Did::from("did:trustmesh:one"));
        assert!(table.random_ready_peer().is_none());

        table.transition("peer-1", PeerState::Ready);
        assert_eq!(table.random_ready_peer(), Some(Did::from("did:trustmesh:one")));
    }

    #[test]
    fn closed_peer_is_removed() {
        let table = PeerTable::new();
        table.transition("peer-1", PeerState::Ready);
        table.remove("peer-1");
        assert!(table.get("peer-1").is_none());
    }
}
