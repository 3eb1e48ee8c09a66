use serde::{Deserialize, Serialize};
use thiserror::Error;
use trustmesh_core::{Did, Transaction, TxRef};

/// Wire messages of the gossip protocol (§4.3, §6). v2 + XOR-digest only —
/// see the crate-level docs for why v1's block-date advertisement scheme
/// was dropped.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum NetworkMessage {
    /// Sent once after a session is authenticated, announcing who we are.
    Hello { node_did: Option<Did> },

    /// Advertises a sample of refs we hold plus a cheap divergence
    /// fingerprint: the XOR-fold of every ref we know (`omnihash`) and our
    /// highest Lamport clock.
    Gossip {
        refs: Vec<TxRef>,
        omnihash: [u8; 32],
        lc: u64,
    },

    /// Request the full signed transactions for the given refs. Supplements
    /// the narrower v2 protocol captured in `handlers.go`: `Gossip` alone
    /// reveals *that* a ref is unknown, not its contents, and v1's
    /// AdvertHashes/TransactionListQuery machinery was deliberately dropped
    /// rather than ported — see DESIGN.md.
    TransactionListQuery { refs: Vec<TxRef> },

    /// Reply to `TransactionListQuery`: every requested transaction we had.
    /// Silently omits refs we don't have rather than erroring.
    TransactionList { transactions: Vec<Transaction> },

    /// Request the payload bytes for one transaction.
    TransactionPayloadQuery { tx_ref: TxRef },

    /// Reply to `TransactionPayloadQuery`. An empty `data` means "I don't
    /// have it, or you're not authorized to see it" — the two are
    /// deliberately indistinguishable on the wire (§4.3).
    TransactionPayload { tx_ref: TxRef, data: Vec<u8> },
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode message: {0}")]
    Encode(String),
    #[error("failed to decode message: {0}")]
    Decode(String),
}

impl NetworkMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
