//! trustmesh-gossip
//!
//! The gossip/synchronization protocol: wire messages, per-peer protocol
//! handlers, and the durable payload-fetch scheduler. Transport-agnostic —
//! framing and session authentication live in `trustmesh-transport`.

pub mod handlers;
pub mod message;
pub mod payload_scheduler;

pub use handlers::{
    collect_all_refs, compute_omnihash, handle_gossip, handle_transaction_list,
    handle_transaction_list_query, handle_transaction_payload, handle_transaction_payload_query,
    highest_known_lamport_clock, GossipError,
};
pub use message::{CodecError, NetworkMessage};
pub use payload_scheduler::{Backoff, PayloadQuerySender, PayloadScheduler, PeerSource};
