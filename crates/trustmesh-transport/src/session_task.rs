//! The per-peer send loop and receive loop that keep an authenticated
//! session alive once the `Hello` handshake completes, dispatching incoming
//! messages to the gossip protocol handlers. Both the outbound connector
//! and the inbound server hand their session off to [`run_session`] rather
//! than tearing it down after the handshake.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use trustmesh_core::{Did, InlineOnlyResolver};
use trustmesh_gossip::{
    collect_all_refs, compute_omnihash, handle_gossip, handle_transaction_list,
    handle_transaction_list_query, handle_transaction_payload, handle_transaction_payload_query,
    highest_known_lamport_clock, NetworkMessage,
};
use trustmesh_state::StateStore;

use crate::peer::{PeerState, PeerTable};
use crate::session::PeerSession;
use crate::ConnectionManager;

const OUTBOX_CAPACITY: usize = 64;

/// Runs until the peer disconnects or `shutdown` fires. Registers an
/// outbox with `connection_manager` so the gossip ticker and payload
/// scheduler can reach this peer for the session's lifetime, and
/// unregisters it and marks the peer table entry `Closed` on exit.
pub async fn run_session<S>(
    session: PeerSession<S>,
    conn_id: String,
    peer_did: Did,
    peer_table: PeerTable,
    connection_manager: ConnectionManager,
    store: Arc<StateStore>,
    agreement_secret: Option<Arc<x25519_dalek::StaticSecret>>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut reader, mut writer) = session.split();
    let (outbox_tx, mut outbox_rx) = mpsc::channel::<NetworkMessage>(OUTBOX_CAPACITY);
    connection_manager.register_outbox(peer_did.clone(), outbox_tx.clone());

    let write_task = tokio::spawn(async move {
        while let Some(message) = outbox_rx.recv().await {
            if let Err(e) = writer.send(&message).await {
                tracing::info!(error = %e, "peer session write half closed");
                break;
            }
        }
    });

    let key_resolver = InlineOnlyResolver;
    loop {
        tokio::select! {
            message = reader.recv() => {
                match message {
                    Ok(message) => dispatch(
                        message,
                        &peer_did,
                        &store,
                        &key_resolver,
                        agreement_secret.as_deref(),
                        &outbox_tx,
                    ),
                    Err(e) => {
                        tracing::info!(peer = %peer_did, error = %e, "peer session closed");
                        break;
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    connection_manager.unregister_outbox(&peer_did);
    peer_table.transition(&conn_id, PeerState::Closed);
    write_task.abort();
}

/// Handles one inbound message, applying it to `store` and queueing any
/// reply onto `outbox`. Replies are best-effort: a full or closed outbox
/// just drops them, same as the rest of this crate's send paths.
fn dispatch(
    message: NetworkMessage,
    peer_did: &Did,
    store: &StateStore,
    key_resolver: &InlineOnlyResolver,
    agreement_secret: Option<&x25519_dalek::StaticSecret>,
    outbox: &mpsc::Sender<NetworkMessage>,
) {
    match message {
        NetworkMessage::Hello { .. } => {
            tracing::debug!(peer = %peer_did, "ignoring Hello received after handshake");
        }
        NetworkMessage::Gossip { refs, omnihash, .. } => {
            let unknown = handle_gossip(store, &refs);
            if !unknown.is_empty() {
                let _ = outbox.try_send(NetworkMessage::TransactionListQuery { refs: unknown });
            } else if compute_omnihash(store) != omnihash {
                // The sampled refs didn't reveal anything new, but the
                // omnihashes still disagree: fall back to a fuller exchange
                // advertising every ref we know instead of just a sample.
                let _ = outbox.try_send(NetworkMessage::Gossip {
                    refs: collect_all_refs(store),
                    omnihash: compute_omnihash(store),
                    lc: highest_known_lamport_clock(store),
                });
            }
        }
        NetworkMessage::TransactionListQuery { refs } => match handle_transaction_list_query(store, &refs) {
            Ok(transactions) => {
                let _ = outbox.try_send(NetworkMessage::TransactionList { transactions });
            }
            Err(e) => {
                tracing::warn!(peer = %peer_did, error = %e, "failed to answer transaction list query");
            }
        },
        NetworkMessage::TransactionList { transactions } => {
            for (tx_ref, e) in handle_transaction_list(store, transactions, key_resolver) {
                tracing::warn!(peer = %peer_did, tx_ref = %tx_ref, error = %e, "rejected transaction from peer");
            }
        }
        NetworkMessage::TransactionPayloadQuery { tx_ref } => {
            let data = handle_transaction_payload_query(store, Some(peer_did), agreement_secret, tx_ref);
            let _ = outbox.try_send(NetworkMessage::TransactionPayload { tx_ref, data });
        }
        NetworkMessage::TransactionPayload { tx_ref, data } => {
            if let Err(e) = handle_transaction_payload(store, tx_ref, data) {
                tracing::warn!(peer = %peer_did, tx_ref = %tx_ref, error = %e, "rejected transaction payload from peer");
            }
        }
    }
}
