//! Outbound dialer: connects to a bootstrap/reconnect peer, performs the TLS
//! handshake, exchanges `Hello`, and retries with backoff on failure.

use std::net::SocketAddr;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use trustmesh_core::Did;
use trustmesh_gossip::NetworkMessage;
use trustmesh_state::StateStore;

use crate::backoff::Backoff;
use crate::peer::{PeerState, PeerTable};
use crate::session::PeerSession;
use crate::ConnectionManager;

/// Dials `addr` once, authenticates, and exchanges `Hello`. On success the
/// peer table is advanced to `Ready`, the backoff is reset, and the
/// authenticated session is returned for the caller to run; on failure the
/// peer table is left at `Closed` and the caller sleeps for the next
/// backoff interval before retrying.
pub async fn dial_once(
    addr: SocketAddr,
    local_did: Option<Did>,
    client_config: Arc<rustls::ClientConfig>,
    peer_table: &PeerTable,
    backoff: &mut Backoff,
) -> std::io::Result<(PeerSession<TlsStream<tokio::net::TcpStream>>, Did)> {
    let conn_id = addr.to_string();
    peer_table.transition(&conn_id, PeerState::Dialing);

    let tcp = tokio::net::TcpStream::connect(addr).await?;
    peer_table.transition(&conn_id, PeerState::Authenticating);

    let connector = TlsConnector::from(client_config);
    let server_name = ServerName::IpAddress(addr.ip().into());
    let tls = connector.connect(server_name, tcp).await?;

    let mut session = PeerSession::new(tls);
    session
        .send(&NetworkMessage::Hello { node_did: local_did })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    match session.recv().await {
        Ok(NetworkMessage::Hello { node_did: Some(did) }) => {
            peer_table.set_did(&conn_id, did.clone());
            peer_table.transition(&conn_id, PeerState::Ready);
            backoff.reset();
            tracing::info!(peer = %conn_id, "outbound session established");
            Ok((session, did))
        }
        Ok(_) => {
            peer_table.transition(&conn_id, PeerState::Closed);
            Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "expected Hello as first message",
            ))
        }
        Err(e) => {
            peer_table.transition(&conn_id, PeerState::Closed);
            Err(std::io::Error::new(std::io::ErrorKind::Other, e))
        }
    }
}

/// Drives repeated dial attempts against one bootstrap address until
/// `shutdown` fires. Intended to run as its own tokio task per peer. Each
/// successful dial runs the peer's send/receive loops to completion before
/// redialing — a connected session is not torn down until the peer actually
/// disconnects or shutdown fires.
#[allow(clippy::too_many_arguments)]
pub async fn run_outbound(
    addr: SocketAddr,
    local_did: Option<Did>,
    client_config: Arc<rustls::ClientConfig>,
    peer_table: PeerTable,
    connection_manager: ConnectionManager,
    store: Arc<StateStore>,
    agreement_secret: Option<Arc<x25519_dalek::StaticSecret>>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let conn_id = addr.to_string();
    let mut backoff = Backoff::new();
    loop {
        if *shutdown.borrow() {
            return;
        }
        match dial_once(addr, local_did.clone(), client_config.clone(), &peer_table, &mut backoff).await {
            Ok((session, peer_did)) => {
                crate::session_task::run_session(
                    session,
                    conn_id.clone(),
                    peer_did,
                    peer_table.clone(),
                    connection_manager.clone(),
                    store.clone(),
                    agreement_secret.clone(),
                    shutdown.clone(),
                )
                .await;
            }
            Err(e) => {
                let delay = backoff.backoff();
                tracing::warn!(peer = %addr, error = %e, delay_ms = delay.as_millis() as u64, "outbound dial failed, backing off");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
    }
}
