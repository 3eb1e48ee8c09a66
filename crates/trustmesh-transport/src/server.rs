//! Inbound TLS server: accepts connections, completes the mTLS handshake,
//! and resolves the peer's certificate to a node DID before admitting it to
//! the peer table.

use std::net::SocketAddr;
use std::sync::Arc;

use rustls::pki_types::CertificateDer;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use trustmesh_core::Did;
use trustmesh_gossip::NetworkMessage;
use trustmesh_state::StateStore;

use crate::peer::{PeerState, PeerTable};
use crate::session::PeerSession;
use crate::ConnectionManager;

/// Resolves a peer's leaf certificate to a node DID. Implemented by
/// `trustmesh-identity` against its `KeyResolver`/`DocFinder` contracts; kept
/// as a trait here so this crate doesn't depend on identity resolution
/// machinery directly.
pub trait PeerCertificateResolver: Send + Sync {
    fn resolve_did(&self, leaf_cert_der: &[u8]) -> Option<Did>;
}

pub struct InboundServer {
    listen_addr: SocketAddr,
    acceptor: TlsAcceptor,
    peer_table: PeerTable,
    resolver: Arc<dyn PeerCertificateResolver>,
    accept_unauthenticated: bool,
    connection_manager: ConnectionManager,
    store: Arc<StateStore>,
    agreement_secret: Option<Arc<x25519_dalek::StaticSecret>>,
    shutdown: tokio::sync::watch::Receiver<bool>,
}

impl InboundServer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        listen_addr: SocketAddr,
        server_config: Arc<rustls::ServerConfig>,
        peer_table: PeerTable,
        resolver: Arc<dyn PeerCertificateResolver>,
        accept_unauthenticated: bool,
        connection_manager: ConnectionManager,
        store: Arc<StateStore>,
        agreement_secret: Option<Arc<x25519_dalek::StaticSecret>>,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Self {
        Self {
            listen_addr,
            acceptor: TlsAcceptor::from(server_config),
            peer_table,
            resolver,
            accept_unauthenticated,
            connection_manager,
            store,
            agreement_secret,
            shutdown,
        }
    }

    /// Accept loop. Run in a dedicated tokio task; returns only on a bind or
    /// fatal accept error.
    pub async fn run(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.listen_addr).await?;
        tracing::info!(addr = %self.listen_addr, "transport listening");

        loop {
            let (tcp, peer_addr) = listener.accept().await?;
            let acceptor = self.acceptor.clone();
            let peer_table = self.peer_table.clone();
            let resolver = self.resolver.clone();
            let accept_unauthenticated = self.accept_unauthenticated;
            let connection_manager = self.connection_manager.clone();
            let store = self.store.clone();
            let agreement_secret = self.agreement_secret.clone();
            let shutdown = self.shutdown.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_inbound(
                    tcp,
                    peer_addr,
                    acceptor,
                    peer_table.clone(),
                    resolver,
                    accept_unauthenticated,
                    connection_manager,
                    store,
                    agreement_secret,
                    shutdown,
                )
                .await
                {
                    tracing::warn!(peer = %peer_addr, error = %e, "inbound session failed");
                    peer_table.transition(&peer_addr.to_string(), PeerState::Closed);
                }
            });
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_inbound(
    tcp: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    acceptor: TlsAcceptor,
    peer_table: PeerTable,
    resolver: Arc<dyn PeerCertificateResolver>,
    accept_unauthenticated: bool,
    connection_manager: ConnectionManager,
    store: Arc<StateStore>,
    agreement_secret: Option<Arc<x25519_dalek::StaticSecret>>,
    shutdown: tokio::sync::watch::Receiver<bool>,
) -> std::io::Result<()> {
    let conn_id = peer_addr.to_string();
    peer_table.transition(&conn_id, PeerState::Authenticating);

    let tls = acceptor.accept(tcp).await?;
    let peer_certs: Option<Vec<CertificateDer<'static>>> = {
        let (_, server_conn) = tls.get_ref();
        server_conn.peer_certificates().map(|c| c.to_vec())
    };

    let did = match peer_certs.as_ref().and_then(|c| c.first()) {
        Some(leaf) => resolver.resolve_did(leaf),
        None => None,
    };

    if did.is_none() && !accept_unauthenticated {
        tracing::warn!(peer = %peer_addr, "could not resolve peer certificate to a node DID, dropping");
        peer_table.transition(&conn_id, PeerState::Closed);
        return Ok(());
    }

    let mut session = PeerSession::new(tls);
    session
        .send(&NetworkMessage::Hello { node_did: did.clone() })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let peer_did = match did {
        Some(did) => {
            peer_table.set_did(&conn_id, did.clone());
            did
        }
        None => Did::from(format!("did:trustmesh:unauthenticated:{conn_id}")),
    };
    peer_table.transition(&conn_id, PeerState::Ready);
    tracing::info!(peer = %peer_addr, "inbound session established");

    crate::session_task::run_session(
        session,
        conn_id,
        peer_did,
        peer_table,
        connection_manager,
        store,
        agreement_secret,
        shutdown,
    )
    .await;
    Ok(())
}
