//! Composition root (§4.6): owns one `StateStore`, one `ConnectionManager`,
//! one `Publisher`, one `NodeIdentity`, and drives the gossip ticker,
//! payload scheduler, and diagnostics aggregator tasks. Never a process
//! singleton — `main` constructs exactly one `Node` and holds it by `Arc`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use trustmesh_core::SigningKey;
use trustmesh_crypto::{AgreementKeyPair, SigningKeyPair};
use trustmesh_gossip::{compute_omnihash, highest_known_lamport_clock, NetworkMessage, PayloadScheduler};
use trustmesh_identity::{DocFinder, DocResolver, KeyStore, NodeDidMode, NodeIdentity};
use trustmesh_publisher::Publisher;
use trustmesh_state::StateStore;
use trustmesh_transport::{ConnectionManager, PeerTable};

use crate::config::NodeConfig;

/// Snapshot logged by the diagnostics aggregator and available to admin-API
/// callers this workspace doesn't implement (§4.6, out of scope per §1).
#[derive(Debug, Clone, serde::Serialize)]
pub struct Diagnostics {
    pub transaction_count: u64,
    pub payload_count: u64,
    pub head_count: u64,
    pub ready_peer_count: usize,
    pub omnihash: String,
}

pub struct Node {
    config: NodeConfig,
    store: Arc<StateStore>,
    connection_manager: ConnectionManager,
    identity: NodeIdentity,
    signing_key_pair: SigningKeyPair,
    agreement_key_pair: AgreementKeyPair,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Node {
    /// Resolves and validates the local node identity, opens the state
    /// store, and assembles the peer table. Does not open any network
    /// listener yet — that happens in `start()`.
    pub fn configure(
        config: NodeConfig,
        doc_resolver: &dyn DocResolver,
        doc_finder: &dyn DocFinder,
        key_store: &dyn KeyStore,
        signing_key_pair: SigningKeyPair,
        agreement_key_pair: AgreementKeyPair,
    ) -> anyhow::Result<Self> {
        let mode = match &config.node_did {
            Some(did) => NodeDidMode::Fixed(trustmesh_core::Did::from(did.clone())),
            None => NodeDidMode::Auto,
        };
        let identity = NodeIdentity::configure(mode, doc_resolver, doc_finder, key_store)
            .context("resolving local node identity")?;

        let store = Arc::new(
            StateStore::open(&config.data_dir)
                .with_context(|| format!("opening state store at {}", config.data_dir.display()))?,
        );

        let peer_table = PeerTable::new();
        let connection_manager = ConnectionManager::new(peer_table);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            store,
            connection_manager,
            identity,
            signing_key_pair,
            agreement_key_pair,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Starts the inbound listener (if configured), outbound connectors to
    /// bootstrap peers, the gossip ticker, the payload scheduler, and the
    /// diagnostics aggregator. Returns once every task is spawned; tasks run
    /// until `shutdown()` is called.
    pub async fn start(&self) -> anyhow::Result<()> {
        if let Some(addr) = &self.config.grpc_addr {
            self.start_inbound(addr).context("starting inbound transport")?;
        }

        for peer in &self.config.bootstrap_nodes {
            self.start_outbound(peer)
                .with_context(|| format!("starting outbound connector to {peer}"))?;
        }

        self.start_gossip_ticker();
        self.start_diagnostics_aggregator();

        tracing::info!(node_did = %self.identity.did, "node started");
        Ok(())
    }

    fn start_inbound(&self, addr: &str) -> anyhow::Result<()> {
        let listen_addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("grpc_addr {addr} is not a valid socket address"))?;

        let cert_file = self
            .config
            .cert_file
            .clone()
            .context("enable_tls requires cert_file")?;
        let cert_key_file = self
            .config
            .cert_key_file
            .clone()
            .context("enable_tls requires cert_key_file")?;
        let trust_store_file = self
            .config
            .trust_store_file
            .clone()
            .context("enable_tls requires trust_store_file")?;

        let server_config =
            trustmesh_transport::tls::build_server_config(&cert_file, &cert_key_file, &trust_store_file)
                .context("building TLS server config")?;

        // Reverse-resolving a peer certificate to a DID needs a real
        // DocFinder backend (§4.5); the bootstrap identity store this binary
        // wires in doesn't carry one, so an inbound listener only makes
        // sense with disable_node_authentication set.
        if !self.config.disable_node_authentication {
            anyhow::bail!(
                "inbound TLS listener requires peer-certificate-to-DID resolution; \
                 set disable_node_authentication=true until a DocFinder-backed resolver is wired in"
            );
        }

        let peer_table = self.connection_manager.peer_table().clone();
        let resolver: Arc<dyn trustmesh_transport::PeerCertificateResolver> =
            Arc::new(NullCertificateResolver);
        let accept_unauthenticated = self.config.disable_node_authentication;
        let server = trustmesh_transport::InboundServer::new(
            listen_addr,
            server_config,
            peer_table,
            resolver,
            accept_unauthenticated,
            self.connection_manager.clone(),
            self.store.clone(),
            Some(self.agreement_secret()),
            self.shutdown_rx.clone(),
        );

        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                tracing::error!(error = %e, "inbound server exited");
            }
        });
        Ok(())
    }

    fn agreement_secret(&self) -> Arc<x25519_dalek::StaticSecret> {
        Arc::new(self.agreement_key_pair.secret().clone())
    }

    fn start_outbound(&self, peer: &str) -> anyhow::Result<()> {
        let addr: SocketAddr = peer
            .parse()
            .with_context(|| format!("bootstrap address {peer} is not a valid socket address"))?;

        let cert_file = self.config.cert_file.clone();
        let cert_key_file = self.config.cert_key_file.clone();
        let trust_store_file = self.config.trust_store_file.clone();
        let (cert_file, cert_key_file, trust_store_file) =
            match (cert_file, cert_key_file, trust_store_file) {
                (Some(a), Some(b), Some(c)) => (a, b, c),
                _ => anyhow::bail!("outbound connector requires cert_file/cert_key_file/trust_store_file"),
            };

        let client_config =
            trustmesh_transport::tls::build_client_config(&cert_file, &cert_key_file, &trust_store_file)
                .context("building TLS client config")?;

        let peer_table = self.connection_manager.peer_table().clone();
        let local_did = Some(self.identity.did.clone());
        let shutdown_rx = self.shutdown_rx.clone();
        let connection_manager = self.connection_manager.clone();
        let store = self.store.clone();
        let agreement_secret = Some(self.agreement_secret());

        tokio::spawn(async move {
            trustmesh_transport::connector::run_outbound(
                addr,
                local_did,
                client_config,
                peer_table,
                connection_manager,
                store,
                agreement_secret,
                shutdown_rx,
            )
            .await;
        });
        Ok(())
    }

    fn start_gossip_ticker(&self) {
        let store = self.store.clone();
        let connection_manager = self.connection_manager.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();
        let tick_interval = Duration::from_secs(self.config.gossip_tick_interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let scheduler = PayloadScheduler::new(&store);
                        let now = std::time::SystemTime::now()
                            .duration_since(std::time::UNIX_EPOCH)
                            .unwrap_or_default()
                            .as_secs() as i64;
                        match scheduler.tick(now, &connection_manager, &connection_manager) {
                            Ok(dispatched) if dispatched > 0 => {
                                tracing::debug!(dispatched, "payload scheduler dispatched fetch queries");
                            }
                            Ok(_) => {}
                            Err(e) => tracing::warn!(error = %e, "payload scheduler tick failed"),
                        }

                        let refs = store.heads().unwrap_or_default();
                        let gossip = NetworkMessage::Gossip {
                            refs,
                            omnihash: compute_omnihash(&store),
                            lc: highest_known_lamport_clock(&store),
                        };
                        connection_manager.broadcast(gossip);
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            return;
                        }
                    }
                }
            }
        });
    }

    fn start_diagnostics_aggregator(&self) {
        let store = self.store.clone();
        let connection_manager = self.connection_manager.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();
        let interval = Duration::from_secs(self.config.diagnostics_interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let stats = store.statistics();
                        let omnihash = compute_omnihash(&store);
                        let diagnostics = Diagnostics {
                            transaction_count: stats.transaction_count,
                            payload_count: stats.payload_count,
                            head_count: stats.head_count,
                            ready_peer_count: connection_manager.peer_table().ready_dids().len(),
                            omnihash: hex::encode(omnihash),
                        };
                        tracing::info!(
                            transaction_count = diagnostics.transaction_count,
                            payload_count = diagnostics.payload_count,
                            head_count = diagnostics.head_count,
                            ready_peer_count = diagnostics.ready_peer_count,
                            omnihash = %diagnostics.omnihash,
                            "diagnostics"
                        );
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            return;
                        }
                    }
                }
            }
        });
    }

    /// Idempotent: a second call is a no-op.
    pub fn shutdown(&self) -> anyhow::Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.store.flush().context("flushing state store on shutdown")?;
        tracing::info!("node shut down");
        Ok(())
    }

    pub fn signing_key(&self) -> SigningKey {
        SigningKey::Jwk(self.signing_key_pair.public_key.clone())
    }

    pub fn publisher<'a>(
        &'a self,
        recipient_resolver: &'a dyn trustmesh_core::RecipientKeyResolver,
        signing_key_resolver: &'a dyn trustmesh_core::SigningKeyResolver,
    ) -> Publisher<'a> {
        Publisher::new(
            self.store.clone(),
            self.signing_key_pair.signer(),
            self.signing_key(),
            recipient_resolver,
            signing_key_resolver,
        )
    }
}

/// Placeholder used only when `disable_node_authentication` is set: every
/// inbound peer is treated as unresolvable, which `InboundServer` then
/// admits anyway because `accept_unauthenticated` is true.
struct NullCertificateResolver;

impl trustmesh_transport::PeerCertificateResolver for NullCertificateResolver {
    fn resolve_did(&self, _leaf_cert_der: &[u8]) -> Option<trustmesh_core::Did> {
        None
    }
}
