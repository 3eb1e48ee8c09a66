use std::net::SocketAddr;
use std::path::PathBuf;

/// Configuration for the authenticated TLS transport (§4.4).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Local listen address for the inbound TLS server.
    pub listen_addr: SocketAddr,
    /// Addresses of peers to dial on startup and redial on disconnect.
    pub bootstrap_peers: Vec<SocketAddr>,
    /// PEM-encoded leaf certificate for this node.
    pub cert_file: PathBuf,
    /// PEM-encoded private key matching `cert_file`.
    pub cert_key_file: PathBuf,
    /// PEM bundle of trusted CA certificates, and the directory CRLs are
    /// loaded from alongside it.
    pub trust_store_file: PathBuf,
    /// A CRL older than this is treated as stale: a peer certificate is not
    /// rejected on its account, only a warning is logged.
    pub max_crl_validity_days: u32,
    /// Accept an inbound connection whose certificate doesn't resolve to a
    /// known node DID. Off by default; exists for bootstrapping and tests.
    pub accept_unauthenticated: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:7890".parse().expect("valid default listen addr"),
            bootstrap_peers: Vec::new(),
            cert_file: PathBuf::from("node.crt"),
            cert_key_file: PathBuf::from("node.key"),
            trust_store_file: PathBuf::from("truststore.pem"),
            max_crl_validity_days: 4,
            accept_unauthenticated: false,
        }
    }
}
