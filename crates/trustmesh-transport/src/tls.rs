//! mTLS session setup: `rustls` configs built from PEM files (client
//! certificate, trust store) over a bare TCP transport.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {0}: {1}")]
    Io(String, std::io::Error),
    #[error("no private key found in {0}")]
    MissingPrivateKey(String),
    #[error("rustls configuration error: {0}")]
    Rustls(String),
}

pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::Io(path.display().to_string(), e))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::Io(path.display().to_string(), e))
}

pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::Io(path.display().to_string(), e))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TlsError::Io(path.display().to_string(), e))?
        .ok_or_else(|| TlsError::MissingPrivateKey(path.display().to_string()))
}

fn load_root_store(trust_store_file: &Path) -> Result<RootCertStore, TlsError> {
    let mut store = RootCertStore::empty();
    for cert in load_certs(trust_store_file)? {
        store
            .add(cert)
            .map_err(|e| TlsError::Rustls(e.to_string()))?;
    }
    Ok(store)
}

/// Server config requiring a client certificate chaining to the trust
/// store — this is the mutual-authentication half of mTLS. A peer with no
/// certificate, or one the trust store doesn't vouch for, fails the
/// handshake before any application bytes are exchanged.
pub fn build_server_config(
    cert_file: &Path,
    cert_key_file: &Path,
    trust_store_file: &Path,
) -> Result<Arc<ServerConfig>, TlsError> {
    let certs = load_certs(cert_file)?;
    let key = load_private_key(cert_key_file)?;
    let roots = Arc::new(load_root_store(trust_store_file)?);

    let client_verifier = WebPkiClientVerifier::builder(roots)
        .build()
        .map_err(|e| TlsError::Rustls(e.to_string()))?;

    let config = ServerConfig::builder()
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(certs, key)
        .map_err(|e| TlsError::Rustls(e.to_string()))?;

    Ok(Arc::new(config))
}

/// Client config presenting our own certificate, trusting the same store
/// the server side does.
pub fn build_client_config(
    cert_file: &Path,
    cert_key_file: &Path,
    trust_store_file: &Path,
) -> Result<Arc<ClientConfig>, TlsError> {
    let certs = load_certs(cert_file)?;
    let key = load_private_key(cert_key_file)?;
    let roots = load_root_store(trust_store_file)?;

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .map_err(|e| TlsError::Rustls(e.to_string()))?;

    Ok(Arc::new(config))
}
