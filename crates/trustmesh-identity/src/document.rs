use serde::{Deserialize, Serialize};
use trustmesh_core::{Did, PublicKey};

/// A DID document's `keyAgreement` verification method: just enough to
/// answer "does this key belong to this DID" and "what's its public key".
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationMethod {
    pub id: String,
    pub public_key: PublicKey,
}

/// A DID document service entry. `NutsComm` is the one this crate cares
/// about: the node's gRPC-style transport endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Service {
    pub id: String,
    pub service_type: String,
    pub service_endpoint: String,
}

/// Minimal projection of a W3C DID document — just the fields node identity
/// resolution and peer authentication need.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DidDocument {
    pub id: Did,
    pub deactivated: bool,
    pub key_agreement: Vec<VerificationMethod>,
    pub services: Vec<Service>,
}

impl DidDocument {
    pub fn nuts_comm_service(&self) -> Option<&Service> {
        self.services.iter().find(|s| s.service_type == "NutsComm")
    }

    pub fn has_key_agreement_private_key(&self, key_store: &dyn crate::contracts::KeyStore) -> bool {
        self.key_agreement.iter().any(|vm| key_store.exists(&vm.id))
    }
}

/// `NutsComm` endpoints are URLs of the form `grpc://host:port`; the scheme
/// is required to be `grpc` even though this implementation speaks a custom
/// framed TCP protocol rather than gRPC, since the endpoint format is a
/// DID-document-level convention shared with the rest of the network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NutsCommEndpoint {
    pub host: String,
    pub port: u16,
}

pub fn parse_nuts_comm_endpoint(endpoint: &str) -> Result<NutsCommEndpoint, crate::IdentityError> {
    let rest = endpoint
        .strip_prefix("grpc://")
        .ok_or_else(|| crate::IdentityError::InvalidNutsCommEndpoint(endpoint.to_string()))?;
    let (host, port_str) = rest
        .rsplit_once(':')
        .ok_or_else(|| crate::IdentityError::InvalidNutsCommEndpoint(endpoint.to_string()))?;
    let port: u16 = port_str
        .parse()
        .map_err(|_| crate::IdentityError::InvalidNutsCommEndpoint(endpoint.to_string()))?;
    if host.is_empty() {
        return Err(crate::IdentityError::InvalidNutsCommEndpoint(endpoint.to_string()));
    }
    Ok(NutsCommEndpoint {
        host: host.to_string(),
        port,
    })
}
