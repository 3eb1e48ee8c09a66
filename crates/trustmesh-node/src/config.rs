//! `NodeConfig` and the local identity bootstrap file. Loaded as plain
//! JSON rather than a bespoke binary format, for the same reason node
//! startup parameters elsewhere in this workspace favor a readable
//! sidecar file over a custom serialization.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use trustmesh_core::{Did, PublicKey};
use trustmesh_identity::fakes::{InMemoryDocResolver, InMemoryKeyStore, StaticDocFinder};
use trustmesh_identity::{DidDocument, Service, VerificationMethod};

/// Recognized node configuration options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node_did: Option<String>,
    pub grpc_addr: Option<String>,
    pub bootstrap_nodes: Vec<String>,
    pub enable_tls: bool,
    pub cert_file: Option<PathBuf>,
    pub cert_key_file: Option<PathBuf>,
    pub trust_store_file: Option<PathBuf>,
    pub max_crl_validity_days: u32,
    pub disable_node_authentication: bool,
    pub enable_discovery: bool,
    pub strict_mode: bool,
    pub data_dir: PathBuf,
    pub identity_file: Option<PathBuf>,
    pub diagnostics_interval_secs: u64,
    pub gossip_tick_interval_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_did: None,
            grpc_addr: None,
            bootstrap_nodes: Vec::new(),
            enable_tls: false,
            cert_file: None,
            cert_key_file: None,
            trust_store_file: None,
            max_crl_validity_days: 4,
            disable_node_authentication: false,
            enable_discovery: false,
            strict_mode: false,
            data_dir: PathBuf::from("./data"),
            identity_file: None,
            diagnostics_interval_secs: 30,
            gossip_tick_interval_secs: 5,
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing config file {}: {e}", path.display()))?;
        if config.strict_mode && config.disable_node_authentication {
            anyhow::bail!("strict_mode forbids disable_node_authentication");
        }
        Ok(config)
    }
}

/// On-disk shape of the local identity bootstrap file: a minimal stand-in
/// for a real DID/VC management backend, which is out of scope here (§1).
/// Maps directly onto the `DocResolver`/`DocFinder`/`KeyStore` fakes.
#[derive(Debug, Deserialize)]
struct IdentityFile {
    did: String,
    deactivated: bool,
    key_agreement_kid: String,
    key_agreement_public_key_hex: String,
    nuts_comm_endpoint: String,
}

pub struct LocalIdentityStore {
    pub doc_resolver: InMemoryDocResolver,
    pub key_store: InMemoryKeyStore,
    pub doc_finder: StaticDocFinder,
    pub did: Did,
}

pub fn load_identity_store(path: &Path) -> anyhow::Result<LocalIdentityStore> {
    let raw = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading identity file {}: {e}", path.display()))?;
    let parsed: IdentityFile = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("parsing identity file {}: {e}", path.display()))?;

    let did = Did::from(parsed.did.clone());
    let public_key = PublicKey(
        hex::decode(&parsed.key_agreement_public_key_hex)
            .map_err(|e| anyhow::anyhow!("key_agreement_public_key_hex is not valid hex: {e}"))?,
    );

    let document = DidDocument {
        id: did.clone(),
        deactivated: parsed.deactivated,
        key_agreement: vec![VerificationMethod {
            id: parsed.key_agreement_kid.clone(),
            public_key,
        }],
        services: vec![Service {
            id: format!("{}#nutscomm", parsed.did),
            service_type: "NutsComm".to_string(),
            service_endpoint: parsed.nuts_comm_endpoint,
        }],
    };

    let mut doc_resolver = InMemoryDocResolver::default();
    doc_resolver.insert(document);

    let mut key_store = InMemoryKeyStore::default();
    key_store.insert(parsed.key_agreement_kid);

    let mut doc_finder = StaticDocFinder::default();
    doc_finder.add_candidate(did.clone());

    Ok(LocalIdentityStore {
        doc_resolver,
        key_store,
        doc_finder,
        did,
    })
}
