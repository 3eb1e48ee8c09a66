//! `trustmesh-node` — the orchestration binary (§4.6). Configures and
//! starts one node: resolves local identity, opens the state store, starts
//! the authenticated transport and gossip tasks, and runs until a shutdown
//! signal arrives.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use trustmesh_crypto::{AgreementKeyPair, SigningKeyPair};

use trustmesh_node::config::{load_identity_store, NodeConfig};
use trustmesh_node::node::Node;

/// A handful of direct flags for the common case, with a config file for
/// everything else.
#[derive(Parser, Debug)]
#[command(name = "trustmesh-node", about = "TrustMesh self-sovereign-identity network node")]
struct Args {
    /// Path to a JSON node configuration file.
    #[arg(long, default_value = "trustmesh.json")]
    config: PathBuf,

    /// Path to the local identity bootstrap file (overrides config's `identity_file`).
    #[arg(long)]
    identity_file: Option<PathBuf>,

    /// Override `data_dir` from the config file.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,trustmesh=debug")),
        )
        .init();

    let args = Args::parse();

    let mut config = NodeConfig::load(&args.config)
        .with_context(|| format!("loading node config from {}", args.config.display()))?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    let identity_path = args
        .identity_file
        .or_else(|| config.identity_file.clone())
        .context("no identity_file given (pass --identity-file or set identity_file in the config)")?;
    let identity_store = load_identity_store(&identity_path)
        .with_context(|| format!("loading identity file {}", identity_path.display()))?;

    if config.node_did.is_none() {
        config.node_did = Some(identity_store.did.0.clone());
    }

    // The node's Ed25519 signing keypair and X25519 key-agreement keypair
    // are both generated fresh on every start rather than persisted; wiring
    // a durable key store is a KeyStore-backend concern, out of scope here
    // (§1, §6).
    let signing_key_pair = SigningKeyPair::generate();
    let agreement_key_pair = AgreementKeyPair::generate();

    let node = Node::configure(
        config,
        &identity_store.doc_resolver,
        &identity_store.doc_finder,
        &identity_store.key_store,
        signing_key_pair,
        agreement_key_pair,
    )
    .context("configuring node")?;

    node.start().await.context("starting node")?;

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    tracing::info!("shutdown signal received");
    node.shutdown().context("shutting down node")?;

    Ok(())
}
