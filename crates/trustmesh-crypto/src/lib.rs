//! trustmesh-crypto
//!
//! Signing, hashing, and Participant Access List encryption for the
//! TrustMesh transaction model: Ed25519 for signatures, X25519 for ECDH-ES
//! key agreement, and SHA-256 for content addressing, matching what
//! `trustmesh-core`'s envelope model requires.

pub mod hash;
pub mod keypair;
pub mod pal;
pub mod signing;

pub use hash::{payload_hash, sha256};
pub use keypair::{AgreementKeyPair, SigningKeyPair};
pub use pal::{decrypt_pal, encrypt_for_recipient, try_decrypt, PalError};
pub use signing::{sign, verify, SignatureError, TrustMeshSigner};
