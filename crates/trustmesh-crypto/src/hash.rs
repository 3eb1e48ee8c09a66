use sha2::{Digest as _, Sha256};
use trustmesh_core::types::PayloadHash;

/// SHA-256 of arbitrary bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let out = hasher.finalize();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&out);
    arr
}

/// Hash a payload's bytes into the form stored on a transaction's envelope.
pub fn payload_hash(data: &[u8]) -> PayloadHash {
    PayloadHash::from_bytes(sha256(data))
}
