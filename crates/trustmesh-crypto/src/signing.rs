use ed25519_dalek::{Signer as _, SigningKey as DalekSigningKey, Verifier as _, VerifyingKey};
use thiserror::Error;
use trustmesh_core::types::{PublicKey, Signature};

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),
}

/// Sign `message` with an Ed25519 secret key (32 bytes).
pub fn sign(secret_key_bytes: &[u8], message: &[u8]) -> Result<Signature, SignatureError> {
    let arr: [u8; 32] = secret_key_bytes
        .try_into()
        .map_err(|_| SignatureError::InvalidSecretKey("expected 32 bytes".into()))?;
    let signing_key = DalekSigningKey::from_bytes(&arr);
    let sig = signing_key.sign(message);
    Ok(Signature(sig.to_bytes().to_vec()))
}

/// Verify a detached Ed25519 signature.
pub fn verify(
    public_key: &PublicKey,
    message: &[u8],
    signature: &Signature,
) -> Result<(), SignatureError> {
    let pk_arr: [u8; 32] = public_key
        .0
        .as_slice()
        .try_into()
        .map_err(|_| SignatureError::InvalidPublicKey("expected 32 bytes".into()))?;
    let verifying_key = VerifyingKey::from_bytes(&pk_arr)
        .map_err(|e| SignatureError::InvalidPublicKey(e.to_string()))?;
    let sig_arr: [u8; 64] = signature
        .0
        .as_slice()
        .try_into()
        .map_err(|_| SignatureError::InvalidSignature)?;
    let sig = ed25519_dalek::Signature::from_bytes(&sig_arr);
    verifying_key
        .verify(message, &sig)
        .map_err(|_| SignatureError::InvalidSignature)
}

/// Stateless signer used by the publisher when building a new envelope.
pub struct TrustMeshSigner {
    pub public_key: PublicKey,
    secret_key_bytes: zeroize::Zeroizing<[u8; 32]>,
}

impl TrustMeshSigner {
    pub fn from_secret_key_bytes(sk_bytes: [u8; 32]) -> Self {
        let signing_key = DalekSigningKey::from_bytes(&sk_bytes);
        let public_key = PublicKey(signing_key.verifying_key().to_bytes().to_vec());
        Self {
            public_key,
            secret_key_bytes: zeroize::Zeroizing::new(sk_bytes),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Result<Signature, SignatureError> {
        sign(&*self.secret_key_bytes, message)
    }
}
