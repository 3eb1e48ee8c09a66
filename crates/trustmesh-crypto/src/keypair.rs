use ed25519_dalek::SigningKey as DalekSigningKey;
use rand::rngs::OsRng;
use trustmesh_core::types::PublicKey;

/// A node's Ed25519 signing keypair. The secret key is zeroized on drop and
/// never appears in `Debug` output.
pub struct SigningKeyPair {
    pub public_key: PublicKey,
    secret_key: [u8; 32],
}

impl SigningKeyPair {
    pub fn generate() -> Self {
        let signing_key = DalekSigningKey::generate(&mut OsRng);
        Self::from_raw(signing_key.to_bytes())
    }

    pub fn from_raw(secret_key: [u8; 32]) -> Self {
        let signing_key = DalekSigningKey::from_bytes(&secret_key);
        let public_key = PublicKey(signing_key.verifying_key().to_bytes().to_vec());
        Self {
            public_key,
            secret_key,
        }
    }

    pub fn signer(&self) -> crate::signing::TrustMeshSigner {
        crate::signing::TrustMeshSigner::from_secret_key_bytes(self.secret_key)
    }

    pub fn secret_key_bytes(&self) -> &[u8; 32] {
        &self.secret_key
    }
}

impl Drop for SigningKeyPair {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.secret_key.zeroize();
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKeyPair {{ public_key: {:?} }}", self.public_key)
    }
}

/// A node's X25519 key-agreement keypair, used for PAL encryption/decryption
/// (§3, §6). Distinct from the signing keypair above since Ed25519 signing
/// keys are not directly usable for ECDH.
pub struct AgreementKeyPair {
    pub public_key: PublicKey,
    secret_key: x25519_dalek::StaticSecret,
}

impl AgreementKeyPair {
    pub fn generate() -> Self {
        let secret_key = x25519_dalek::StaticSecret::random_from_rng(OsRng);
        let public_key = PublicKey(
            x25519_dalek::PublicKey::from(&secret_key)
                .as_bytes()
                .to_vec(),
        );
        Self {
            public_key,
            secret_key,
        }
    }

    pub fn from_raw(secret_key_bytes: [u8; 32]) -> Self {
        let secret_key = x25519_dalek::StaticSecret::from(secret_key_bytes);
        let public_key = PublicKey(
            x25519_dalek::PublicKey::from(&secret_key)
                .as_bytes()
                .to_vec(),
        );
        Self {
            public_key,
            secret_key,
        }
    }

    pub fn secret(&self) -> &x25519_dalek::StaticSecret {
        &self.secret_key
    }
}

impl std::fmt::Debug for AgreementKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AgreementKeyPair {{ public_key: {:?} }}", self.public_key)
    }
}
