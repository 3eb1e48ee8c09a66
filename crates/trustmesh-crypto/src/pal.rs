//! Participant Access List encryption: ECDH-ES per recipient, as described
//! in §3/§6. Each [`PalEntry`] carries an ephemeral public key; the shared
//! secret from `ephemeral_secret * recipient_public` is run through HKDF to
//! derive a ChaCha20-Poly1305 key that encrypts the PAL plaintext (the full
//! list of recipient DIDs).

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use trustmesh_core::transaction::{PalEntry, PalPlaintext};
use trustmesh_core::types::{Did, PublicKey};

const HKDF_INFO: &[u8] = b"trustmesh-pal-v1";
const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum PalError {
    #[error("invalid recipient public key")]
    InvalidRecipientKey,
    #[error("invalid ephemeral public key")]
    InvalidEphemeralKey,
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("decryption failed")]
    DecryptionFailed,
}

/// Encrypt `plaintext` to a single recipient's X25519 public key, producing
/// one [`PalEntry`]. A fresh ephemeral keypair is generated per entry so
/// distinct recipients cannot link their entries via a shared ephemeral key.
pub fn encrypt_for_recipient(
    recipient_did: &Did,
    recipient_public_key: &PublicKey,
    plaintext: &PalPlaintext,
) -> Result<PalEntry, PalError> {
    let recipient_pk_bytes: [u8; 32] = recipient_public_key
        .0
        .as_slice()
        .try_into()
        .map_err(|_| PalError::InvalidRecipientKey)?;
    let recipient_pk = x25519_dalek::PublicKey::from(recipient_pk_bytes);

    let ephemeral_secret = x25519_dalek::EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = x25519_dalek::PublicKey::from(&ephemeral_secret);
    let shared_secret = ephemeral_secret.diffie_hellman(&recipient_pk);

    let key = derive_key(shared_secret.as_bytes());
    let cipher = ChaCha20Poly1305::new((&key).into());

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let plaintext_bytes =
        bincode::serialize(plaintext).map_err(|e| PalError::Serialization(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(nonce, plaintext_bytes.as_ref())
        .map_err(|_| PalError::DecryptionFailed)?;

    Ok(PalEntry {
        recipient: recipient_did.clone(),
        ephemeral_public_key: PublicKey(ephemeral_public.as_bytes().to_vec()),
        ciphertext,
        nonce: nonce_bytes.to_vec(),
    })
}

/// Attempt to decrypt one entry with our own X25519 secret key. Returns
/// `Ok(None)` when the entry was not meant for us (decryption failure is
/// the expected, non-error outcome per §3 — "first success wins, a
/// non-decryption is not itself an error").
pub fn try_decrypt(
    entry: &PalEntry,
    our_secret: &x25519_dalek::StaticSecret,
) -> Result<Option<PalPlaintext>, PalError> {
    let ephemeral_pk_bytes: [u8; 32] = entry
        .ephemeral_public_key
        .0
        .as_slice()
        .try_into()
        .map_err(|_| PalError::InvalidEphemeralKey)?;
    let ephemeral_pk = x25519_dalek::PublicKey::from(ephemeral_pk_bytes);
    let shared_secret = our_secret.diffie_hellman(&ephemeral_pk);
    let key = derive_key(shared_secret.as_bytes());
    let cipher = ChaCha20Poly1305::new((&key).into());

    if entry.nonce.len() != NONCE_LEN {
        return Ok(None);
    }
    let nonce = Nonce::from_slice(&entry.nonce);

    match cipher.decrypt(nonce, entry.ciphertext.as_ref()) {
        Ok(plaintext_bytes) => match bincode::deserialize::<PalPlaintext>(&plaintext_bytes) {
            Ok(plaintext) => Ok(Some(plaintext)),
            Err(_) => Ok(None),
        },
        Err(_) => Ok(None),
    }
}

/// Try every entry in a PAL against our secret key, returning the first one
/// that decrypts successfully.
pub fn decrypt_pal(
    entries: &[PalEntry],
    our_secret: &x25519_dalek::StaticSecret,
) -> Result<Option<PalPlaintext>, PalError> {
    for entry in entries {
        if let Some(plaintext) = try_decrypt(entry, our_secret)? {
            return Ok(Some(plaintext));
        }
    }
    Ok(None)
}

fn derive_key(shared_secret: &[u8]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, shared_secret);
    let mut key = [0u8; 32];
    hk.expand(HKDF_INFO, &mut key)
        .expect("32 bytes is a valid HKDF output length");
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustmesh_core::types::Did;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let recipient_secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
        let recipient_public =
            PublicKey(x25519_dalek::PublicKey::from(&recipient_secret).as_bytes().to_vec());
        let recipient_did = Did::from("did:trustmesh:recipient");

        let plaintext = PalPlaintext {
            recipients: vec![recipient_did.clone()],
        };

        let entry =
            encrypt_for_recipient(&recipient_did, &recipient_public, &plaintext).unwrap();
        let decrypted = try_decrypt(&entry, &recipient_secret).unwrap().unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn wrong_key_does_not_decrypt() {
        let recipient_secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
        let recipient_public =
            PublicKey(x25519_dalek::PublicKey::from(&recipient_secret).as_bytes().to_vec());
        let recipient_did = Did::from("did:trustmesh:recipient");
        let plaintext = PalPlaintext {
            recipients: vec![recipient_did.clone()],
        };
        let entry =
            encrypt_for_recipient(&recipient_did, &recipient_public, &plaintext).unwrap();

        let other_secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
        let result = try_decrypt(&entry, &other_secret).unwrap();
        assert!(result.is_none());
    }
}
