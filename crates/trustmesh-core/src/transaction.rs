use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{LamportClock, PayloadHash, PublicKey, Signature, Timestamp, TxRef};

/// Identifies the signing key of a transaction: either a reference to a key
/// already known to the verifier (`kid`, typically a DID URL fragment) or an
/// inlined public key, for keys a verifier may not have resolved yet.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum SigningKey {
    Kid(String),
    Jwk(PublicKey),
}

/// A single recipient's encrypted share of the Participant Access List: the
/// PAL plaintext encrypted to one recipient's key-agreement key via
/// ECDH-ES. Absent entirely for public transactions.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PalEntry {
    /// DID of the intended recipient, carried alongside the ciphertext so a
    /// peer can find "its" entry without attempting decryption on every one.
    pub recipient: crate::types::Did,
    /// Ephemeral public key used for this entry's ECDH-ES key agreement.
    pub ephemeral_public_key: PublicKey,
    /// AEAD ciphertext of the PAL plaintext (the list of all recipient DIDs).
    pub ciphertext: Vec<u8>,
    /// AEAD nonce.
    pub nonce: Vec<u8>,
}

/// Encrypted Participant Access List: one [`PalEntry`] per authorized
/// recipient. An empty list never appears on the wire — its absence (`None`
/// on [`Envelope::pal`]) means the transaction is public.
pub type Pal = Vec<PalEntry>;

/// The plaintext a [`PalEntry`] decrypts to: the full list of DIDs allowed
/// to read the transaction's payload.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PalPlaintext {
    pub recipients: Vec<crate::types::Did>,
}

impl PalPlaintext {
    pub fn contains(&self, did: &crate::types::Did) -> bool {
        self.recipients.iter().any(|r| r == did)
    }
}

/// The fields covered by the transaction's signature. Kept as its own type
/// (rather than inlined into [`Envelope`]) so the signing/verification
/// payload is unambiguous and stable independent of how the signature
/// itself is carried.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    /// MIME-like identifier for the payload's shape, e.g.
    /// `"application/did+json"`.
    pub payload_type: String,
    /// SHA-256 of the (separately stored) payload bytes.
    pub payload_hash: PayloadHash,
    /// References to parent transactions. Empty only for a root transaction.
    pub prev: Vec<TxRef>,
    /// Lamport clock: 0 for root, else 1 + max(parents' clocks).
    pub lc: LamportClock,
    /// Unix seconds at signing time.
    pub sig_t: Timestamp,
    /// Identifies the signing key.
    pub signing_key: SigningKey,
    /// Encrypted access list, absent for public transactions.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pal: Option<Pal>,
}

impl Header {
    /// Canonical bytes covered by the signature. The signature itself, and
    /// the outer ref, are deliberately excluded — this is the "detached"
    /// payload of the envelope.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, CoreError> {
        bincode::serialize(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}

/// A signed transaction: header plus the detached signature over its bytes.
/// `ref` is not stored on the struct — it is always recomputed from the
/// envelope bytes via [`Envelope::compute_ref`] so it can never drift from
/// its content.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    pub header: Header,
    pub signature: Signature,
}

impl Envelope {
    /// Canonical bytes of the full signed envelope (header + signature).
    /// This is what `ref` is computed over.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CoreError> {
        bincode::serialize(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    /// Content address of this envelope: SHA-256 over its canonical bytes.
    pub fn compute_ref(&self) -> Result<TxRef, CoreError> {
        let bytes = self.canonical_bytes()?;
        Ok(TxRef::from_bytes(trustmesh_sha256(&bytes)))
    }

    pub fn is_root(&self) -> bool {
        self.header.prev.is_empty()
    }

    pub fn is_private(&self) -> bool {
        self.header.pal.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// Validate the structural invariants from §3 that don't require access
    /// to the rest of the DAG (those live in `trustmesh-dag`).
    pub fn validate_shape(&self) -> Result<(), CoreError> {
        if self.header.prev.is_empty() && self.header.lc != 0 {
            return Err(CoreError::ClockMismatch {
                expected: 0,
                got: self.header.lc,
            });
        }
        if self.header.payload_type.is_empty() {
            return Err(CoreError::MissingHeader("payload_type"));
        }
        Ok(())
    }
}

/// A transaction together with its addressable reference, as stored and
/// exchanged after validation. Combining the two here avoids recomputing
/// the ref on every read.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub envelope: Envelope,
    pub tx_ref: TxRef,
}

impl Transaction {
    /// Build a `Transaction` from a signed envelope, verifying that the
    /// supplied ref matches the recomputed digest.
    pub fn from_envelope(envelope: Envelope) -> Result<Self, CoreError> {
        let tx_ref = envelope.compute_ref()?;
        Ok(Self { envelope, tx_ref })
    }

    pub fn prev(&self) -> &[TxRef] {
        &self.envelope.header.prev
    }

    pub fn lamport_clock(&self) -> LamportClock {
        self.envelope.header.lc
    }

    pub fn payload_hash(&self) -> PayloadHash {
        self.envelope.header.payload_hash
    }

    pub fn payload_type(&self) -> &str {
        &self.envelope.header.payload_type
    }

    pub fn is_root(&self) -> bool {
        self.envelope.is_root()
    }

    pub fn is_private(&self) -> bool {
        self.envelope.is_private()
    }

    pub fn pal(&self) -> Option<&Pal> {
        self.envelope.header.pal.as_ref()
    }
}

/// Computes the expected Lamport clock for a new transaction given its
/// parents' clocks (§3).
pub fn next_lamport_clock(parent_clocks: &[LamportClock]) -> LamportClock {
    match parent_clocks.iter().max() {
        Some(max) => max + 1,
        None => 0,
    }
}

fn trustmesh_sha256(bytes: &[u8]) -> [u8; 32] {
    use sha2::{Digest as _, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let out = hasher.finalize();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&out);
    arr
}
