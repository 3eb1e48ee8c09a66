use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

/// Lamport logical clock value. `0` is reserved for root transactions.
pub type LamportClock = u64;

/// A 32-byte SHA-256 digest, used both as a transaction reference and as a
/// payload hash. The two are kept as distinct newtypes below so the type
/// system catches a ref/hash mix-up at compile time.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes[..32]);
        Ok(Self(arr))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}…", &self.to_hex()[..16])
    }
}

/// Content-address of a signed transaction envelope: SHA-256 over the
/// canonical signed envelope bytes (§3).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxRef(pub Digest);

impl TxRef {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(Digest::from_bytes(b))
    }
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        Ok(Self(Digest::from_hex(s)?))
    }
    /// The all-zero ref, used as a sentinel for "absent" in wire messages.
    pub fn empty() -> Self {
        Self(Digest::from_bytes([0u8; 32]))
    }
    pub fn is_empty(&self) -> bool {
        self.0 .0 == [0u8; 32]
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxRef({:?})", self.0)
    }
}

/// SHA-256 of the payload bytes a transaction's envelope commits to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PayloadHash(pub Digest);

impl PayloadHash {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(Digest::from_bytes(b))
    }
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        Ok(Self(Digest::from_hex(s)?))
    }
}

impl fmt::Display for PayloadHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PayloadHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PayloadHash({:?})", self.0)
    }
}

/// A W3C DID string. Kept opaque here — parsing/resolution is the concern of
/// `trustmesh-identity`'s external collaborator contracts.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Did(pub String);

impl Did {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({})", self.0)
    }
}

impl From<String> for Did {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Did {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An Ed25519 public key, 32 bytes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(pub Vec<u8>);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}b)", self.0.len())
    }
}

/// A detached Ed25519 signature, 64 bytes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}b)", self.0.len())
    }
}
