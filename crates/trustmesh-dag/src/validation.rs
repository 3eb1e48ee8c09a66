use thiserror::Error;
use trustmesh_core::transaction::Transaction;
use trustmesh_core::types::{LamportClock, PublicKey, TxRef};

#[derive(Debug, Error)]
pub enum DagError {
    #[error("root transaction must have no previous references")]
    RootWithPrev,

    #[error("non-root transaction must reference at least one previous transaction")]
    MissingPrev,

    #[error("unknown previous transaction: {0}")]
    UnknownPrev(TxRef),

    #[error("lamport clock mismatch: expected {expected}, got {got}")]
    ClockMismatch { expected: u64, got: u64 },

    #[error("ref does not match recomputed digest of the envelope")]
    RefMismatch,

    #[error("invalid signature")]
    InvalidSignature,
}

/// Validate the structural and cryptographic invariants of a transaction
/// before it may be appended to the DAG (§3, §4.1). Balance/application
/// semantics of the payload itself are out of scope here — this only
/// validates the envelope and its place in the DAG.
///
/// `parent_clock` looks up the Lamport clock of an already-resident
/// transaction by ref; `None` means "not resident locally".
pub fn validate_transaction<F>(
    tx: &Transaction,
    public_key: &PublicKey,
    parent_clock: F,
) -> Result<(), DagError>
where
    F: Fn(&TxRef) -> Option<LamportClock>,
{
    let is_root = tx.prev().is_empty();

    if is_root {
        if tx.lamport_clock() != 0 {
            return Err(DagError::ClockMismatch {
                expected: 0,
                got: tx.lamport_clock(),
            });
        }
    } else {
        let mut parent_clocks = Vec::with_capacity(tx.prev().len());
        for parent_ref in tx.prev() {
            match parent_clock(parent_ref) {
                Some(clock) => parent_clocks.push(clock),
                None => return Err(DagError::UnknownPrev(*parent_ref)),
            }
        }
        let expected = trustmesh_core::transaction::next_lamport_clock(&parent_clocks);
        if expected != tx.lamport_clock() {
            return Err(DagError::ClockMismatch {
                expected,
                got: tx.lamport_clock(),
            });
        }
    }

    let expected_ref = tx
        .envelope
        .compute_ref()
        .map_err(|_| DagError::RefMismatch)?;
    if expected_ref != tx.tx_ref {
        return Err(DagError::RefMismatch);
    }

    let signing_bytes = tx
        .envelope
        .header
        .signing_bytes()
        .map_err(|_| DagError::InvalidSignature)?;
    trustmesh_crypto::verify(public_key, &signing_bytes, &tx.envelope.signature)
        .map_err(|_| DagError::InvalidSignature)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustmesh_core::transaction::{Envelope, Header, SigningKey};
    use trustmesh_crypto::SigningKeyPair;

    fn make_test_tx(
        kp: &SigningKeyPair,
        prev: Vec<TxRef>,
        lc: u64,
        payload: &[u8],
    ) -> Transaction {
        let header = Header {
            payload_type: "application/did+json".to_string(),
            payload_hash: trustmesh_crypto::payload_hash(payload),
            prev,
            lc,
            sig_t: 1_700_000_000,
            signing_key: SigningKey::Jwk(kp.public_key.clone()),
            pal: None,
        };
        let signing_bytes = header.signing_bytes().unwrap();
        let signature = kp.signer().sign(&signing_bytes).unwrap();
        let envelope = Envelope { header, signature };
        Transaction::from_envelope(envelope).unwrap()
    }

    #[test]
    fn valid_root_passes() {
        let kp = SigningKeyPair::generate();
        let tx = make_test_tx(&kp, vec![], 0, b"payload");
        assert!(validate_transaction(&tx, &kp.public_key, |_| None).is_ok());
    }

    #[test]
    fn root_with_nonzero_clock_fails() {
        let kp = SigningKeyPair::generate();
        let tx = make_test_tx(&kp, vec![], 1, b"payload");
        let result = validate_transaction(&tx, &kp.public_key, |_| None);
        assert!(matches!(result, Err(DagError::ClockMismatch { .. })));
    }

    #[test]
    fn non_root_missing_parent_fails() {
        let kp = SigningKeyPair::generate();
        let missing = TxRef::from_bytes([9u8; 32]);
        let tx = make_test_tx(&kp, vec![missing], 1, b"payload");
        let result = validate_transaction(&tx, &kp.public_key, |_| None);
        assert!(matches!(result, Err(DagError::UnknownPrev(_))));
    }

    #[test]
    fn clock_must_be_one_plus_max_parent() {
        let kp = SigningKeyPair::generate();
        let parent = TxRef::from_bytes([1u8; 32]);
        let tx = make_test_tx(&kp, vec![parent], 5, b"payload");
        let result = validate_transaction(&tx, &kp.public_key, |r| {
            if *r == parent {
                Some(2)
            } else {
                None
            }
        });
        assert!(matches!(result, Err(DagError::ClockMismatch { expected: 3, got: 5 })));
    }

    #[test]
    fn tampered_signature_fails() {
        let kp = SigningKeyPair::generate();
        let mut tx = make_test_tx(&kp, vec![], 0, b"payload");
        tx.envelope.signature.0[0] ^= 0xFF;
        tx.tx_ref = tx.envelope.compute_ref().unwrap();
        let result = validate_transaction(&tx, &kp.public_key, |_| None);
        assert!(matches!(result, Err(DagError::InvalidSignature)));
    }
}
