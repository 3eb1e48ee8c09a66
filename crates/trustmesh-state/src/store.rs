use std::path::Path;

use trustmesh_core::{PayloadHash, SigningKeyResolver, Transaction, TxRef};
use trustmesh_dag::validate_transaction;

use crate::error::StateError;
use crate::subscription::{Event, EventKind, Subscriber, SubscriptionBus, SubscriptionId};
use crate::view::{WriteBatch, WriteLock};

/// Aggregate counters surfaced to the diagnostics aggregator (§4.6) and to
/// gossip's per-peer summaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    pub transaction_count: u64,
    pub payload_count: u64,
    pub head_count: u64,
}

/// Persistent DAG + payload store backed by sled (pure-Rust, no C/LLVM
/// toolchain dependency).
///
/// Named trees:
///   transactions          — ref bytes          → bincode(Transaction)
///   payloads              — payload_hash bytes → raw payload bytes
///   by_clock               — lc (8 BE) || ref   → [] (ordering index)
///   heads                  — ref bytes          → [] (membership set)
///   refs_by_payload_hash   — payload_hash || ref → [] (reverse index)
///   payload_jobs           — ref bytes          → bincode(PayloadJob)
///   meta                   — utf8 key bytes     → raw bytes
pub struct StateStore {
    _db: sled::Db,
    transactions: sled::Tree,
    payloads: sled::Tree,
    by_clock: sled::Tree,
    heads: sled::Tree,
    refs_by_payload_hash: sled::Tree,
    payload_jobs: sled::Tree,
    meta: sled::Tree,
    write_lock: WriteLock,
    subscriptions: SubscriptionBus,
}

/// A durable record of a still-missing payload, backing the gossip payload
/// scheduler (§4.3). Survives restart since it lives in the `payload_jobs`
/// tree rather than in memory.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PayloadJob {
    pub tx_ref: TxRef,
    pub payload_hash: PayloadHash,
    pub attempts: u32,
    pub next_attempt_at: i64,
}

impl StateStore {
    /// Open or create the state database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StateError> {
        let db = sled::open(path)?;
        let transactions = db.open_tree("transactions")?;
        let payloads = db.open_tree("payloads")?;
        let by_clock = db.open_tree("by_clock")?;
        let heads = db.open_tree("heads")?;
        let refs_by_payload_hash = db.open_tree("refs_by_payload_hash")?;
        let payload_jobs = db.open_tree("payload_jobs")?;
        let meta = db.open_tree("meta")?;
        tracing::info!("state store opened");
        Ok(Self {
            _db: db,
            transactions,
            payloads,
            by_clock,
            heads,
            refs_by_payload_hash,
            payload_jobs,
            meta,
            write_lock: WriteLock::default(),
            subscriptions: SubscriptionBus::new(),
        })
    }

    /// Enqueue (or refresh) a durable job to fetch a still-missing payload.
    pub fn enqueue_payload_job(&self, job: PayloadJob) -> Result<(), StateError> {
        let bytes = bincode::serialize(&job).map_err(|e| StateError::Serialization(e.to_string()))?;
        self.payload_jobs.insert(job.tx_ref.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn remove_payload_job(&self, tx_ref: &TxRef) -> Result<(), StateError> {
        self.payload_jobs.remove(tx_ref.as_bytes())?;
        Ok(())
    }

    pub fn list_payload_jobs(&self) -> Result<Vec<PayloadJob>, StateError> {
        let mut out = Vec::new();
        for item in self.payload_jobs.iter() {
            let (_, bytes) = item?;
            out.push(bincode::deserialize(&bytes).map_err(|e| StateError::Serialization(e.to_string()))?);
        }
        Ok(out)
    }

    /// Begin an explicit write batch. Only needed by callers that add more
    /// than one transaction as a unit; `add()` begins its own batch when
    /// none is supplied.
    pub fn begin_write(&self) -> WriteBatch<'_> {
        self.write_lock.begin()
    }

    pub fn subscribe(
        &self,
        event_kind: EventKind,
        payload_type: Option<String>,
        subscriber: Box<dyn Subscriber>,
    ) -> SubscriptionId {
        self.subscriptions
            .subscribe(event_kind, payload_type, subscriber)
    }

    /// Validate and append `tx` to the DAG, optionally persisting its
    /// payload in the same call. Idempotent: adding an already-present
    /// transaction is a silent no-op, never an error.
    ///
    /// `key_resolver` supplies the public key the envelope's signature is
    /// checked against; resolution happens before any persistent state is
    /// touched. When `payload` is `Some`, it is written under the same
    /// write-lock hold as the transaction itself and no payload-fetch job
    /// is ever enqueued for it — a caller that already has the bytes (the
    /// publisher, signing its own transaction) never leaves a window where
    /// the transaction is visible but its payload is still "missing".
    pub fn add(
        &self,
        tx: Transaction,
        key_resolver: &dyn SigningKeyResolver,
        payload: Option<Vec<u8>>,
        batch: Option<&WriteBatch<'_>>,
    ) -> Result<(), StateError> {
        if self.transactions.contains_key(tx.tx_ref.as_bytes())? {
            tracing::debug!(tx_ref = %tx.tx_ref, "duplicate add() ignored");
            return Ok(());
        }

        if let Some(data) = &payload {
            let computed = trustmesh_crypto::payload_hash(data);
            if computed != tx.payload_hash() {
                return Err(StateError::PayloadHashMismatch);
            }
        }

        let public_key = key_resolver
            .resolve(&tx.envelope.header.signing_key)
            .ok_or_else(|| {
                StateError::Storage("unable to resolve signing key for transaction".to_string())
            })?;

        let transactions = &self.transactions;
        validate_transaction(&tx, &public_key, |parent_ref| {
            transactions
                .get(parent_ref.as_bytes())
                .ok()
                .flatten()
                .and_then(|bytes| bincode::deserialize::<Transaction>(&bytes).ok())
                .map(|parent| parent.lamport_clock())
        })?;

        let _local_batch;
        let _batch_ref = match batch {
            Some(b) => b,
            None => {
                _local_batch = self.begin_write();
                &_local_batch
            }
        };

        let tx_bytes =
            bincode::serialize(&tx).map_err(|e| StateError::Serialization(e.to_string()))?;
        self.transactions.insert(tx.tx_ref.as_bytes(), tx_bytes)?;

        let mut clock_key = tx.lamport_clock().to_be_bytes().to_vec();
        clock_key.extend_from_slice(tx.tx_ref.as_bytes());
        self.by_clock.insert(clock_key, b"".as_ref())?;

        let mut ph_key = tx.payload_hash().as_bytes().to_vec();
        ph_key.extend_from_slice(tx.tx_ref.as_bytes());
        self.refs_by_payload_hash.insert(ph_key, b"".as_ref())?;

        for parent_ref in tx.prev() {
            self.heads.remove(parent_ref.as_bytes())?;
        }
        self.heads.insert(tx.tx_ref.as_bytes(), b"".as_ref())?;

        if payload.is_none() && !self.is_payload_present(&tx.payload_hash()) {
            self.enqueue_payload_job(PayloadJob {
                tx_ref: tx.tx_ref,
                payload_hash: tx.payload_hash(),
                attempts: 0,
                next_attempt_at: 0,
            })?;
        }

        // Dispatched after the tree writes rather than inside a rolled-back
        // transaction: sled trees are written directly above, sequentially,
        // rather than through sled's own multi-tree transaction API. A
        // subscriber veto here is surfaced to the
        // caller but does not un-write the tx — document any subscriber
        // that must see a fully consistent or fully absent transaction as
        // needing its own compensating check.
        self.subscriptions
            .dispatch_blocking(&Event::TransactionAdded(tx.clone()))
            .map_err(|e| {
                tracing::error!(tx_ref = %tx.tx_ref, error = %e, "subscriber rejected TransactionAdded");
                e
            })?;

        if let Some(data) = payload {
            self.write_payload(tx.payload_hash(), tx.payload_type().to_string(), data)?;
        }

        tracing::debug!(tx_ref = %tx.tx_ref, lc = tx.lamport_clock(), "transaction added");
        Ok(())
    }

    pub fn get_tx(&self, tx_ref: &TxRef) -> Result<Option<Transaction>, StateError> {
        match self.transactions.get(tx_ref.as_bytes())? {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| StateError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn is_present(&self, tx_ref: &TxRef) -> bool {
        self.transactions.contains_key(tx_ref.as_bytes()).unwrap_or(false)
    }

    /// List every transaction with Lamport clock in `[from, to)`, ordered by
    /// clock then ref.
    pub fn list_between(&self, from: u64, to: u64) -> Result<Vec<Transaction>, StateError> {
        let mut out = Vec::new();
        let lower = from.to_be_bytes();
        let upper = to.to_be_bytes();
        for item in self.by_clock.range(lower.to_vec()..upper.to_vec()) {
            let (key, _) = item?;
            let tx_ref_bytes = &key[8..];
            let mut arr = [0u8; 32];
            arr.copy_from_slice(tx_ref_bytes);
            let tx_ref = TxRef::from_bytes(arr);
            if let Some(tx) = self.get_tx(&tx_ref)? {
                out.push(tx);
            }
        }
        Ok(out)
    }

    /// Walk every transaction in clock order, calling `visitor` for each.
    /// Stops early if `visitor` returns `false`.
    pub fn walk<F>(&self, mut visitor: F) -> Result<(), StateError>
    where
        F: FnMut(&Transaction) -> bool,
    {
        for item in self.by_clock.iter() {
            let (key, _) = item?;
            let mut arr = [0u8; 32];
            arr.copy_from_slice(&key[8..]);
            let tx_ref = TxRef::from_bytes(arr);
            if let Some(tx) = self.get_tx(&tx_ref)? {
                if !visitor(&tx) {
                    break;
                }
            }
        }
        Ok(())
    }

    pub fn heads(&self) -> Result<Vec<TxRef>, StateError> {
        let mut out = Vec::new();
        for item in self.heads.iter() {
            let (key, _) = item?;
            let mut arr = [0u8; 32];
            arr.copy_from_slice(&key);
            out.push(TxRef::from_bytes(arr));
        }
        Ok(out)
    }

    pub fn is_payload_present(&self, payload_hash: &PayloadHash) -> bool {
        self.payloads
            .contains_key(payload_hash.as_bytes())
            .unwrap_or(false)
    }

    pub fn read_payload(&self, payload_hash: &PayloadHash) -> Result<Option<Vec<u8>>, StateError> {
        Ok(self.payloads.get(payload_hash.as_bytes())?.map(|v| v.to_vec()))
    }

    /// Store a payload's bytes. Rejects a mismatch between `payload_hash`
    /// and the hash of `data` (the caller is expected to have already
    /// checked this against the owning transaction's header, but the store
    /// re-verifies since this is also reachable from gossip's untrusted
    /// input path).
    pub fn write_payload(
        &self,
        payload_hash: PayloadHash,
        payload_type: String,
        data: Vec<u8>,
    ) -> Result<(), StateError> {
        let computed = trustmesh_crypto::payload_hash(&data);
        if computed != payload_hash {
            return Err(StateError::PayloadHashMismatch);
        }
        self.payloads.insert(payload_hash.as_bytes(), data)?;
        for tx_ref in self.refs_for_payload_hash(&payload_hash)? {
            self.remove_payload_job(&tx_ref)?;
        }
        self.subscriptions.dispatch_lossy(&Event::PayloadAdded {
            payload_hash,
            payload_type,
        });
        tracing::debug!(payload_hash = %payload_hash, "payload written");
        Ok(())
    }

    /// Refs of transactions whose header commits to `payload_hash` — used
    /// by gossip to find which transaction(s) a newly-arrived payload
    /// belongs to.
    pub fn refs_for_payload_hash(&self, payload_hash: &PayloadHash) -> Result<Vec<TxRef>, StateError> {
        let mut out = Vec::new();
        for item in self.refs_by_payload_hash.scan_prefix(payload_hash.as_bytes()) {
            let (key, _) = item?;
            let mut arr = [0u8; 32];
            arr.copy_from_slice(&key[32..]);
            out.push(TxRef::from_bytes(arr));
        }
        Ok(out)
    }

    pub fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StateError> {
        self.meta.insert(key.as_bytes(), value)?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StateError> {
        Ok(self.meta.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    pub fn statistics(&self) -> Statistics {
        Statistics {
            transaction_count: self.transactions.len() as u64,
            payload_count: self.payloads.len() as u64,
            head_count: self.heads.len() as u64,
        }
    }

    pub fn flush(&self) -> Result<(), StateError> {
        self._db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn temp_store() -> (tempfile::TempDir, StateStore) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = StateStore::open(dir.path()).expect("open state store");
    (dir, store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustmesh_core::transaction::{Envelope, Header, SigningKey};
    use trustmesh_core::InlineOnlyResolver;
    use trustmesh_crypto::SigningKeyPair;

    fn signed_tx(kp: &SigningKeyPair, prev: Vec<TxRef>, lc: u64, payload: &[u8]) -> Transaction {
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
        Transaction::from_envelope(Envelope { header, signature }).unwrap()
    }

    #[test]
    fn add_root_and_child_updates_heads() {
        let (_dir, store) = temp_store();
        let kp = SigningKeyPair::generate();
        let resolver = InlineOnlyResolver;

        let root = signed_tx(&kp, vec![], 0, b"root");
        store.add(root.clone(), &resolver, None, None).unwrap();
        assert_eq!(store.heads().unwrap(), vec![root.tx_ref]);

        let child = signed_tx(&kp, vec![root.tx_ref], 1, b"child");
        store.add(child.clone(), &resolver, None, None).unwrap();
        assert_eq!(store.heads().unwrap(), vec![child.tx_ref]);
    }

    #[test]
    fn duplicate_add_is_idempotent() {
        let (_dir, store) = temp_store();
        let kp = SigningKeyPair::generate();
        let resolver = InlineOnlyResolver;
        let root = signed_tx(&kp, vec![], 0, b"root");
        store.add(root.clone(), &resolver, None, None).unwrap();
        store.add(root.clone(), &resolver, None, None).unwrap();
        assert_eq!(store.statistics().transaction_count, 1);
    }

    #[test]
    fn additional_prev_missing_fails() {
        let (_dir, store) = temp_store();
        let kp = SigningKeyPair::generate();
        let resolver = InlineOnlyResolver;
        let missing = TxRef::from_bytes([7u8; 32]);
        let tx = signed_tx(&kp, vec![missing], 1, b"payload");
        let result = store.add(tx, &resolver, None, None);
        assert!(result.is_err());
    }

    #[test]
    fn add_with_payload_persists_both_atomically_and_skips_job() {
        let (_dir, store) = temp_store();
        let kp = SigningKeyPair::generate();
        let resolver = InlineOnlyResolver;
        let payload = b"root doc".to_vec();
        let root = signed_tx(&kp, vec![], 0, &payload);

        store.add(root.clone(), &resolver, Some(payload.clone()), None).unwrap();

        assert!(store.is_payload_present(&root.payload_hash()));
        assert_eq!(store.read_payload(&root.payload_hash()).unwrap(), Some(payload));
        assert!(store.list_payload_jobs().unwrap().is_empty());
    }

    #[test]
    fn add_with_mismatched_payload_is_rejected_and_not_stored() {
        let (_dir, store) = temp_store();
        let kp = SigningKeyPair::generate();
        let resolver = InlineOnlyResolver;
        let root = signed_tx(&kp, vec![], 0, b"expected payload");

        let result = store.add(root.clone(), &resolver, Some(b"wrong bytes".to_vec()), None);
        assert!(matches!(result, Err(StateError::PayloadHashMismatch)));
        assert!(!store.is_present(&root.tx_ref));
    }

    #[test]
    fn write_payload_hash_mismatch_rejected() {
        let (_dir, store) = temp_store();
        let wrong_hash = trustmesh_crypto::payload_hash(b"other bytes");
        let result = store.write_payload(wrong_hash, "application/did+json".into(), b"payload".to_vec());
        assert!(matches!(result, Err(StateError::PayloadHashMismatch)));
    }

    #[test]
    fn payload_round_trip() {
        let (_dir, store) = temp_store();
        let data = b"a did document".to_vec();
        let hash = trustmesh_crypto::payload_hash(&data);
        store
            .write_payload(hash, "application/did+json".into(), data.clone())
            .unwrap();
        assert!(store.is_payload_present(&hash));
        assert_eq!(store.read_payload(&hash).unwrap(), Some(data));
    }

    #[test]
    fn transaction_added_subscriber_can_abort_batch() {
        let (_dir, store) = temp_store();
        let kp = SigningKeyPair::generate();
        let resolver = InlineOnlyResolver;

        store.subscribe(
            EventKind::TransactionAdded,
            None,
            Box::new(|_event: &Event| -> Result<(), StateError> {
                Err(StateError::SubscriberFailed("rejecting all transactions".into()))
            }),
        );

        let root = signed_tx(&kp, vec![], 0, b"root");
        let result = store.add(root.clone(), &resolver, None, None);
        assert!(result.is_err());
    }
}
