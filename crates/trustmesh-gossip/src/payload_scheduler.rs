//! Durable payload-fetch scheduler, driven off the `payload_jobs` tree that
//! `StateStore::add()` populates automatically (§4.3). Backoff shape mirrors
//! the connection manager's outbound connector (§4.4) for consistency, not
//! because the two share an implementation.

use std::time::Duration;

use rand::Rng;
use trustmesh_core::{Did, TxRef};
use trustmesh_state::{PayloadJob, StateError, StateStore};

const BASE_DELAY_MS: u64 = 2_000;
const MAX_DELAY_MS: u64 = 300_000;
const MAX_SHIFT: u32 = 16;

/// Capped exponential backoff with jitter. Stateless across restarts by
/// design — a job's `attempts` counter (persisted in `PayloadJob`) is what
/// lets the scheduler resume at the right delay after a restart.
pub struct Backoff {
    attempt: u32,
}

impl Backoff {
    pub fn from_attempt(attempt: u32) -> Self {
        Self { attempt }
    }

    /// Duration to wait before the next attempt, then advances the counter.
    pub fn next_delay(&mut self) -> Duration {
        let shift = self.attempt.min(MAX_SHIFT);
        let exp = BASE_DELAY_MS.saturating_mul(1u64 << shift);
        let capped = exp.min(MAX_DELAY_MS);
        self.attempt = self.attempt.saturating_add(1);
        let jitter: f64 = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_millis(((capped as f64) * jitter) as u64)
    }
}

/// Narrow seam onto the connection manager's peer table, so this crate
/// doesn't need to depend on `trustmesh-transport`.
pub trait PeerSource: Send + Sync {
    fn random_ready_peer(&self) -> Option<Did>;
}

/// Narrow seam for dispatching a query onto an authenticated session.
pub trait PayloadQuerySender: Send + Sync {
    fn send_transaction_payload_query(&self, peer: &Did, tx_ref: TxRef);
}

/// Drains due jobs from the durable queue on each `tick()`, asking a random
/// ready peer for the payload and rescheduling with backoff. A job is
/// removed from the queue by `StateStore::write_payload()` once the payload
/// actually arrives, not by this scheduler.
pub struct PayloadScheduler<'a> {
    store: &'a StateStore,
}

impl<'a> PayloadScheduler<'a> {
    pub fn new(store: &'a StateStore) -> Self {
        Self { store }
    }

    /// Process every job whose `next_attempt_at` has elapsed. `now` is
    /// supplied by the caller (unix seconds) rather than read internally, so
    /// this stays deterministic and testable.
    pub fn tick(
        &self,
        now: i64,
        peers: &dyn PeerSource,
        sender: &dyn PayloadQuerySender,
    ) -> Result<usize, StateError> {
        let mut dispatched = 0;
        for job in self.store.list_payload_jobs()? {
            if job.next_attempt_at > now {
                continue;
            }
            let Some(peer) = peers.random_ready_peer() else {
                tracing::debug!("no ready peer available to request missing payload");
                break;
            };

            sender.send_transaction_payload_query(&peer, job.tx_ref);
            let mut backoff = Backoff::from_attempt(job.attempts);
            let delay = backoff.next_delay();
            self.store.enqueue_payload_job(PayloadJob {
                tx_ref: job.tx_ref,
                payload_hash: job.payload_hash,
                attempts: job.attempts + 1,
                next_attempt_at: now + delay.as_secs() as i64,
            })?;
            tracing::debug!(tx_ref = %job.tx_ref, peer = %peer, attempt = job.attempts + 1, "requested missing payload");
            dispatched += 1;
        }
        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use trustmesh_core::PayloadHash;

    fn temp_store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        (dir, store)
    }

    struct OnePeer(Did);
    impl PeerSource for OnePeer {
        fn random_ready_peer(&self) -> Option<Did> {
            Some(self.0.clone())
        }
    }

    struct NoPeers;
    impl PeerSource for NoPeers {
        fn random_ready_peer(&self) -> Option<Did> {
            None
        }
    }

    struct RecordingSender {
        sent: RefCell<VecDeque<(Did, TxRef)>>,
    }
    impl PayloadQuerySender for RecordingSender {
        fn send_transaction_payload_query(&self, peer: &Did, tx_ref: TxRef) {
            self.sent.borrow_mut().push_back((peer.clone(), tx_ref));
        }
    }

    #[test]
    fn due_job_is_dispatched_and_rescheduled() {
        let (_dir, store) = temp_store();
        let tx_ref = TxRef::from_bytes([1u8; 32]);
        store
            .enqueue_payload_job(PayloadJob {
                tx_ref,
                payload_hash: PayloadHash::from_bytes([2u8; 32]),
                attempts: 0,
                next_attempt_at: 0,
            })
            .unwrap();

        let scheduler = PayloadScheduler::new(&store);
        let peer = OnePeer(Did::from("did:trustmesh:peer"));
        let sender = RecordingSender { sent: RefCell::new(VecDeque::new()) };

        let dispatched = scheduler.tick(1_000, &peer, &sender).unwrap();
        assert_eq!(dispatched, 1);
        assert_eq!(sender.sent.borrow().len(), 1);

        let jobs = store.list_payload_jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].attempts, 1);
        assert!(jobs[0].next_attempt_at > 1_000);
    }

    #[test]
    fn not_yet_due_job_is_skipped() {
        let (_dir, store) = temp_store();
        let tx_ref = TxRef::from_bytes([3u8; 32]);
        store
            .enqueue_payload_job(PayloadJob {
                tx_ref,
                payload_hash: PayloadHash::from_bytes([4u8; 32]),
                attempts: 0,
                next_attempt_at: 5_000,
            })
            .unwrap();

        let scheduler = PayloadScheduler::new(&store);
        let peer = OnePeer(Did::from("did:trustmesh:peer"));
        let sender = RecordingSender { sent: RefCell::new(VecDeque::new()) };

        let dispatched = scheduler.tick(1_000, &peer, &sender).unwrap();
        assert_eq!(dispatched, 0);
    }

    #[test]
    fn no_ready_peer_defers_job() {
        let (_dir, store) = temp_store();
        let tx_ref = TxRef::from_bytes([5u8; 32]);
        store
            .enqueue_payload_job(PayloadJob {
                tx_ref,
                payload_hash: PayloadHash::from_bytes([6u8; 32]),
                attempts: 0,
                next_attempt_at: 0,
            })
            .unwrap();

        let scheduler = PayloadScheduler::new(&store);
        let sender = RecordingSender { sent: RefCell::new(VecDeque::new()) };
        let dispatched = scheduler.tick(1_000, &NoPeers, &sender).unwrap();
        assert_eq!(dispatched, 0);
        assert!(sender.sent.borrow().is_empty());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let mut backoff = Backoff::from_attempt(0);
        let first = backoff.next_delay();
        assert!(first.as_millis() >= (BASE_DELAY_MS as u128) / 2);

        let mut saturated = Backoff::from_attempt(30);
        let capped = saturated.next_delay();
        assert!(capped.as_millis() <= (MAX_DELAY_MS as u128) * 3 / 2);
    }
}
