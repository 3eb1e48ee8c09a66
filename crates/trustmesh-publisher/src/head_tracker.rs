use std::collections::HashSet;
use std::sync::Mutex;

use trustmesh_core::TxRef;
use trustmesh_state::{Event, EventKind, StateError, StateStore, Subscriber};

/// Maintains the local set of DAG heads, kept current by subscribing to
/// `TransactionAdded` (§4.2). Reading heads from here avoids a store scan
/// on every `create_transaction` call.
pub struct HeadTracker {
    heads: Mutex<HashSet<TxRef>>,
}

impl HeadTracker {
    /// Seed from the store's current head set and register for updates.
    /// The returned `Arc` must outlive the subscription, since the store
    /// only holds a `Box<dyn Subscriber>` built from it.
    pub fn attach(store: &StateStore) -> std::sync::Arc<Self> {
        let initial = store.heads().unwrap_or_default();
        let tracker = std::sync::Arc::new(Self {
            heads: Mutex::new(initial.into_iter().collect()),
        });

        let subscriber_tracker = tracker.clone();
        store.subscribe(
            EventKind::TransactionAdded,
            None,
            Box::new(move |event: &Event| -> Result<(), StateError> {
                if let Event::TransactionAdded(tx) = event {
                    let mut heads = subscriber_tracker
                        .heads
                        .lock()
                        .expect("head tracker lock poisoned");
                    for parent in tx.prev() {
                        heads.remove(parent);
                    }
                    heads.insert(tx.tx_ref);
                }
                Ok(())
            }),
        );

        tracker
    }

    pub fn current(&self) -> Vec<TxRef> {
        self.heads
            .lock()
            .expect("head tracker lock poisoned")
            .iter()
            .copied()
            .collect()
    }
}
