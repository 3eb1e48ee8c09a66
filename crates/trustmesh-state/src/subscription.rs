use std::sync::{Mutex, RwLock};

use trustmesh_core::{PayloadHash, Transaction};

use crate::error::StateError;

/// The two kinds of event a subscriber can register interest in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    TransactionAdded,
    PayloadAdded,
}

/// An event dispatched to subscribers.
#[derive(Clone, Debug)]
pub enum Event {
    TransactionAdded(Transaction),
    PayloadAdded {
        payload_hash: PayloadHash,
        payload_type: String,
    },
}

impl Event {
    fn kind(&self) -> EventKind {
        match self {
            Event::TransactionAdded(_) => EventKind::TransactionAdded,
            Event::PayloadAdded { .. } => EventKind::PayloadAdded,
        }
    }

    fn payload_type(&self) -> &str {
        match self {
            Event::TransactionAdded(tx) => tx.payload_type(),
            Event::PayloadAdded { payload_type, .. } => payload_type,
        }
    }
}

/// A subscriber's receive callback. `TransactionAdded` subscribers are
/// invoked synchronously inside the write batch that created the
/// transaction (§4.1) — returning `Err` aborts that batch. `PayloadAdded`
/// subscribers' errors are logged and swallowed (§4.1 design note).
pub trait Subscriber: Send + Sync {
    fn receive(&self, event: &Event) -> Result<(), StateError>;
}

impl<F> Subscriber for F
where
    F: Fn(&Event) -> Result<(), StateError> + Send + Sync,
{
    fn receive(&self, event: &Event) -> Result<(), StateError> {
        self(event)
    }
}

struct Registration {
    event_kind: EventKind,
    /// `None` means "any payload type" (wildcard).
    payload_type: Option<String>,
    subscriber: Box<dyn Subscriber>,
}

/// Dispatches [`Event`]s to registered subscribers filtered by
/// `(event_kind, payload_type)`.
#[derive(Default)]
pub struct SubscriptionBus {
    registrations: RwLock<Vec<Registration>>,
    next_id: Mutex<u64>,
}

/// Opaque handle returned by [`SubscriptionBus::subscribe`]; currently
/// unused for unsubscription but kept distinct from a bare index so callers
/// don't rely on registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubscriptionId(u64);

impl SubscriptionBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        event_kind: EventKind,
        payload_type: Option<String>,
        subscriber: Box<dyn Subscriber>,
    ) -> SubscriptionId {
        let mut id_guard = self.next_id.lock().expect("subscription id lock poisoned");
        let id = *id_guard;
        *id_guard += 1;
        drop(id_guard);

        self.registrations
            .write()
            .expect("subscription registrations lock poisoned")
            .push(Registration {
                event_kind,
                payload_type,
                subscriber,
            });
        SubscriptionId(id)
    }

    /// Dispatch `event` to every matching subscriber, synchronously,
    /// returning the first error. Used for `TransactionAdded` so the
    /// caller's write batch can abort on a subscriber's objection.
    pub fn dispatch_blocking(&self, event: &Event) -> Result<(), StateError> {
        let registrations = self
            .registrations
            .read()
            .expect("subscription registrations lock poisoned");
        for reg in registrations.iter() {
            if !matches(reg, event) {
                continue;
            }
            reg.subscriber.receive(event)?;
        }
        Ok(())
    }

    /// Dispatch `event` to every matching subscriber, logging (but not
    /// propagating) any error. Used for `PayloadAdded`.
    pub fn dispatch_lossy(&self, event: &Event) {
        let registrations = self
            .registrations
            .read()
            .expect("subscription registrations lock poisoned");
        for reg in registrations.iter() {
            if !matches(reg, event) {
                continue;
            }
            if let Err(e) = reg.subscriber.receive(event) {
                tracing::warn!(error = %e, "subscriber failed handling event");
            }
        }
    }
}

fn matches(reg: &Registration, event: &Event) -> bool {
    if reg.event_kind != event.kind() {
        return false;
    }
    match &reg.payload_type {
        None => true,
        Some(wanted) => wanted == event.payload_type(),
    }
}
