//! trustmesh-state
//!
//! Persistent DAG + payload store: validated transactions keyed by ref,
//! payloads keyed by hash, derived ordering/head indexes, and a
//! subscription bus for `TransactionAdded`/`PayloadAdded` events.

pub mod error;
pub mod store;
pub mod subscription;
pub mod view;

pub use error::StateError;
pub use store::{PayloadJob, StateStore, Statistics};
pub use subscription::{Event, EventKind, Subscriber, SubscriptionBus, SubscriptionId};
pub use view::WriteBatch;
