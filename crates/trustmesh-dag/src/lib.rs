//! trustmesh-dag
//!
//! Validation of a transaction's place in the DAG: parent residency, Lamport
//! clock correctness, ref integrity, and signature verification. Does not
//! own storage — that's `trustmesh-state`.

pub mod validation;

pub use validation::{validate_transaction, DagError};
