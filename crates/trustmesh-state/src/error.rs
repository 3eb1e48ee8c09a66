use thiserror::Error;
use trustmesh_core::ErrorCategory;
use trustmesh_dag::DagError;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("transaction is invalid: {0}")]
    InvalidTransaction(#[from] DagError),

    #[error("payload does not match transaction's committed payload hash")]
    PayloadHashMismatch,

    #[error("transaction already present: {0}")]
    AlreadyPresent(trustmesh_core::TxRef),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("subscriber rejected the event: {0}")]
    SubscriberFailed(String),
}

impl StateError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            StateError::InvalidTransaction(_) | StateError::PayloadHashMismatch => {
                ErrorCategory::Validation
            }
            StateError::AlreadyPresent(_) => ErrorCategory::NotFound,
            StateError::Storage(_) => ErrorCategory::Transient,
            StateError::Serialization(_) => ErrorCategory::Validation,
            StateError::SubscriberFailed(_) => ErrorCategory::Transient,
        }
    }
}

impl From<sled::Error> for StateError {
    fn from(e: sled::Error) -> Self {
        StateError::Storage(e.to_string())
    }
}
