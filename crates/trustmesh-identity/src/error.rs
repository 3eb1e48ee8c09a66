use thiserror::Error;
use trustmesh_core::{Did, ErrorCategory};

/// Deficiencies found while configuring or validating local node identity
/// (§4.5). Each variant names exactly what's missing so the node can fail
/// loudly and specifically at startup rather than limping along unauthenticated.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("no local DID found to use as node identity")]
    NoLocalDidFound,

    #[error("configured node DID {0} does not resolve to a document")]
    DidNotFound(Did),

    #[error("node DID {0} is deactivated")]
    DidDeactivated(Did),

    #[error("node DID {0} has no keyAgreement verification method")]
    MissingKeyAgreement(Did),

    #[error("private key for node DID {0}'s keyAgreement is not present in the key store")]
    PrivateKeyMissing(Did),

    #[error("node DID {0} has no NutsComm service")]
    MissingNutsCommService(Did),

    #[error("NutsComm endpoint {0:?} is not a valid grpc://host:port URL")]
    InvalidNutsCommEndpoint(String),

    #[error("document resolution failed: {0}")]
    ResolutionFailed(String),
}

impl IdentityError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            IdentityError::NoLocalDidFound
            | IdentityError::DidNotFound(_)
            | IdentityError::DidDeactivated(_)
            | IdentityError::MissingKeyAgreement(_)
            | IdentityError::PrivateKeyMissing(_)
            | IdentityError::MissingNutsCommService(_)
            | IdentityError::InvalidNutsCommEndpoint(_) => ErrorCategory::Fatal,
            IdentityError::ResolutionFailed(_) => ErrorCategory::Transient,
        }
    }
}
