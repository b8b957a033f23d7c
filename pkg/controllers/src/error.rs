use pkg_quota::QuotaError;
use pkg_state::StoreError;
use pkg_types::{Role, RoleScope};
use thiserror::Error;

/// A project's quota does not fit what is left on its cluster.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ResourceQuotaExceedError {
    /// Comma-joined `key=sum` violations.
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    QuotaExceeded(#[from] ResourceQuotaExceedError),

    #[error(transparent)]
    Quota(#[from] QuotaError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Invalid(String),

    #[error("cancelled while waiting for {0}")]
    Cancelled(String),
}

impl ProvisionError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, ProvisionError::QuotaExceeded(_))
    }
}

/// One binding write that failed during a reconcile pass. Other roles in
/// the same pass still run.
#[derive(Debug, Error)]
#[error("failed to {op} {scope} binding for role {role}: {source}")]
pub struct ReconcileWriteError {
    pub scope: RoleScope,
    pub role: Role,
    pub op: &'static str,
    #[source]
    pub source: StoreError,
}

/// Rejection of a project quota edit or a namespace move.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Quota(#[from] QuotaError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Invalid(String),
}
