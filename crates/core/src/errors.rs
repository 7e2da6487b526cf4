use thiserror::Error;

use crate::domain::request::RequestStatus;

/// Typed outcome of every workflow operation. None of these are retried
/// inside the core; the HTTP layer maps each kind to a response and the
/// scheduler simply picks eligible rows up again on the next sweep.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid request transition from {from:?} to {to:?}")]
    InvalidTransition { from: RequestStatus, to: RequestStatus },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("supplier has already submitted a proposal for this request")]
    DuplicateProposal,
    #[error("request is not open for proposals (status {status:?})")]
    NotApproved { status: RequestStatus },
    #[error("request has expired")]
    Expired,
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Input mistakes the caller can correct, as opposed to state conflicts.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Forbidden(_))
    }
}
