use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use procura_core::auth::{Principal, PrincipalId};
use procura_core::domain::history::StatusHistoryEntry;
use procura_core::domain::proposal::{Proposal, ProposalId};
use procura_core::domain::request::{Request, RequestDraft, RequestId, RequestPatch, RequestStatus};
use procura_core::WorkflowError;

pub mod memory;
pub mod proposal;
pub mod request;

pub use memory::{InMemoryProposalRepository, InMemoryRequestRepository};
pub use proposal::SqlProposalRepository;
pub use request::SqlRequestRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Domain(#[from] WorkflowError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflicting concurrent update: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// The workflow failure behind this error, if it is one. The HTTP
    /// layer uses this to pick a response status; storage failures stay
    /// opaque.
    pub fn as_domain(&self) -> Option<&WorkflowError> {
        match self {
            Self::Domain(error) => Some(error),
            _ => None,
        }
    }

    pub(crate) fn not_found(kind: &'static str) -> Self {
        Self::Domain(WorkflowError::NotFound(kind))
    }
}

/// Request persistence plus the two lifecycle writes that must be atomic:
/// creation (row + initial ledger entry) and transition (status mutation +
/// ledger entry). Both interactive callers and the scheduler sweeps use
/// `transition`; there is no separate automated path.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn create(
        &self,
        draft: &RequestDraft,
        owner: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Request, RepositoryError>;

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError>;

    async fn list_for_owner(&self, owner: &PrincipalId) -> Result<Vec<Request>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Request>, RepositoryError>;

    async fn transition(
        &self,
        id: &RequestId,
        requested: RequestStatus,
        actor: Option<&Principal>,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Request, RepositoryError>;

    async fn update_fields(
        &self,
        id: &RequestId,
        patch: &RequestPatch,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Request, RepositoryError>;

    async fn history(&self, id: &RequestId)
        -> Result<Vec<StatusHistoryEntry>, RepositoryError>;

    /// Requests the expiry sweep should pick up: still Submitted or
    /// Approved with an expiration date strictly before `today`.
    async fn list_expirable(&self, today: NaiveDate) -> Result<Vec<Request>, RepositoryError>;

    /// Requests waiting for the closing sweep.
    async fn list_expired(&self) -> Result<Vec<Request>, RepositoryError>;
}

#[async_trait]
pub trait ProposalRepository: Send + Sync {
    async fn create(
        &self,
        request_id: &RequestId,
        supplier: &Principal,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<Proposal, RepositoryError>;

    async fn find_by_id(&self, id: &ProposalId) -> Result<Option<Proposal>, RepositoryError>;

    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<Proposal>, RepositoryError>;

    async fn list_for_supplier(
        &self,
        supplier: &PrincipalId,
    ) -> Result<Vec<Proposal>, RepositoryError>;

    async fn update_quantity(
        &self,
        id: &ProposalId,
        supplier: &Principal,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<Proposal, RepositoryError>;

    async fn withdraw(
        &self,
        id: &ProposalId,
        supplier: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Proposal, RepositoryError>;

    /// Sum of quantities over proposals that count toward need
    /// satisfaction (Submitted and Accepted).
    async fn total_counted_quantity(
        &self,
        request_id: &RequestId,
    ) -> Result<u64, RepositoryError>;
}
