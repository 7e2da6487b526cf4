//! In-memory repository implementations. A single write lock stands in for
//! the store's transactionality, which keeps the lifecycle and sweep logic
//! testable without a database pool.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use procura_core::auth::{self, Principal, PrincipalId, Role};
use procura_core::domain::history::StatusHistoryEntry;
use procura_core::domain::proposal::{Proposal, ProposalId, ProposalStatus};
use procura_core::domain::request::{Request, RequestDraft, RequestId, RequestPatch, RequestStatus};
use procura_core::eligibility;
use procura_core::lifecycle::{self, TransitionPlan};
use procura_core::WorkflowError;

use super::request::new_id;
use super::{ProposalRepository, RepositoryError, RequestRepository};

#[derive(Default)]
struct RequestState {
    requests: HashMap<String, Request>,
    history: Vec<StatusHistoryEntry>,
}

#[derive(Default)]
pub struct InMemoryRequestRepository {
    state: RwLock<RequestState>,
}

#[async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn create(
        &self,
        draft: &RequestDraft,
        owner: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Request, RepositoryError> {
        let request = Request {
            id: RequestId(new_id("REQ")),
            owner_id: owner.id.clone(),
            product_type: draft.product_type(),
            quantity: draft.quantity(),
            promised_delivery_date: draft.promised_delivery_date(),
            expiration_date: draft.expiration_date(),
            status: RequestStatus::Submitted,
            created_at: now,
            updated_at: now,
        };

        let mut state = self.state.write().await;
        state.history.push(StatusHistoryEntry {
            id: new_id("HIST"),
            request_id: request.id.clone(),
            status: RequestStatus::Submitted,
            changed_by: Some(owner.id.clone()),
            notes: Some("Request created.".to_string()),
            changed_at: now,
        });
        state.requests.insert(request.id.0.clone(), request.clone());
        Ok(request)
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.requests.get(&id.0).cloned())
    }

    async fn list_for_owner(&self, owner: &PrincipalId) -> Result<Vec<Request>, RepositoryError> {
        let state = self.state.read().await;
        let mut requests: Vec<Request> =
            state.requests.values().filter(|r| r.owner_id == *owner).cloned().collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn list_all(&self) -> Result<Vec<Request>, RepositoryError> {
        let state = self.state.read().await;
        let mut requests: Vec<Request> = state.requests.values().cloned().collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn transition(
        &self,
        id: &RequestId,
        requested: RequestStatus,
        actor: Option<&Principal>,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Request, RepositoryError> {
        let mut state = self.state.write().await;
        let request = state
            .requests
            .get(&id.0)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("request"))?;

        let kind =
            lifecycle::resolve_actor(actor, &request.owner_id).map_err(RepositoryError::Domain)?;
        let plan = lifecycle::plan_transition(request.status, requested, kind)
            .map_err(RepositoryError::Domain)?;

        if plan == TransitionPlan::Noop {
            return Ok(request);
        }

        let updated = Request { status: requested, updated_at: now, ..request };
        state.history.push(StatusHistoryEntry {
            id: new_id("HIST"),
            request_id: updated.id.clone(),
            status: requested,
            changed_by: actor.map(|principal| principal.id.clone()),
            notes: notes.map(str::to_string),
            changed_at: now,
        });
        state.requests.insert(updated.id.0.clone(), updated.clone());
        Ok(updated)
    }

    async fn update_fields(
        &self,
        id: &RequestId,
        patch: &RequestPatch,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Request, RepositoryError> {
        let mut state = self.state.write().await;
        let request = state
            .requests
            .get(&id.0)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("request"))?;

        auth::require_owner(actor, &request.owner_id).map_err(RepositoryError::Domain)?;
        if !request.status.is_editable() {
            return Err(RepositoryError::Domain(WorkflowError::forbidden(format!(
                "request cannot be edited in status `{}`",
                request.status.as_str()
            ))));
        }

        let mut updated =
            patch.apply_to(&request, now.date_naive()).map_err(RepositoryError::Domain)?;
        updated.updated_at = now;
        state.requests.insert(updated.id.0.clone(), updated.clone());
        Ok(updated)
    }

    async fn history(
        &self,
        id: &RequestId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.history.iter().filter(|entry| entry.request_id == *id).cloned().collect())
    }

    async fn list_expirable(&self, today: NaiveDate) -> Result<Vec<Request>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .requests
            .values()
            .filter(|request| {
                matches!(request.status, RequestStatus::Submitted | RequestStatus::Approved)
                    && request.expiration_date < today
            })
            .cloned()
            .collect())
    }

    async fn list_expired(&self) -> Result<Vec<Request>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .requests
            .values()
            .filter(|request| request.status == RequestStatus::Expired)
            .cloned()
            .collect())
    }
}

pub struct InMemoryProposalRepository {
    requests: Arc<InMemoryRequestRepository>,
    proposals: RwLock<HashMap<String, Proposal>>,
}

impl InMemoryProposalRepository {
    pub fn new(requests: Arc<InMemoryRequestRepository>) -> Self {
        Self { requests, proposals: RwLock::new(HashMap::new()) }
    }

    async fn check_modify(
        &self,
        id: &ProposalId,
        supplier: &Principal,
        today: NaiveDate,
    ) -> Result<(), RepositoryError> {
        let proposal = {
            let proposals = self.proposals.read().await;
            proposals.get(&id.0).cloned().ok_or_else(|| RepositoryError::not_found("proposal"))?
        };
        let request = {
            let state = self.requests.state.read().await;
            state
                .requests
                .get(&proposal.request_id.0)
                .cloned()
                .ok_or_else(|| RepositoryError::not_found("request"))?
        };
        eligibility::check_modify(&request, &proposal, &supplier.id, today)
            .map_err(RepositoryError::Domain)
    }
}

#[async_trait]
impl ProposalRepository for InMemoryProposalRepository {
    async fn create(
        &self,
        request_id: &RequestId,
        supplier: &Principal,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<Proposal, RepositoryError> {
        auth::require_role(supplier, Role::Supplier).map_err(RepositoryError::Domain)?;
        eligibility::check_quantity(quantity).map_err(RepositoryError::Domain)?;

        let request = {
            let state = self.requests.state.read().await;
            state
                .requests
                .get(&request_id.0)
                .cloned()
                .ok_or_else(|| RepositoryError::not_found("request"))?
        };
        eligibility::check_submit(&request, now.date_naive()).map_err(RepositoryError::Domain)?;

        let mut proposals = self.proposals.write().await;
        // The write lock plays the role of the store's uniqueness constraint.
        let duplicate = proposals
            .values()
            .any(|p| p.request_id == *request_id && p.supplier_id == supplier.id);
        if duplicate {
            return Err(RepositoryError::Domain(WorkflowError::DuplicateProposal));
        }

        let proposal = Proposal {
            id: ProposalId(new_id("PROP")),
            request_id: request_id.clone(),
            supplier_id: supplier.id.clone(),
            quantity,
            status: ProposalStatus::Submitted,
            created_at: now,
            updated_at: now,
        };
        proposals.insert(proposal.id.0.clone(), proposal.clone());
        Ok(proposal)
    }

    async fn find_by_id(&self, id: &ProposalId) -> Result<Option<Proposal>, RepositoryError> {
        let proposals = self.proposals.read().await;
        Ok(proposals.get(&id.0).cloned())
    }

    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<Proposal>, RepositoryError> {
        let proposals = self.proposals.read().await;
        Ok(proposals.values().filter(|p| p.request_id == *request_id).cloned().collect())
    }

    async fn list_for_supplier(
        &self,
        supplier: &PrincipalId,
    ) -> Result<Vec<Proposal>, RepositoryError> {
        let proposals = self.proposals.read().await;
        Ok(proposals.values().filter(|p| p.supplier_id == *supplier).cloned().collect())
    }

    async fn update_quantity(
        &self,
        id: &ProposalId,
        supplier: &Principal,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<Proposal, RepositoryError> {
        eligibility::check_quantity(quantity).map_err(RepositoryError::Domain)?;
        self.check_modify(id, supplier, now.date_naive()).await?;
        let mut proposals = self.proposals.write().await;
        let proposal =
            proposals.get_mut(&id.0).ok_or_else(|| RepositoryError::not_found("proposal"))?;
        proposal.quantity = quantity;
        proposal.updated_at = now;
        Ok(proposal.clone())
    }

    async fn withdraw(
        &self,
        id: &ProposalId,
        supplier: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Proposal, RepositoryError> {
        self.check_modify(id, supplier, now.date_naive()).await?;
        let mut proposals = self.proposals.write().await;
        let proposal =
            proposals.get_mut(&id.0).ok_or_else(|| RepositoryError::not_found("proposal"))?;
        proposal.status = ProposalStatus::Withdrawn;
        proposal.updated_at = now;
        Ok(proposal.clone())
    }

    async fn total_counted_quantity(
        &self,
        request_id: &RequestId,
    ) -> Result<u64, RepositoryError> {
        let proposals = self.proposals.read().await;
        Ok(proposals
            .values()
            .filter(|p| p.request_id == *request_id && p.status.counts_toward_need())
            .map(|p| u64::from(p.quantity))
            .sum())
    }
}
