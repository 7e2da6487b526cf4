//! JSON API for the request/proposal workflow.
//!
//! Routes (under `/api/v1`):
//! - `POST  /requests`                      submit a product-need request
//! - `GET   /requests`                      admin sees all, others their own
//! - `GET   /requests/{id}`                 request detail (owner or admin)
//! - `PATCH /requests/{id}`                 edit fields while editable (owner)
//! - `POST  /requests/{id}/cancel`          cancel (owner or admin)
//! - `POST  /requests/{id}/resubmit`        resubmit a rejected request (owner)
//! - `POST  /requests/{id}/status`          approve/reject decision (admin)
//! - `GET   /requests/{id}/history`         status ledger
//! - `GET   /requests/{id}/fulfillment`     need-satisfaction summary
//! - `POST  /requests/{id}/proposals`       submit a proposal (supplier)
//! - `GET   /requests/{id}/proposals`       proposals for a request
//! - `PATCH /proposals/{id}`                update proposal quantity (supplier)
//! - `POST  /proposals/{id}/withdraw`       withdraw a proposal (supplier)
//! - `GET   /proposals`                     supplier's own proposals
//!
//! Identity arrives as trusted `x-principal-id` / `x-principal-role` headers
//! set by the upstream authentication proxy; missing or malformed headers
//! are a 401.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use procura_core::auth::{self, Principal, Role};
use procura_core::clock::Clock;
use procura_core::domain::history::StatusHistoryEntry;
use procura_core::domain::proposal::{Proposal, ProposalId};
use procura_core::domain::request::{
    ProductType, Request, RequestDraft, RequestId, RequestPatch, RequestStatus,
};
use procura_core::{fulfillment, WorkflowError};
use procura_db::repositories::{
    ProposalRepository, RepositoryError, RequestRepository, SqlProposalRepository,
    SqlRequestRepository,
};
use procura_db::DbPool;

#[derive(Clone)]
pub struct ApiState {
    requests: Arc<SqlRequestRepository>,
    proposals: Arc<SqlProposalRepository>,
    clock: Arc<dyn Clock>,
}

pub fn router_with_clock(db_pool: DbPool, clock: Arc<dyn Clock>) -> Router {
    let state = ApiState {
        requests: Arc::new(SqlRequestRepository::new(db_pool.clone())),
        proposals: Arc::new(SqlProposalRepository::new(db_pool)),
        clock,
    };

    Router::new()
        .route("/api/v1/requests", post(create_request).get(list_requests))
        .route("/api/v1/requests/{id}", get(get_request).patch(patch_request))
        .route("/api/v1/requests/{id}/cancel", post(cancel_request))
        .route("/api/v1/requests/{id}/resubmit", post(resubmit_request))
        .route("/api/v1/requests/{id}/status", post(decide_request))
        .route("/api/v1/requests/{id}/history", get(request_history))
        .route("/api/v1/requests/{id}/fulfillment", get(request_fulfillment))
        .route(
            "/api/v1/requests/{id}/proposals",
            post(create_proposal).get(list_request_proposals),
        )
        .route("/api/v1/proposals", get(list_my_proposals))
        .route("/api/v1/proposals/{id}", patch(patch_proposal))
        .route("/api/v1/proposals/{id}/withdraw", post(withdraw_proposal))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub product_type: ProductType,
    pub quantity: u32,
    pub promised_delivery_date: NaiveDate,
    pub expiration_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    pub status: Decision,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProposalBody {
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct FulfillmentResponse {
    pub request_id: RequestId,
    pub requested_quantity: u32,
    pub total_proposed: u64,
    pub need_met: bool,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

type ApiFailure = (StatusCode, Json<ApiError>);

// ---------------------------------------------------------------------------
// Request handlers
// ---------------------------------------------------------------------------

async fn create_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<CreateRequestBody>,
) -> Result<(StatusCode, Json<Request>), ApiFailure> {
    let principal = principal_from_headers(&headers)?;
    auth::require_role(&principal, Role::EndUser).map_err(|err| domain_failure(&err))?;

    let draft = RequestDraft::new(
        body.product_type,
        body.quantity,
        body.promised_delivery_date,
        body.expiration_date,
        state.clock.today(),
    )
    .map_err(|err| domain_failure(&err))?;

    let request = state
        .requests
        .create(&draft, &principal, state.clock.now())
        .await
        .map_err(map_repository_error)?;

    info!(
        event_name = "api.request.created",
        request_id = %request.id,
        owner_id = %principal.id,
        quantity = request.quantity,
        "request submitted"
    );
    Ok((StatusCode::CREATED, Json(request)))
}

async fn list_requests(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Request>>, ApiFailure> {
    let principal = principal_from_headers(&headers)?;
    let requests = if principal.is_admin() {
        state.requests.list_all().await
    } else {
        state.requests.list_for_owner(&principal.id).await
    }
    .map_err(map_repository_error)?;
    Ok(Json(requests))
}

async fn get_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Request>, ApiFailure> {
    let principal = principal_from_headers(&headers)?;
    let request = load_request(&state, &RequestId(id)).await?;
    auth::require_owner_or_admin(&principal, &request.owner_id)
        .map_err(|err| domain_failure(&err))?;
    Ok(Json(request))
}

async fn patch_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<RequestPatch>,
) -> Result<Json<Request>, ApiFailure> {
    let principal = principal_from_headers(&headers)?;
    if patch.is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiError { error: "no fields to update".to_string() }),
        ));
    }

    let request = state
        .requests
        .update_fields(&RequestId(id), &patch, &principal, state.clock.now())
        .await
        .map_err(map_repository_error)?;

    info!(
        event_name = "api.request.updated",
        request_id = %request.id,
        "request fields updated"
    );
    Ok(Json(request))
}

async fn cancel_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Request>, ApiFailure> {
    transition_handler(&state, &headers, &id, RequestStatus::Cancelled, None).await
}

async fn resubmit_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Request>, ApiFailure> {
    transition_handler(&state, &headers, &id, RequestStatus::Submitted, None).await
}

async fn decide_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<DecisionBody>,
) -> Result<Json<Request>, ApiFailure> {
    let target = match body.status {
        Decision::Approved => RequestStatus::Approved,
        Decision::Rejected => RequestStatus::Rejected,
    };
    transition_handler(&state, &headers, &id, target, body.notes.as_deref()).await
}

async fn transition_handler(
    state: &ApiState,
    headers: &HeaderMap,
    id: &str,
    target: RequestStatus,
    notes: Option<&str>,
) -> Result<Json<Request>, ApiFailure> {
    let principal = principal_from_headers(headers)?;
    let request = state
        .requests
        .transition(
            &RequestId(id.to_string()),
            target,
            Some(&principal),
            notes,
            state.clock.now(),
        )
        .await
        .map_err(map_repository_error)?;

    info!(
        event_name = "api.request.transitioned",
        request_id = %request.id,
        status = request.status.as_str(),
        actor_id = %principal.id,
        "request status changed"
    );
    Ok(Json(request))
}

async fn request_history(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<StatusHistoryEntry>>, ApiFailure> {
    let principal = principal_from_headers(&headers)?;
    let request = load_request(&state, &RequestId(id)).await?;
    auth::require_owner_or_admin(&principal, &request.owner_id)
        .map_err(|err| domain_failure(&err))?;

    let history = state.requests.history(&request.id).await.map_err(map_repository_error)?;
    Ok(Json(history))
}

async fn request_fulfillment(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<FulfillmentResponse>, ApiFailure> {
    let principal = principal_from_headers(&headers)?;
    let request = load_request(&state, &RequestId(id)).await?;
    auth::require_owner_or_admin(&principal, &request.owner_id)
        .map_err(|err| domain_failure(&err))?;

    let proposals =
        state.proposals.list_for_request(&request.id).await.map_err(map_repository_error)?;
    Ok(Json(FulfillmentResponse {
        request_id: request.id,
        requested_quantity: request.quantity,
        total_proposed: fulfillment::total_counted_quantity(&proposals),
        need_met: fulfillment::need_met(request.quantity, &proposals),
    }))
}

// ---------------------------------------------------------------------------
// Proposal handlers
// ---------------------------------------------------------------------------

async fn create_proposal(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ProposalBody>,
) -> Result<(StatusCode, Json<Proposal>), ApiFailure> {
    let principal = principal_from_headers(&headers)?;
    let proposal = state
        .proposals
        .create(&RequestId(id), &principal, body.quantity, state.clock.now())
        .await
        .map_err(map_repository_error)?;

    info!(
        event_name = "api.proposal.created",
        proposal_id = %proposal.id,
        request_id = %proposal.request_id,
        supplier_id = %principal.id,
        quantity = proposal.quantity,
        "proposal submitted"
    );
    Ok((StatusCode::CREATED, Json(proposal)))
}

async fn list_request_proposals(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<Proposal>>, ApiFailure> {
    let principal = principal_from_headers(&headers)?;
    let request = load_request(&state, &RequestId(id)).await?;

    let mut proposals =
        state.proposals.list_for_request(&request.id).await.map_err(map_repository_error)?;

    // Owners and admins see everything; a supplier sees only their own entry.
    if auth::require_owner_or_admin(&principal, &request.owner_id).is_err() {
        if principal.role != Role::Supplier {
            return Err(domain_failure(&WorkflowError::forbidden(format!(
                "principal `{}` may not list proposals for this request",
                principal.id
            ))));
        }
        proposals.retain(|proposal| proposal.supplier_id == principal.id);
    }
    Ok(Json(proposals))
}

async fn patch_proposal(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ProposalBody>,
) -> Result<Json<Proposal>, ApiFailure> {
    let principal = principal_from_headers(&headers)?;
    let proposal = state
        .proposals
        .update_quantity(&ProposalId(id), &principal, body.quantity, state.clock.now())
        .await
        .map_err(map_repository_error)?;

    info!(
        event_name = "api.proposal.updated",
        proposal_id = %proposal.id,
        quantity = proposal.quantity,
        "proposal quantity updated"
    );
    Ok(Json(proposal))
}

async fn withdraw_proposal(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Proposal>, ApiFailure> {
    let principal = principal_from_headers(&headers)?;
    let proposal = state
        .proposals
        .withdraw(&ProposalId(id), &principal, state.clock.now())
        .await
        .map_err(map_repository_error)?;

    info!(
        event_name = "api.proposal.withdrawn",
        proposal_id = %proposal.id,
        "proposal withdrawn"
    );
    Ok(Json(proposal))
}

async fn list_my_proposals(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Proposal>>, ApiFailure> {
    let principal = principal_from_headers(&headers)?;
    auth::require_role(&principal, Role::Supplier).map_err(|err| domain_failure(&err))?;

    let proposals =
        state.proposals.list_for_supplier(&principal.id).await.map_err(map_repository_error)?;
    Ok(Json(proposals))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, ApiFailure> {
    let id = headers
        .get("x-principal-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let role = headers
        .get("x-principal-role")
        .and_then(|value| value.to_str().ok())
        .and_then(Role::parse);

    match (id, role) {
        (Some(id), Some(role)) => Ok(Principal::new(id, role)),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiError {
                error: "missing or invalid principal headers".to_string(),
            }),
        )),
    }
}

async fn load_request(state: &ApiState, id: &RequestId) -> Result<Request, ApiFailure> {
    state
        .requests
        .find_by_id(id)
        .await
        .map_err(map_repository_error)?
        .ok_or_else(|| domain_failure(&WorkflowError::NotFound("request")))
}

fn domain_failure(error: &WorkflowError) -> ApiFailure {
    let status = match error {
        WorkflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::Forbidden(_) => StatusCode::FORBIDDEN,
        WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
        WorkflowError::InvalidTransition { .. }
        | WorkflowError::DuplicateProposal
        | WorkflowError::NotApproved { .. }
        | WorkflowError::Expired => StatusCode::CONFLICT,
    };
    (status, Json(ApiError { error: error.to_string() }))
}

fn map_repository_error(error: RepositoryError) -> ApiFailure {
    if let Some(domain) = error.as_domain() {
        return domain_failure(domain);
    }
    match error {
        RepositoryError::Conflict(detail) => {
            warn!(event_name = "api.conflict", detail = %detail, "concurrent update conflict");
            (
                StatusCode::CONFLICT,
                Json(ApiError {
                    error: "the request was modified concurrently, retry".to_string(),
                }),
            )
        }
        other => {
            error!(event_name = "api.storage_error", error = %other, "storage error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError { error: "an internal error occurred".to_string() }),
            )
        }
    }
}
