//! Request lifecycle planning: which status edges exist, who may drive
//! them, and whether a requested transition is a real change or a no-op.
//!
//! This module is pure. The store executes a plan by mutating the request
//! row and appending the ledger entry in one transaction; interactive
//! callers and the scheduler sweeps go through the same planner.

use crate::auth::{Principal, PrincipalId, Role};
use crate::domain::request::RequestStatus;
use crate::errors::WorkflowError;

/// Who is driving a transition, resolved against the request's owner.
/// `System` is the scheduler (no principal at all).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActorKind {
    System,
    Owner,
    Admin,
}

/// Resolves an optional principal to its authority over one request.
/// Principals that are neither the owner nor an admin hold no authority
/// over any edge, so they are rejected here once rather than per edge.
pub fn resolve_actor(
    actor: Option<&Principal>,
    owner: &PrincipalId,
) -> Result<ActorKind, WorkflowError> {
    match actor {
        None => Ok(ActorKind::System),
        Some(principal) if principal.role == Role::Admin => Ok(ActorKind::Admin),
        Some(principal) if principal.id == *owner => Ok(ActorKind::Owner),
        Some(principal) => Err(WorkflowError::forbidden(format!(
            "principal `{}` has no authority over this request",
            principal.id
        ))),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionPlan {
    /// Perform the status write and append one ledger entry.
    Apply,
    /// Requested status equals the current one: succeed without writing
    /// anything. Contractual idempotence for caller retries.
    Noop,
}

/// Validates a requested transition for one actor kind.
///
/// Edge legality is checked before actor authority, so an edge that exists
/// for nobody reports `InvalidTransition` no matter who asks, and an edge
/// that exists for someone else reports `Forbidden`.
pub fn plan_transition(
    current: RequestStatus,
    requested: RequestStatus,
    actor: ActorKind,
) -> Result<TransitionPlan, WorkflowError> {
    if current == requested {
        return Ok(TransitionPlan::Noop);
    }

    if !current.can_transition_to(requested) {
        return Err(WorkflowError::InvalidTransition { from: current, to: requested });
    }

    if edge_allowed(current, requested, actor) {
        Ok(TransitionPlan::Apply)
    } else {
        Err(WorkflowError::forbidden(format!(
            "{} may not move a request from {} to {}",
            describe(actor),
            current.as_str(),
            requested.as_str()
        )))
    }
}

fn edge_allowed(current: RequestStatus, requested: RequestStatus, actor: ActorKind) -> bool {
    use RequestStatus::*;
    match (current, requested) {
        // Admin decisions on freshly submitted requests.
        (Submitted, Approved) | (Submitted, Rejected) => actor == ActorKind::Admin,
        // Resubmission is the owner's explicit action; edits never imply it.
        (Rejected, Submitted) => actor == ActorKind::Owner,
        // Cancellation is shared between the owner and admins.
        (Submitted, Cancelled) | (Approved, Cancelled) | (Rejected, Cancelled) => {
            matches!(actor, ActorKind::Owner | ActorKind::Admin)
        }
        // Date-driven expiry and the closing pass belong to the scheduler.
        (Submitted, Expired) | (Approved, Expired) => actor == ActorKind::System,
        (Expired, ClosedFulfilled) | (Expired, ClosedUnfulfilled) => actor == ActorKind::System,
        _ => false,
    }
}

fn describe(actor: ActorKind) -> &'static str {
    match actor {
        ActorKind::System => "the system",
        ActorKind::Owner => "the request owner",
        ActorKind::Admin => "an administrator",
    }
}
