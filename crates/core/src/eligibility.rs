//! Proposal eligibility: whether a supplier may create, update or withdraw
//! a proposal against a request. Rules are checked in a fixed order and the
//! first failure wins, so callers get one precise reason.
//!
//! The duplicate-proposal rule is deliberately absent here: the store's
//! UNIQUE (request_id, supplier_id) constraint enforces it atomically and
//! the insert maps the violation to `DuplicateProposal`.

use chrono::NaiveDate;

use crate::auth::PrincipalId;
use crate::domain::proposal::{Proposal, ProposalStatus};
use crate::domain::request::{Request, RequestStatus};
use crate::errors::WorkflowError;

/// Rules 1-2 for submitting against a request: it must be approved and its
/// expiration date must be strictly after today (date-only comparison).
pub fn check_submit(request: &Request, today: NaiveDate) -> Result<(), WorkflowError> {
    if request.status != RequestStatus::Approved {
        return Err(WorkflowError::NotApproved { status: request.status });
    }
    if request.expiration_date <= today {
        return Err(WorkflowError::Expired);
    }
    Ok(())
}

/// Update/withdraw variant: the proposal must belong to the supplier and
/// still be in Submitted status, and the request must still be open (it
/// may have expired since submission).
pub fn check_modify(
    request: &Request,
    proposal: &Proposal,
    supplier: &PrincipalId,
    today: NaiveDate,
) -> Result<(), WorkflowError> {
    if !proposal.is_owned_by(supplier) {
        return Err(WorkflowError::forbidden(format!(
            "proposal `{}` does not belong to supplier `{}`",
            proposal.id, supplier
        )));
    }
    if proposal.status != ProposalStatus::Submitted {
        return Err(WorkflowError::validation(format!(
            "proposal in status `{}` cannot be modified",
            proposal.status.as_str()
        )));
    }
    check_submit(request, today)
}

pub fn check_quantity(quantity: u32) -> Result<(), WorkflowError> {
    if quantity == 0 {
        return Err(WorkflowError::validation("proposal quantity must be greater than zero"));
    }
    Ok(())
}
