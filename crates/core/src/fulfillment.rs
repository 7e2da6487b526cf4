//! Need-satisfaction evaluation: a request's declared need is met when the
//! quantities of its counting proposals add up to at least the requested
//! quantity. Pure function of the proposal set; no side effects.

use crate::domain::proposal::Proposal;

pub fn total_counted_quantity<'a>(proposals: impl IntoIterator<Item = &'a Proposal>) -> u64 {
    proposals
        .into_iter()
        .filter(|proposal| proposal.status.counts_toward_need())
        .map(|proposal| u64::from(proposal.quantity))
        .sum()
}

/// `quantity` is invariantly positive, so an empty proposal set is never
/// enough.
pub fn need_met<'a>(
    request_quantity: u32,
    proposals: impl IntoIterator<Item = &'a Proposal>,
) -> bool {
    total_counted_quantity(proposals) >= u64::from(request_quantity)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{need_met, total_counted_quantity};
    use crate::auth::PrincipalId;
    use crate::domain::proposal::{Proposal, ProposalId, ProposalStatus};
    use crate::domain::request::RequestId;

    fn proposal(quantity: u32, status: ProposalStatus) -> Proposal {
        Proposal {
            id: ProposalId(format!("PROP-{quantity}")),
            request_id: RequestId("REQ-1".into()),
            supplier_id: PrincipalId("s-1".into()),
            quantity,
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn exact_sum_meets_the_need() {
        let proposals =
            [proposal(6, ProposalStatus::Submitted), proposal(4, ProposalStatus::Submitted)];
        assert!(need_met(10, &proposals));
    }

    #[test]
    fn one_short_does_not() {
        let proposals =
            [proposal(6, ProposalStatus::Submitted), proposal(3, ProposalStatus::Submitted)];
        assert!(!need_met(10, &proposals));
    }

    #[test]
    fn zero_proposals_never_meet_a_need() {
        assert!(!need_met(1, &[]));
    }

    #[test]
    fn withdrawn_and_rejected_proposals_are_excluded() {
        let proposals = [
            proposal(6, ProposalStatus::Submitted),
            proposal(5, ProposalStatus::Withdrawn),
            proposal(5, ProposalStatus::Rejected),
            proposal(4, ProposalStatus::Accepted),
        ];
        assert_eq!(total_counted_quantity(&proposals), 10);
        assert!(need_met(10, &proposals));
        assert!(!need_met(11, &proposals));
    }
}
