use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::PrincipalId;
use crate::domain::request::RequestId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalId(pub String);

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Only `Submitted` and `Withdrawn` are reachable today; `Accepted` and
/// `Rejected` are held open for a future selection flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Submitted,
    Accepted,
    Rejected,
    Withdrawn,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submitted" => Some(Self::Submitted),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "withdrawn" => Some(Self::Withdrawn),
            _ => None,
        }
    }

    /// Whether a proposal in this status contributes to need satisfaction.
    pub fn counts_toward_need(&self) -> bool {
        matches!(self, Self::Submitted | Self::Accepted)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub request_id: RequestId,
    pub supplier_id: PrincipalId,
    pub quantity: u32,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    pub fn is_owned_by(&self, supplier: &PrincipalId) -> bool {
        self.supplier_id == *supplier
    }
}

#[cfg(test)]
mod tests {
    use super::ProposalStatus;

    #[test]
    fn status_codes_round_trip() {
        for status in [
            ProposalStatus::Submitted,
            ProposalStatus::Accepted,
            ProposalStatus::Rejected,
            ProposalStatus::Withdrawn,
        ] {
            assert_eq!(ProposalStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn withdrawn_and_rejected_do_not_count_toward_need() {
        assert!(ProposalStatus::Submitted.counts_toward_need());
        assert!(ProposalStatus::Accepted.counts_toward_need());
        assert!(!ProposalStatus::Rejected.counts_toward_need());
        assert!(!ProposalStatus::Withdrawn.counts_toward_need());
    }
}
