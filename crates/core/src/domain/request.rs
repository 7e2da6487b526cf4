use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::PrincipalId;
use crate::errors::WorkflowError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Software,
    Hardware,
    Service,
    Other,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Software => "software",
            Self::Hardware => "hardware",
            Self::Service => "service",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "software" => Some(Self::Software),
            "hardware" => Some(Self::Hardware),
            "service" => Some(Self::Service),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Canonical request lifecycle. The three `Closed*`/`Cancelled` states are
/// terminal; `Expired` is a system-owned holding state on the way to one of
/// the closed states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Submitted,
    Approved,
    Rejected,
    Cancelled,
    Expired,
    ClosedFulfilled,
    ClosedUnfulfilled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::ClosedFulfilled => "closed_fulfilled",
            Self::ClosedUnfulfilled => "closed_unfulfilled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submitted" => Some(Self::Submitted),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            "expired" => Some(Self::Expired),
            "closed_fulfilled" => Some(Self::ClosedFulfilled),
            "closed_unfulfilled" => Some(Self::ClosedUnfulfilled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::ClosedFulfilled | Self::ClosedUnfulfilled)
    }

    /// The full edge set of the lifecycle, actor authority aside.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (Self::Submitted, Self::Approved)
                | (Self::Submitted, Self::Rejected)
                | (Self::Submitted, Self::Cancelled)
                | (Self::Submitted, Self::Expired)
                | (Self::Approved, Self::Cancelled)
                | (Self::Approved, Self::Expired)
                | (Self::Rejected, Self::Submitted)
                | (Self::Rejected, Self::Cancelled)
                | (Self::Expired, Self::ClosedFulfilled)
                | (Self::Expired, Self::ClosedUnfulfilled)
        )
    }

    /// Field edits are allowed only while the request is still being
    /// shaped by its owner.
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Submitted | Self::Rejected)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub owner_id: PrincipalId,
    pub product_type: ProductType,
    pub quantity: u32,
    pub promised_delivery_date: NaiveDate,
    pub expiration_date: NaiveDate,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated input for creating a request. Construction is the only way to
/// get one, so a draft always satisfies the quantity and date invariants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestDraft {
    product_type: ProductType,
    quantity: u32,
    promised_delivery_date: NaiveDate,
    expiration_date: NaiveDate,
}

impl RequestDraft {
    pub fn new(
        product_type: ProductType,
        quantity: u32,
        promised_delivery_date: NaiveDate,
        expiration_date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Self, WorkflowError> {
        if quantity == 0 {
            return Err(WorkflowError::validation("quantity must be greater than zero"));
        }
        validate_dates(promised_delivery_date, expiration_date, today)?;
        Ok(Self { product_type, quantity, promised_delivery_date, expiration_date })
    }

    pub fn product_type(&self) -> ProductType {
        self.product_type
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn promised_delivery_date(&self) -> NaiveDate {
        self.promised_delivery_date
    }

    pub fn expiration_date(&self) -> NaiveDate {
        self.expiration_date
    }
}

/// Partial update to an editable request. Absent fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct RequestPatch {
    pub product_type: Option<ProductType>,
    pub quantity: Option<u32>,
    pub promised_delivery_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
}

impl RequestPatch {
    pub fn is_empty(&self) -> bool {
        self.product_type.is_none()
            && self.quantity.is_none()
            && self.promised_delivery_date.is_none()
            && self.expiration_date.is_none()
    }

    /// Applies the patch to a copy of the request, re-validating the
    /// invariants over the post-patch values. Status, ownership and
    /// timestamps are untouched; the store owns those.
    pub fn apply_to(&self, request: &Request, today: NaiveDate) -> Result<Request, WorkflowError> {
        let mut updated = request.clone();
        if let Some(product_type) = self.product_type {
            updated.product_type = product_type;
        }
        if let Some(quantity) = self.quantity {
            if quantity == 0 {
                return Err(WorkflowError::validation("quantity must be greater than zero"));
            }
            updated.quantity = quantity;
        }
        if let Some(promised) = self.promised_delivery_date {
            updated.promised_delivery_date = promised;
        }
        if let Some(expiration) = self.expiration_date {
            updated.expiration_date = expiration;
        }
        validate_dates(updated.promised_delivery_date, updated.expiration_date, today)?;
        Ok(updated)
    }
}

fn validate_dates(
    promised_delivery_date: NaiveDate,
    expiration_date: NaiveDate,
    today: NaiveDate,
) -> Result<(), WorkflowError> {
    if promised_delivery_date <= today {
        return Err(WorkflowError::validation(
            "promised_delivery_date must be strictly in the future",
        ));
    }
    if expiration_date <= promised_delivery_date {
        return Err(WorkflowError::validation(
            "expiration_date must be strictly after promised_delivery_date",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{ProductType, RequestDraft, RequestPatch, RequestStatus};
    use crate::errors::WorkflowError;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn status_codes_round_trip() {
        for status in [
            RequestStatus::Submitted,
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::Cancelled,
            RequestStatus::Expired,
            RequestStatus::ClosedFulfilled,
            RequestStatus::ClosedUnfulfilled,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RequestStatus::parse("on_hold"), None);
    }

    #[test]
    fn terminal_states_have_no_outbound_edges() {
        let all = [
            RequestStatus::Submitted,
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::Cancelled,
            RequestStatus::Expired,
            RequestStatus::ClosedFulfilled,
            RequestStatus::ClosedUnfulfilled,
        ];
        for from in all.iter().filter(|s| s.is_terminal()) {
            for to in all {
                assert!(!from.can_transition_to(to), "{from:?} -> {to:?} must be illegal");
            }
        }
    }

    #[test]
    fn expired_only_moves_to_closed_states() {
        assert!(RequestStatus::Expired.can_transition_to(RequestStatus::ClosedFulfilled));
        assert!(RequestStatus::Expired.can_transition_to(RequestStatus::ClosedUnfulfilled));
        assert!(!RequestStatus::Expired.can_transition_to(RequestStatus::Approved));
        assert!(!RequestStatus::Expired.can_transition_to(RequestStatus::Cancelled));
    }

    #[test]
    fn draft_enforces_date_ordering() {
        let draft = RequestDraft::new(ProductType::Hardware, 5, day(11), day(21), day(1));
        assert!(draft.is_ok());

        let expires_before_promised =
            RequestDraft::new(ProductType::Hardware, 5, day(11), day(6), day(1));
        assert!(matches!(expires_before_promised, Err(WorkflowError::Validation(_))));

        let promised_today = RequestDraft::new(ProductType::Hardware, 5, day(1), day(21), day(1));
        assert!(matches!(promised_today, Err(WorkflowError::Validation(_))));
    }

    #[test]
    fn draft_rejects_zero_quantity() {
        let draft = RequestDraft::new(ProductType::Service, 0, day(11), day(21), day(1));
        assert!(matches!(draft, Err(WorkflowError::Validation(_))));
    }

    #[test]
    fn patch_revalidates_dates_over_merged_values() {
        let draft = RequestDraft::new(ProductType::Software, 3, day(11), day(21), day(1)).unwrap();
        let request = super::Request {
            id: super::RequestId("REQ-1".into()),
            owner_id: crate::auth::PrincipalId("u-1".into()),
            product_type: draft.product_type(),
            quantity: draft.quantity(),
            promised_delivery_date: draft.promised_delivery_date(),
            expiration_date: draft.expiration_date(),
            status: RequestStatus::Submitted,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        // Moving only the promised date past the stored expiration must fail.
        let patch =
            RequestPatch { promised_delivery_date: Some(day(25)), ..RequestPatch::default() };
        assert!(matches!(patch.apply_to(&request, day(1)), Err(WorkflowError::Validation(_))));

        // Moving both keeps the invariant.
        let patch = RequestPatch {
            promised_delivery_date: Some(day(25)),
            expiration_date: Some(day(28)),
            ..RequestPatch::default()
        };
        let updated = patch.apply_to(&request, day(1)).unwrap();
        assert_eq!(updated.promised_delivery_date, day(25));
        assert_eq!(updated.quantity, 3);
    }
}
