//! Scheduled lifecycle sweeps. Both passes reuse the repository transition
//! path with a system actor, so sweep-driven changes land in the status
//! history exactly like interactive ones.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use procura_core::domain::request::RequestStatus;

use crate::repositories::{ProposalRepository, RepositoryError, RequestRepository};

/// Counts from one `auto_close` pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    pub fulfilled: usize,
    pub unfulfilled: usize,
}

impl SweepOutcome {
    pub fn total(&self) -> usize {
        self.fulfilled + self.unfulfilled
    }
}

/// Moves every open request whose expiration date is strictly before `today`
/// to `expired`. Failures on individual requests are logged and skipped so
/// one bad row cannot stall the sweep.
pub async fn auto_expire<R>(
    requests: &R,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<usize, RepositoryError>
where
    R: RequestRepository + ?Sized,
{
    let candidates = requests.list_expirable(today).await?;
    let mut expired = 0;

    for request in candidates {
        let result = requests
            .transition(
                &request.id,
                RequestStatus::Expired,
                None,
                Some("Expired automatically past expiration date."),
                now,
            )
            .await;
        match result {
            Ok(_) => expired += 1,
            Err(err) => {
                warn!(
                    event_name = "sweep.expire_failed",
                    request_id = %request.id,
                    error = %err,
                    "failed to expire request"
                );
            }
        }
    }

    if expired > 0 {
        info!(event_name = "sweep.expired", count = expired, "expired open requests");
    }
    Ok(expired)
}

/// Closes every `expired` request as fulfilled or unfulfilled depending on
/// whether submitted and accepted proposals cover the requested quantity.
pub async fn auto_close<R, P>(
    requests: &R,
    proposals: &P,
    now: DateTime<Utc>,
) -> Result<SweepOutcome, RepositoryError>
where
    R: RequestRepository + ?Sized,
    P: ProposalRepository + ?Sized,
{
    let candidates = requests.list_expired().await?;
    let mut outcome = SweepOutcome::default();

    for request in candidates {
        let counted = match proposals.total_counted_quantity(&request.id).await {
            Ok(counted) => counted,
            Err(err) => {
                warn!(
                    event_name = "sweep.close_failed",
                    request_id = %request.id,
                    error = %err,
                    "failed to total proposals for expired request"
                );
                continue;
            }
        };

        let (target, notes) = if counted >= u64::from(request.quantity) {
            (RequestStatus::ClosedFulfilled, "Closed: need met by open proposals.")
        } else {
            (RequestStatus::ClosedUnfulfilled, "Closed: need not met by open proposals.")
        };

        match requests.transition(&request.id, target, None, Some(notes), now).await {
            Ok(_) if target == RequestStatus::ClosedFulfilled => outcome.fulfilled += 1,
            Ok(_) => outcome.unfulfilled += 1,
            Err(err) => {
                warn!(
                    event_name = "sweep.close_failed",
                    request_id = %request.id,
                    error = %err,
                    "failed to close expired request"
                );
            }
        }
    }

    if outcome.total() > 0 {
        info!(
            event_name = "sweep.closed",
            fulfilled = outcome.fulfilled,
            unfulfilled = outcome.unfulfilled,
            "closed expired requests"
        );
    }
    Ok(outcome)
}
