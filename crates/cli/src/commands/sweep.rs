use chrono::Utc;
use procura_db::repositories::{SqlProposalRepository, SqlRequestRepository};
use procura_db::{auto_close, auto_expire};

use crate::commands::{with_migrated_pool, CommandResult};

/// Runs one manual sweep pass against the configured database. The server's
/// scheduler runs the same two sweeps on an interval; this command exists for
/// operators and cron-style deployments with the scheduler disabled.
pub fn run() -> CommandResult {
    let result = with_migrated_pool("sweep", |pool| async move {
        let requests = SqlRequestRepository::new(pool.clone());
        let proposals = SqlProposalRepository::new(pool.clone());

        let now = Utc::now();
        let expired = auto_expire(&requests, now.date_naive(), now)
            .await
            .map_err(|error| ("sweep_expire", error.to_string(), 6u8))?;
        let outcome = auto_close(&requests, &proposals, now)
            .await
            .map_err(|error| ("sweep_close", error.to_string(), 6u8))?;

        Ok((expired, outcome))
    });

    match result {
        Ok((expired, outcome)) => CommandResult::success(
            "sweep",
            format!(
                "sweep pass complete: {expired} expired, {} closed fulfilled, {} closed unfulfilled",
                outcome.fulfilled, outcome.unfulfilled
            ),
        ),
        Err(failure) => failure,
    }
}
