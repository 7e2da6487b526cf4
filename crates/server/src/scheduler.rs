//! Background sweep loop: expires overdue requests, then closes expired
//! ones. Each pass is two independent sweeps; a failed pass is logged and
//! retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use procura_core::clock::Clock;
use procura_core::config::SchedulerConfig;
use procura_db::repositories::{SqlProposalRepository, SqlRequestRepository};
use procura_db::{auto_close, auto_expire, DbPool};
use tracing::{info, warn};

pub fn spawn(config: &SchedulerConfig, db_pool: DbPool, clock: Arc<dyn Clock>) {
    if !config.enabled {
        info!(event_name = "system.scheduler.disabled", "lifecycle scheduler disabled");
        return;
    }

    let interval_secs = config.sweep_interval_secs.max(1);
    info!(
        event_name = "system.scheduler.start",
        sweep_interval_secs = interval_secs,
        "lifecycle scheduler started"
    );

    tokio::spawn(async move {
        let requests = SqlRequestRepository::new(db_pool.clone());
        let proposals = SqlProposalRepository::new(db_pool);
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));

        loop {
            ticker.tick().await;
            run_pass(&requests, &proposals, clock.as_ref()).await;
        }
    });
}

async fn run_pass(
    requests: &SqlRequestRepository,
    proposals: &SqlProposalRepository,
    clock: &dyn Clock,
) {
    let now = clock.now();
    match auto_expire(requests, now.date_naive(), now).await {
        Ok(expired) if expired > 0 => {
            info!(event_name = "system.scheduler.pass", expired, "expire sweep finished");
        }
        Ok(_) => {}
        Err(error) => {
            warn!(event_name = "system.scheduler.sweep_failed", error = %error, "expire sweep failed");
        }
    }

    match auto_close(requests, proposals, now).await {
        Ok(outcome) if outcome.total() > 0 => {
            info!(
                event_name = "system.scheduler.pass",
                fulfilled = outcome.fulfilled,
                unfulfilled = outcome.unfulfilled,
                "close sweep finished"
            );
        }
        Ok(_) => {}
        Err(error) => {
            warn!(event_name = "system.scheduler.sweep_failed", error = %error, "close sweep failed");
        }
    }
}
