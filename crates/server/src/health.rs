use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use procura_db::DbPool;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    scheduler_enabled: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub scheduler: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, scheduler_enabled: bool) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(HealthState { db_pool, scheduler_enabled })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    db_pool: DbPool,
    scheduler_enabled: bool,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(db_pool, scheduler_enabled)).await {
            error!(
                event_name = "system.health.error",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    // Scheduler being off is an operator choice, not a degradation; cron-style
    // deployments run `procura sweep` instead.
    let scheduler = if state.scheduler_enabled {
        HealthCheck { status: "ready", detail: "lifecycle sweeps run in-process".to_string() }
    } else {
        HealthCheck { status: "ready", detail: "lifecycle sweeps disabled by config".to_string() }
    };

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        scheduler,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

// Probes the workflow schema rather than a bare SELECT 1 so a connectable but
// unmigrated database still reports as degraded.
async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM request WHERE status IN ('submitted', 'approved')",
    )
    .fetch_one(pool)
    .await
    {
        Ok(open) => HealthCheck { status: "ready", detail: format!("{open} open requests") },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("workflow schema probe failed: {error}") }
        }
    }
}
