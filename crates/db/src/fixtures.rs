use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// One seeded request per lifecycle stage worth demonstrating.
const SEED_REQUESTS: &[SeedRequestContract] = &[
    SeedRequestContract {
        request_id: "REQ-demo-open",
        owner_id: "user-demo-1",
        status: "submitted",
        expected_proposal_count: 0,
        expected_history_count: 1,
        description: "Freshly submitted hardware request, awaiting review",
    },
    SeedRequestContract {
        request_id: "REQ-demo-approved",
        owner_id: "user-demo-1",
        status: "approved",
        expected_proposal_count: 2,
        expected_history_count: 2,
        description: "Approved software request with one live and one withdrawn proposal",
    },
    SeedRequestContract {
        request_id: "REQ-demo-rejected",
        owner_id: "user-demo-2",
        status: "rejected",
        expected_proposal_count: 0,
        expected_history_count: 2,
        description: "Rejected service request, eligible for resubmission",
    },
    SeedRequestContract {
        request_id: "REQ-demo-expired",
        owner_id: "user-demo-2",
        status: "expired",
        expected_proposal_count: 1,
        expected_history_count: 3,
        description: "Expired request with full coverage, ready for the close sweep",
    },
];

const SEED_REQUEST_IDS: &[&str] =
    &["REQ-demo-open", "REQ-demo-approved", "REQ-demo-rejected", "REQ-demo-expired"];

/// Deterministic demo dataset covering the request lifecycle stages.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// SQL fixture content for the demo dataset.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Load the demo dataset into the database. Re-running replaces the same
    /// rows, so the result is identical.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let requests_seeded = SEED_REQUESTS
            .iter()
            .map(|contract| RequestSeedInfo {
                request_id: contract.request_id,
                status: contract.status,
                description: contract.description,
            })
            .collect::<Vec<_>>();
        Ok(SeedResult { requests_seeded })
    }

    /// Verify that the seeded rows exist and match the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for contract in SEED_REQUESTS {
            let request_exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM request WHERE id = ?1 AND owner_id = ?2 AND status = ?3)",
            )
            .bind(contract.request_id)
            .bind(contract.owner_id)
            .bind(contract.status)
            .fetch_one(pool)
            .await?;
            checks.push((contract.request_id, request_exists == 1));

            let proposal_count: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM proposal WHERE request_id = ?1")
                    .bind(contract.request_id)
                    .fetch_one(pool)
                    .await?;
            checks.push((
                contract.proposal_count_label(),
                proposal_count == contract.expected_proposal_count,
            ));

            let history_count: i64 = sqlx::query_scalar(
                "SELECT COUNT(1) FROM request_status_history WHERE request_id = ?1",
            )
            .bind(contract.request_id)
            .fetch_one(pool)
            .await?;
            checks.push((
                contract.history_count_label(),
                history_count == contract.expected_history_count,
            ));
        }

        // The expired request's ledger must end with a system entry.
        let system_expired: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM request_status_history WHERE request_id = 'REQ-demo-expired' AND status = 'expired' AND changed_by IS NULL)",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("expired-system-ledger-entry", system_expired == 1));

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Remove the seeded rows from a test database.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let quoted = SEED_REQUEST_IDS
            .iter()
            .map(|id| format!("'{id}'"))
            .collect::<Vec<_>>()
            .join(",");

        let mut tx = pool.begin().await?;
        sqlx::query(&format!(
            "DELETE FROM request_status_history WHERE request_id IN ({quoted})"
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!("DELETE FROM proposal WHERE request_id IN ({quoted})"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM request WHERE id IN ({quoted})"))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedRequestContract {
    request_id: &'static str,
    owner_id: &'static str,
    status: &'static str,
    expected_proposal_count: i64,
    expected_history_count: i64,
    description: &'static str,
}

impl SeedRequestContract {
    fn proposal_count_label(&self) -> &'static str {
        match self.status {
            "submitted" => "open-proposal-count",
            "approved" => "approved-proposal-count",
            "rejected" => "rejected-proposal-count",
            _ => "expired-proposal-count",
        }
    }

    fn history_count_label(&self) -> &'static str {
        match self.status {
            "submitted" => "open-history-count",
            "approved" => "approved-history-count",
            "rejected" => "rejected-history-count",
            _ => "expired-history-count",
        }
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub requests_seeded: Vec<RequestSeedInfo>,
}

#[derive(Debug)]
pub struct RequestSeedInfo {
    pub request_id: &'static str,
    pub status: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
