use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use procura_core::auth::{self, Principal, PrincipalId, Role};
use procura_core::domain::proposal::{Proposal, ProposalId, ProposalStatus};
use procura_core::domain::request::RequestId;
use procura_core::eligibility;
use procura_core::WorkflowError;

use super::request::{new_id, request_from_row};
use super::{ProposalRepository, RepositoryError};
use crate::DbPool;

const PROPOSAL_COLUMNS: &str =
    "id, request_id, supplier_id, quantity, status, created_at, updated_at";

pub struct SqlProposalRepository {
    pool: DbPool,
}

impl SqlProposalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Loads a proposal and its parent request inside the caller's
    /// transaction, then runs the modify-eligibility rules.
    async fn load_for_modify(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        id: &ProposalId,
        supplier: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Proposal, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {PROPOSAL_COLUMNS} FROM proposal WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| RepositoryError::not_found("proposal"))?;
        let proposal = proposal_from_row(&row)?;

        let request_row = sqlx::query(
            "SELECT id, owner_id, product_type, quantity, promised_delivery_date,
                    expiration_date, status, created_at, updated_at
             FROM request WHERE id = ?",
        )
        .bind(&proposal.request_id.0)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| RepositoryError::not_found("request"))?;
        let request = request_from_row(&request_row)?;

        eligibility::check_modify(&request, &proposal, &supplier.id, now.date_naive())
            .map_err(RepositoryError::Domain)?;
        Ok(proposal)
    }
}

#[async_trait]
impl ProposalRepository for SqlProposalRepository {
    async fn create(
        &self,
        request_id: &RequestId,
        supplier: &Principal,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<Proposal, RepositoryError> {
        auth::require_role(supplier, Role::Supplier).map_err(RepositoryError::Domain)?;
        eligibility::check_quantity(quantity).map_err(RepositoryError::Domain)?;

        let mut tx = self.pool.begin().await?;

        let request_row = sqlx::query(
            "SELECT id, owner_id, product_type, quantity, promised_delivery_date,
                    expiration_date, status, created_at, updated_at
             FROM request WHERE id = ?",
        )
        .bind(&request_id.0)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RepositoryError::not_found("request"))?;
        let request = request_from_row(&request_row)?;

        eligibility::check_submit(&request, now.date_naive()).map_err(RepositoryError::Domain)?;

        let proposal = Proposal {
            id: ProposalId(new_id("PROP")),
            request_id: request_id.clone(),
            supplier_id: supplier.id.clone(),
            quantity,
            status: ProposalStatus::Submitted,
            created_at: now,
            updated_at: now,
        };

        // The UNIQUE (request_id, supplier_id) constraint is the real
        // duplicate gate; concurrent submissions race here and exactly one
        // insert wins regardless of what any earlier read saw.
        let insert = sqlx::query(
            "INSERT INTO proposal
                (id, request_id, supplier_id, quantity, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&proposal.id.0)
        .bind(&proposal.request_id.0)
        .bind(&proposal.supplier_id.0)
        .bind(proposal.quantity)
        .bind(proposal.status.as_str())
        .bind(proposal.created_at)
        .bind(proposal.updated_at)
        .execute(&mut *tx)
        .await;

        match insert {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_error)) if db_error.is_unique_violation() => {
                return Err(RepositoryError::Domain(WorkflowError::DuplicateProposal));
            }
            Err(error) => return Err(error.into()),
        }

        tx.commit().await?;
        Ok(proposal)
    }

    async fn find_by_id(&self, id: &ProposalId) -> Result<Option<Proposal>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {PROPOSAL_COLUMNS} FROM proposal WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| proposal_from_row(&row)).transpose()
    }

    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<Proposal>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PROPOSAL_COLUMNS} FROM proposal WHERE request_id = ? ORDER BY created_at ASC"
        ))
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(proposal_from_row).collect()
    }

    async fn list_for_supplier(
        &self,
        supplier: &PrincipalId,
    ) -> Result<Vec<Proposal>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PROPOSAL_COLUMNS} FROM proposal WHERE supplier_id = ? ORDER BY created_at DESC"
        ))
        .bind(&supplier.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(proposal_from_row).collect()
    }

    async fn update_quantity(
        &self,
        id: &ProposalId,
        supplier: &Principal,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<Proposal, RepositoryError> {
        eligibility::check_quantity(quantity).map_err(RepositoryError::Domain)?;

        let mut tx = self.pool.begin().await?;
        let proposal = self.load_for_modify(&mut tx, id, supplier, now).await?;

        sqlx::query("UPDATE proposal SET quantity = ?, updated_at = ? WHERE id = ?")
            .bind(quantity)
            .bind(now)
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Proposal { quantity, updated_at: now, ..proposal })
    }

    async fn withdraw(
        &self,
        id: &ProposalId,
        supplier: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Proposal, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let proposal = self.load_for_modify(&mut tx, id, supplier, now).await?;

        // Soft withdrawal: the row stays, stops counting toward need, and
        // the supplier's one-proposal slot remains consumed.
        sqlx::query("UPDATE proposal SET status = ?, updated_at = ? WHERE id = ?")
            .bind(ProposalStatus::Withdrawn.as_str())
            .bind(now)
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Proposal { status: ProposalStatus::Withdrawn, updated_at: now, ..proposal })
    }

    async fn total_counted_quantity(
        &self,
        request_id: &RequestId,
    ) -> Result<u64, RepositoryError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM proposal
             WHERE request_id = ? AND status IN (?, ?)",
        )
        .bind(&request_id.0)
        .bind(ProposalStatus::Submitted.as_str())
        .bind(ProposalStatus::Accepted.as_str())
        .fetch_one(&self.pool)
        .await?;
        u64::try_from(total)
            .map_err(|_| RepositoryError::Decode(format!("negative quantity sum: {total}")))
    }
}

fn proposal_from_row(row: &SqliteRow) -> Result<Proposal, RepositoryError> {
    let status_code: String = row.try_get("status").map_err(decode)?;
    let status = ProposalStatus::parse(&status_code).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown proposal status `{status_code}`"))
    })?;
    let quantity: i64 = row.try_get("quantity").map_err(decode)?;

    Ok(Proposal {
        id: ProposalId(row.try_get("id").map_err(decode)?),
        request_id: RequestId(row.try_get("request_id").map_err(decode)?),
        supplier_id: PrincipalId(row.try_get("supplier_id").map_err(decode)?),
        quantity: u32::try_from(quantity)
            .map_err(|_| RepositoryError::Decode(format!("quantity out of range: {quantity}")))?,
        status,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

fn decode(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}
