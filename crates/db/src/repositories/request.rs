use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use procura_core::auth::{Principal, PrincipalId};
use procura_core::domain::history::StatusHistoryEntry;
use procura_core::domain::request::{
    ProductType, Request, RequestDraft, RequestId, RequestPatch, RequestStatus,
};
use procura_core::lifecycle::{self, TransitionPlan};
use procura_core::WorkflowError;

use super::{RepositoryError, RequestRepository};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id, owner_id, product_type, quantity, promised_delivery_date, \
     expiration_date, status, created_at, updated_at";

/// How many times a transition re-reads and re-plans after losing the
/// guarded status update to a concurrent writer.
const TRANSITION_ATTEMPTS: u32 = 3;

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn create(
        &self,
        draft: &RequestDraft,
        owner: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Request, RepositoryError> {
        let request = Request {
            id: RequestId(new_id("REQ")),
            owner_id: owner.id.clone(),
            product_type: draft.product_type(),
            quantity: draft.quantity(),
            promised_delivery_date: draft.promised_delivery_date(),
            expiration_date: draft.expiration_date(),
            status: RequestStatus::Submitted,
            created_at: now,
            updated_at: now,
        };

        // Row and initial ledger entry land in the same transaction so a
        // request is never observable without its Submitted entry.
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO request
                (id, owner_id, product_type, quantity, promised_delivery_date,
                 expiration_date, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.owner_id.0)
        .bind(request.product_type.as_str())
        .bind(request.quantity)
        .bind(request.promised_delivery_date)
        .bind(request.expiration_date)
        .bind(request.status.as_str())
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&mut *tx)
        .await?;

        insert_history(
            &mut tx,
            &request.id,
            RequestStatus::Submitted,
            Some(&owner.id),
            Some("Request created."),
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(request)
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM request WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|row| request_from_row(&row)).transpose()
    }

    async fn list_for_owner(&self, owner: &PrincipalId) -> Result<Vec<Request>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM request WHERE owner_id = ? ORDER BY created_at DESC"
        ))
        .bind(&owner.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(request_from_row).collect()
    }

    async fn list_all(&self) -> Result<Vec<Request>, RepositoryError> {
        let rows =
            sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM request ORDER BY created_at DESC"))
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(request_from_row).collect()
    }

    async fn transition(
        &self,
        id: &RequestId,
        requested: RequestStatus,
        actor: Option<&Principal>,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Request, RepositoryError> {
        for _ in 0..TRANSITION_ATTEMPTS {
            let mut tx = self.pool.begin().await?;

            let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM request WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| RepositoryError::not_found("request"))?;
            let request = request_from_row(&row)?;

            let kind = lifecycle::resolve_actor(actor, &request.owner_id)
                .map_err(RepositoryError::Domain)?;
            let plan = lifecycle::plan_transition(request.status, requested, kind)
                .map_err(RepositoryError::Domain)?;

            if plan == TransitionPlan::Noop {
                // Nothing to write; the open transaction is dropped.
                return Ok(request);
            }

            // Guarded write: a concurrent transition that committed first
            // changes the status under us and the update matches nothing.
            // The loser re-reads and is re-validated against the new state
            // instead of silently overwriting it.
            let result = sqlx::query(
                "UPDATE request SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
            )
            .bind(requested.as_str())
            .bind(now)
            .bind(&id.0)
            .bind(request.status.as_str())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                continue;
            }

            insert_history(
                &mut tx,
                id,
                requested,
                actor.map(|principal| &principal.id),
                notes,
                now,
            )
            .await?;

            tx.commit().await?;
            return Ok(Request { status: requested, updated_at: now, ..request });
        }

        Err(RepositoryError::Conflict(format!(
            "request `{id}` kept changing under concurrent transitions"
        )))
    }

    async fn update_fields(
        &self,
        id: &RequestId,
        patch: &RequestPatch,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Request, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM request WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RepositoryError::not_found("request"))?;
        let request = request_from_row(&row)?;

        // Owner only: admins hold transition authority, not edit rights.
        procura_core::auth::require_owner(actor, &request.owner_id)
            .map_err(RepositoryError::Domain)?;
        if !request.status.is_editable() {
            return Err(RepositoryError::Domain(WorkflowError::forbidden(format!(
                "request cannot be edited in status `{}`",
                request.status.as_str()
            ))));
        }

        let updated = patch.apply_to(&request, now.date_naive()).map_err(RepositoryError::Domain)?;

        // Status guard keeps a concurrent transition from racing the edit.
        let result = sqlx::query(
            "UPDATE request
             SET product_type = ?, quantity = ?, promised_delivery_date = ?,
                 expiration_date = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(updated.product_type.as_str())
        .bind(updated.quantity)
        .bind(updated.promised_delivery_date)
        .bind(updated.expiration_date)
        .bind(now)
        .bind(&id.0)
        .bind(request.status.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::Conflict(format!(
                "request `{id}` changed status while being edited"
            )));
        }

        tx.commit().await?;
        Ok(Request { updated_at: now, ..updated })
    }

    async fn history(
        &self,
        id: &RequestId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, request_id, status, changed_by, notes, changed_at
             FROM request_status_history
             WHERE request_id = ?
             ORDER BY changed_at ASC, rowid ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(history_from_row).collect()
    }

    async fn list_expirable(&self, today: NaiveDate) -> Result<Vec<Request>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM request
             WHERE status IN (?, ?) AND expiration_date < ?
             ORDER BY expiration_date ASC"
        ))
        .bind(RequestStatus::Submitted.as_str())
        .bind(RequestStatus::Approved.as_str())
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(request_from_row).collect()
    }

    async fn list_expired(&self) -> Result<Vec<Request>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM request WHERE status = ? ORDER BY expiration_date ASC"
        ))
        .bind(RequestStatus::Expired.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(request_from_row).collect()
    }
}

async fn insert_history(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    request_id: &RequestId,
    status: RequestStatus,
    changed_by: Option<&PrincipalId>,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO request_status_history
            (id, request_id, status, changed_by, notes, changed_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(new_id("HIST"))
    .bind(&request_id.0)
    .bind(status.as_str())
    .bind(changed_by.map(|id| id.0.as_str()))
    .bind(notes)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub(crate) fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", &Uuid::new_v4().simple().to_string()[..12])
}

pub(crate) fn request_from_row(row: &SqliteRow) -> Result<Request, RepositoryError> {
    let status_code: String = row.try_get("status").map_err(decode)?;
    let status = RequestStatus::parse(&status_code)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request status `{status_code}`")))?;
    let product_code: String = row.try_get("product_type").map_err(decode)?;
    let product_type = ProductType::parse(&product_code)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown product type `{product_code}`")))?;
    let quantity: i64 = row.try_get("quantity").map_err(decode)?;

    Ok(Request {
        id: RequestId(row.try_get("id").map_err(decode)?),
        owner_id: PrincipalId(row.try_get("owner_id").map_err(decode)?),
        product_type,
        quantity: u32::try_from(quantity)
            .map_err(|_| RepositoryError::Decode(format!("quantity out of range: {quantity}")))?,
        promised_delivery_date: row.try_get("promised_delivery_date").map_err(decode)?,
        expiration_date: row.try_get("expiration_date").map_err(decode)?,
        status,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

fn history_from_row(row: &SqliteRow) -> Result<StatusHistoryEntry, RepositoryError> {
    let status_code: String = row.try_get("status").map_err(decode)?;
    let status = RequestStatus::parse(&status_code)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request status `{status_code}`")))?;

    Ok(StatusHistoryEntry {
        id: row.try_get("id").map_err(decode)?,
        request_id: RequestId(row.try_get("request_id").map_err(decode)?),
        status,
        changed_by: row
            .try_get::<Option<String>, _>("changed_by")
            .map_err(decode)?
            .map(PrincipalId),
        notes: row.try_get("notes").map_err(decode)?,
        changed_at: row.try_get("changed_at").map_err(decode)?,
    })
}

fn decode(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}
