//! End-to-end lifecycle tests against a real SQLite database: every status
//! change flows through the same repository path the server uses, and the
//! ledger is checked after each step.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use procura_core::auth::{Principal, Role};
use procura_core::domain::request::{
    ProductType, Request, RequestDraft, RequestPatch, RequestStatus,
};
use procura_core::WorkflowError;
use procura_db::repositories::{
    ProposalRepository, RequestRepository, SqlProposalRepository, SqlRequestRepository,
};
use procura_db::{auto_close, auto_expire, connect_with_settings, migrations, DbPool};

async fn test_pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .expect("connect to test database");
    migrations::run_pending(&pool).await.expect("run migrations");
    pool
}

fn owner() -> Principal {
    Principal::new("u-owner", Role::EndUser)
}

fn admin() -> Principal {
    Principal::new("a-admin", Role::Admin)
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
}

async fn create_request(repo: &SqlRequestRepository, quantity: u32) -> Request {
    let draft = RequestDraft::new(ProductType::Hardware, quantity, day(10), day(20), day(1))
        .expect("valid draft");
    repo.create(&draft, &owner(), start()).await.expect("create request")
}

#[tokio::test]
async fn create_persists_the_row_and_the_initial_ledger_entry() {
    let pool = test_pool().await;
    let repo = SqlRequestRepository::new(pool);

    let request = create_request(&repo, 5).await;
    assert_eq!(request.status, RequestStatus::Submitted);
    assert_eq!(request.quantity, 5);

    let found = repo.find_by_id(&request.id).await.unwrap().expect("request exists");
    assert_eq!(found.owner_id, owner().id);

    let history = repo.history(&request.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, RequestStatus::Submitted);
    assert_eq!(history[0].changed_by.as_ref(), Some(&owner().id));
}

#[tokio::test]
async fn approval_requires_an_admin() {
    let pool = test_pool().await;
    let repo = SqlRequestRepository::new(pool);
    let request = create_request(&repo, 5).await;

    let err = repo
        .transition(&request.id, RequestStatus::Approved, Some(&owner()), None, start())
        .await
        .unwrap_err();
    assert!(matches!(err.as_domain(), Some(WorkflowError::Forbidden(_))));

    let approved = repo
        .transition(&request.id, RequestStatus::Approved, Some(&admin()), None, start())
        .await
        .unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);
}

#[tokio::test]
async fn repeating_a_transition_is_a_noop_with_no_ledger_entry() {
    let pool = test_pool().await;
    let repo = SqlRequestRepository::new(pool);
    let request = create_request(&repo, 5).await;

    repo.transition(&request.id, RequestStatus::Approved, Some(&admin()), None, start())
        .await
        .unwrap();
    let again = repo
        .transition(&request.id, RequestStatus::Approved, Some(&admin()), None, start())
        .await
        .unwrap();
    assert_eq!(again.status, RequestStatus::Approved);

    let history = repo.history(&request.id).await.unwrap();
    assert_eq!(history.len(), 2, "noop must not append to the ledger");
}

#[tokio::test]
async fn an_illegal_edge_leaves_no_trace() {
    let pool = test_pool().await;
    let repo = SqlRequestRepository::new(pool);
    let request = create_request(&repo, 5).await;

    // submitted -> closed_fulfilled is not an edge for anyone.
    let err = repo
        .transition(&request.id, RequestStatus::ClosedFulfilled, Some(&admin()), None, start())
        .await
        .unwrap_err();
    assert!(matches!(err.as_domain(), Some(WorkflowError::InvalidTransition { .. })));

    let found = repo.find_by_id(&request.id).await.unwrap().unwrap();
    assert_eq!(found.status, RequestStatus::Submitted);
    assert_eq!(repo.history(&request.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn rejected_requests_can_be_edited_and_resubmitted_by_their_owner() {
    let pool = test_pool().await;
    let repo = SqlRequestRepository::new(pool);
    let request = create_request(&repo, 5).await;
    repo.transition(&request.id, RequestStatus::Rejected, Some(&admin()), None, start())
        .await
        .unwrap();

    let patch = RequestPatch { quantity: Some(3), ..RequestPatch::default() };
    let edited =
        repo.update_fields(&request.id, &patch, &owner(), start() + Duration::hours(1)).await;
    assert_eq!(edited.unwrap().quantity, 3);

    // Admins may not edit fields, and may not resubmit either.
    let err = repo.update_fields(&request.id, &patch, &admin(), start()).await.unwrap_err();
    assert!(matches!(err.as_domain(), Some(WorkflowError::Forbidden(_))));
    let err = repo
        .transition(&request.id, RequestStatus::Submitted, Some(&admin()), None, start())
        .await
        .unwrap_err();
    assert!(matches!(err.as_domain(), Some(WorkflowError::Forbidden(_))));

    let resubmitted = repo
        .transition(&request.id, RequestStatus::Submitted, Some(&owner()), None, start())
        .await
        .unwrap();
    assert_eq!(resubmitted.status, RequestStatus::Submitted);
}

#[tokio::test]
async fn duplicate_proposal_maps_the_unique_violation() {
    let pool = test_pool().await;
    let requests = SqlRequestRepository::new(pool.clone());
    let proposals = SqlProposalRepository::new(pool);
    let request = create_request(&requests, 10).await;
    requests
        .transition(&request.id, RequestStatus::Approved, Some(&admin()), None, start())
        .await
        .unwrap();

    let supplier = Principal::new("s-1", Role::Supplier);
    proposals.create(&request.id, &supplier, 4, start()).await.unwrap();
    let err = proposals.create(&request.id, &supplier, 6, start()).await.unwrap_err();
    assert!(matches!(err.as_domain(), Some(WorkflowError::DuplicateProposal)));

    // The losing insert must not leave a row behind.
    let listed = proposals.list_for_request(&request.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].quantity, 4);
}

#[tokio::test]
async fn withdrawing_does_not_free_the_uniqueness_slot() {
    let pool = test_pool().await;
    let requests = SqlRequestRepository::new(pool.clone());
    let proposals = SqlProposalRepository::new(pool);
    let request = create_request(&requests, 10).await;
    requests
        .transition(&request.id, RequestStatus::Approved, Some(&admin()), None, start())
        .await
        .unwrap();

    let supplier = Principal::new("s-1", Role::Supplier);
    let proposal = proposals.create(&request.id, &supplier, 4, start()).await.unwrap();
    proposals.withdraw(&proposal.id, &supplier, start()).await.unwrap();

    let err = proposals.create(&request.id, &supplier, 4, start()).await.unwrap_err();
    assert!(matches!(err.as_domain(), Some(WorkflowError::DuplicateProposal)));
}

#[tokio::test]
async fn withdrawn_proposals_cannot_be_modified_or_rewithdrawn() {
    let pool = test_pool().await;
    let requests = SqlRequestRepository::new(pool.clone());
    let proposals = SqlProposalRepository::new(pool);
    let request = create_request(&requests, 10).await;
    requests
        .transition(&request.id, RequestStatus::Approved, Some(&admin()), None, start())
        .await
        .unwrap();

    let supplier = Principal::new("s-1", Role::Supplier);
    let proposal = proposals.create(&request.id, &supplier, 4, start()).await.unwrap();
    proposals.withdraw(&proposal.id, &supplier, start()).await.unwrap();

    let err = proposals.update_quantity(&proposal.id, &supplier, 9, start()).await.unwrap_err();
    assert!(matches!(err.as_domain(), Some(WorkflowError::Validation(_))));

    let err = proposals.withdraw(&proposal.id, &supplier, start()).await.unwrap_err();
    assert!(matches!(err.as_domain(), Some(WorkflowError::Validation(_))));

    // The row is untouched by the refused edits.
    let found = proposals.find_by_id(&proposal.id).await.unwrap().unwrap();
    assert_eq!(found.quantity, 4);
}

#[tokio::test]
async fn proposals_against_unapproved_requests_are_refused() {
    let pool = test_pool().await;
    let requests = SqlRequestRepository::new(pool.clone());
    let proposals = SqlProposalRepository::new(pool);
    let request = create_request(&requests, 10).await;

    let supplier = Principal::new("s-1", Role::Supplier);
    let err = proposals.create(&request.id, &supplier, 4, start()).await.unwrap_err();
    assert!(matches!(
        err.as_domain(),
        Some(WorkflowError::NotApproved { status: RequestStatus::Submitted })
    ));
}

#[tokio::test]
async fn full_lifecycle_from_submission_to_fulfilled_close() {
    let pool = test_pool().await;
    let requests = SqlRequestRepository::new(pool.clone());
    let proposals = SqlProposalRepository::new(pool);

    let request = create_request(&requests, 5).await;
    requests
        .transition(&request.id, RequestStatus::Approved, Some(&admin()), None, start())
        .await
        .unwrap();

    let supplier_a = Principal::new("s-1", Role::Supplier);
    let supplier_b = Principal::new("s-2", Role::Supplier);
    proposals.create(&request.id, &supplier_a, 3, start()).await.unwrap();
    proposals.create(&request.id, &supplier_b, 2, start()).await.unwrap();
    assert_eq!(proposals.total_counted_quantity(&request.id).await.unwrap(), 5);

    // Clock passes the expiration date; both sweeps run.
    let later = Utc.with_ymd_and_hms(2025, 6, 21, 0, 5, 0).unwrap();
    assert_eq!(auto_expire(&requests, later.date_naive(), later).await.unwrap(), 1);
    let outcome = auto_close(&requests, &proposals, later).await.unwrap();
    assert_eq!(outcome.fulfilled, 1);
    assert_eq!(outcome.unfulfilled, 0);

    let closed = requests.find_by_id(&request.id).await.unwrap().unwrap();
    assert_eq!(closed.status, RequestStatus::ClosedFulfilled);

    // Terminal means terminal: not even an admin can move it again.
    let err = requests
        .transition(&request.id, RequestStatus::Cancelled, Some(&admin()), None, later)
        .await
        .unwrap_err();
    assert!(matches!(err.as_domain(), Some(WorkflowError::InvalidTransition { .. })));

    // The ledger tells the whole story in order.
    let history = requests.history(&request.id).await.unwrap();
    let statuses: Vec<RequestStatus> = history.iter().map(|entry| entry.status).collect();
    assert_eq!(
        statuses,
        vec![
            RequestStatus::Submitted,
            RequestStatus::Approved,
            RequestStatus::Expired,
            RequestStatus::ClosedFulfilled,
        ]
    );
    assert!(history[2].is_system_action());
    assert!(history[3].is_system_action());
}

#[tokio::test]
async fn expired_requests_refuse_new_proposals() {
    let pool = test_pool().await;
    let requests = SqlRequestRepository::new(pool.clone());
    let proposals = SqlProposalRepository::new(pool);

    let request = create_request(&requests, 5).await;
    requests
        .transition(&request.id, RequestStatus::Approved, Some(&admin()), None, start())
        .await
        .unwrap();

    // Date-only comparison: the expiration day itself is already closed.
    let on_the_day = Utc.with_ymd_and_hms(2025, 6, 20, 0, 0, 1).unwrap();
    let supplier = Principal::new("s-1", Role::Supplier);
    let err = proposals.create(&request.id, &supplier, 1, on_the_day).await.unwrap_err();
    assert!(matches!(err.as_domain(), Some(WorkflowError::Expired)));
}

#[tokio::test]
async fn concurrent_suppliers_race_for_the_uniqueness_slot() {
    let pool = test_pool().await;
    let requests = SqlRequestRepository::new(pool.clone());
    let request = create_request(&requests, 10).await;
    requests
        .transition(&request.id, RequestStatus::Approved, Some(&admin()), None, start())
        .await
        .unwrap();

    let repo_a = std::sync::Arc::new(SqlProposalRepository::new(pool.clone()));
    let repo_b = repo_a.clone();
    let id_a = request.id.clone();
    let id_b = request.id.clone();
    let supplier = Principal::new("s-race", Role::Supplier);
    let supplier_b = supplier.clone();

    let (first, second) = tokio::join!(
        tokio::spawn(async move { repo_a.create(&id_a, &supplier, 4, start()).await }),
        tokio::spawn(async move { repo_b.create(&id_b, &supplier_b, 6, start()).await }),
    );
    let results = [first.unwrap(), second.unwrap()];
    let wins = results.iter().filter(|result| result.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|result| {
            matches!(
                result.as_ref().err().and_then(|err| err.as_domain()),
                Some(WorkflowError::DuplicateProposal)
            )
        })
        .count();
    assert_eq!(wins, 1);
    assert_eq!(duplicates, 1);

    let proposals = SqlProposalRepository::new(pool);
    assert_eq!(proposals.list_for_request(&request.id).await.unwrap().len(), 1);
}
