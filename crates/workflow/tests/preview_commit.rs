use pantry_allocation::{AllocationItem, AllocationRefiner};
use pantry_protocol::{DonorOfferId, GeneralItemId, LineItemId, PartnerId, PartnerRequest};
use pantry_workflow::{
    AllocationBackend, MemoryAllocationBackend, SuggestionSession, WorkflowError,
};
use std::sync::Arc;

const OFFER: DonorOfferId = DonorOfferId(1);

fn item(id: i64, total: u32, requests: &[(i64, u32)]) -> AllocationItem {
    AllocationItem {
        general_item: GeneralItemId(id),
        title: format!("item {id}"),
        unit_type: None,
        total_quantity: total,
        requests: requests
            .iter()
            .map(|&(partner, quantity)| PartnerRequest::new(PartnerId(partner), quantity))
            .collect(),
    }
}

fn backend_with_lines(lines: &[(i64, i64)]) -> Arc<MemoryAllocationBackend> {
    let backend = Arc::new(MemoryAllocationBackend::new());
    for &(line, general_item) in lines {
        backend.insert_line(OFFER, LineItemId(line), GeneralItemId(general_item));
    }
    backend
}

fn session(backend: &Arc<MemoryAllocationBackend>) -> SuggestionSession {
    SuggestionSession::new(backend.clone(), AllocationRefiner::deterministic())
}

#[tokio::test]
async fn undo_leaves_persisted_state_identical_to_snapshot() {
    let backend = backend_with_lines(&[(1, 1), (2, 1)]);
    // seed one persisted allocation
    let distribution = backend
        .ensure_pending_distribution(PartnerId(9))
        .await
        .unwrap();
    backend
        .create_allocation(LineItemId(1), PartnerId(9), distribution)
        .await
        .unwrap();
    let before = backend.current_assignments(OFFER).await.unwrap();
    let distributions_before = backend.distributions();

    let mut session = session(&backend);
    let staged = session
        .preview(OFFER, &[item(1, 2, &[(7, 1), (8, 1)])])
        .await
        .unwrap();
    assert!(!staged.is_empty());

    session.undo().unwrap();

    assert_eq!(backend.current_assignments(OFFER).await.unwrap(), before);
    assert_eq!(backend.distributions(), distributions_before);
    assert!(!session.is_previewing());
}

#[tokio::test]
async fn preview_stages_without_touching_storage() {
    let backend = backend_with_lines(&[(1, 1), (2, 1)]);
    let before = backend.current_assignments(OFFER).await.unwrap();

    let mut session = session(&backend);
    let staged = session
        .preview(OFFER, &[item(1, 2, &[(7, 1), (8, 1)])])
        .await
        .unwrap()
        .to_vec();

    assert_eq!(staged.len(), 2);
    assert_eq!(backend.current_assignments(OFFER).await.unwrap(), before);
    assert!(backend.distributions().is_empty());
}

#[tokio::test]
async fn keep_commits_changed_pairs_and_builds_distributions() {
    let backend = backend_with_lines(&[(1, 1), (2, 1), (3, 2)]);
    let mut session = session(&backend);
    session
        .preview(
            OFFER,
            &[item(1, 2, &[(7, 1), (8, 1)]), item(2, 1, &[(7, 1)])],
        )
        .await
        .unwrap();

    let outcome = session.keep().await.unwrap();
    assert_eq!(outcome.applied, 3);
    assert!(outcome.failure.is_none());

    let assignments = backend.current_assignments(OFFER).await.unwrap();
    let partners: Vec<Option<i64>> = assignments
        .iter()
        .map(|a| a.partner.map(|p| p.0))
        .collect();
    assert_eq!(partners, vec![Some(7), Some(8), Some(7)]);

    // partner 7's two allocations share one pending distribution
    let distributions = backend.distributions();
    assert_eq!(distributions.len(), 2);
    let seven = distributions
        .iter()
        .find(|&&(_, partner, _)| partner == PartnerId(7))
        .unwrap();
    assert_eq!(seven.2, 2);
}

#[tokio::test]
async fn keep_releases_displaced_allocation_and_reclaims_empty_distribution() {
    let backend = backend_with_lines(&[(1, 1)]);
    let old = backend
        .ensure_pending_distribution(PartnerId(9))
        .await
        .unwrap();
    backend
        .create_allocation(LineItemId(1), PartnerId(9), old)
        .await
        .unwrap();

    let mut session = session(&backend);
    session
        .preview(OFFER, &[item(1, 1, &[(7, 1)])])
        .await
        .unwrap();
    let outcome = session.keep().await.unwrap();
    assert_eq!(outcome.applied, 1);

    let assignments = backend.current_assignments(OFFER).await.unwrap();
    assert_eq!(assignments[0].partner, Some(PartnerId(7)));

    // partner 9's distribution emptied out and was reclaimed
    let distributions = backend.distributions();
    assert_eq!(distributions.len(), 1);
    assert_eq!(distributions[0].1, PartnerId(7));
}

#[tokio::test]
async fn unchanged_pairs_are_not_recommitted() {
    let backend = backend_with_lines(&[(1, 1)]);
    let distribution = backend
        .ensure_pending_distribution(PartnerId(7))
        .await
        .unwrap();
    backend
        .create_allocation(LineItemId(1), PartnerId(7), distribution)
        .await
        .unwrap();

    let mut session = session(&backend);
    session
        .preview(OFFER, &[item(1, 1, &[(7, 1)])])
        .await
        .unwrap();
    let outcome = session.keep().await.unwrap();

    // the line already carries the suggested partner: nothing to commit
    assert_eq!(outcome.applied, 0);
    assert!(outcome.failure.is_none());
}

#[tokio::test]
async fn partial_failure_reports_applied_count_and_failing_index() {
    let backend = backend_with_lines(&[(1, 1), (2, 1), (3, 1)]);
    backend.fail_creates_after(2);

    let mut session = session(&backend);
    session
        .preview(OFFER, &[item(1, 3, &[(7, 2), (8, 1)])])
        .await
        .unwrap();

    let outcome = session.keep().await.unwrap();
    assert_eq!(outcome.applied, 2);
    let failure = outcome.failure.expect("expected a mid-sequence failure");
    assert_eq!(failure.index, 2);

    // earlier pairs stay committed: best-effort, not transactional
    let assignments = backend.current_assignments(OFFER).await.unwrap();
    let committed = assignments.iter().filter(|a| a.partner.is_some()).count();
    assert_eq!(committed, 2);
}

#[tokio::test]
async fn state_machine_rejects_out_of_order_calls() {
    let backend = backend_with_lines(&[(1, 1)]);
    let mut session = session(&backend);

    assert!(matches!(
        session.undo(),
        Err(WorkflowError::InvalidState(_))
    ));
    assert!(matches!(
        session.keep().await,
        Err(WorkflowError::InvalidState(_))
    ));

    session
        .preview(OFFER, &[item(1, 1, &[(7, 1)])])
        .await
        .unwrap();
    assert!(matches!(
        session.preview(OFFER, &[]).await,
        Err(WorkflowError::InvalidState(_))
    ));
}
