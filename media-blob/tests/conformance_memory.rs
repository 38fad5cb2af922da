use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use media_blob::{
    BlobConfig, BlobError, DefaultKeyStrategy, DefaultUploadCoordinator, MemoryObjectStore, MemoryTransferClient,
    MultipartSession, PartReceipt, PartTransferExecutor, SessionState, UploadCoordinator, UploadIntent, UploadRules,
};

const BUCKET: &str = "purely-public-assets";

/// Test factory functions
fn create_store() -> Arc<MemoryObjectStore> {
    Arc::new(MemoryObjectStore::new().with_min_part_size(5_000_000))
}

fn create_coordinator(store: Arc<MemoryObjectStore>, part_size: u64) -> DefaultUploadCoordinator {
    let config = BlobConfig::default()
        .with_upload_rules(UploadRules::default().with_part_size(part_size))
        .with_request_timeout(Duration::from_secs(5));
    DefaultUploadCoordinator::new(store, config)
}

fn create_intent(size: u64) -> UploadIntent {
    let keys = DefaultKeyStrategy::default();
    UploadIntent::prepare(&keys, BUCKET, "u1", "profile", "a.jpg", "image/jpeg", size).unwrap()
}

fn payload(size: usize) -> Bytes {
    Bytes::from((0..size).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
}

/// Upload every signed part through the memory store, like a client would.
async fn client_uploads(
    store: &Arc<MemoryObjectStore>,
    urls: &BTreeMap<u32, String>,
    data: Bytes,
    part_size: u64,
) -> Vec<PartReceipt> {
    let executor = PartTransferExecutor::new(
        Arc::new(MemoryTransferClient::new(store.clone())),
        4,
        Duration::from_secs(5),
    );
    let report = executor
        .transfer_all(urls, data, part_size, "image/jpeg")
        .await
        .unwrap();
    assert!(report.is_complete());
    report.part_receipts()
}

/// C1. End-to-end upload reads the size back from the store
#[tokio::test]
async fn test_end_to_end_size_is_read_back() {
    let store = create_store();
    let coordinator = create_coordinator(store.clone(), 5_000_000);
    let intent = create_intent(12_000_000);

    // Arrange: initiate and sign
    let mut session = coordinator.initiate(&intent).await.unwrap();
    assert_eq!(session.part_count(), 3);
    let plan = *session.plan().unwrap();
    assert_eq!(plan.part_len(1), Some(5_000_000));
    assert_eq!(plan.part_len(2), Some(5_000_000));
    assert_eq!(plan.part_len(3), Some(2_000_000));

    let signed = coordinator.sign_parts(&mut session, 3).await.unwrap();
    assert_eq!(signed.urls.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);

    // Act: client uploads, receipts arrive out of order, finalize
    let mut receipts = client_uploads(&store, &signed.urls, payload(12_000_000), 5_000_000).await;
    receipts.reverse();
    let finalized = coordinator.finalize(&mut session, &receipts).await.unwrap();

    // Assert: store-reported size and public url
    assert_eq!(finalized.size_bytes, 12_000_000);
    assert_eq!(finalized.url, format!("memory://{BUCKET}/{}", intent.key));
    assert_eq!(session.state(), SessionState::Finalized);
    assert_eq!(store.read_object(BUCKET, &intent.key.to_string()).unwrap().len(), 12_000_000);
}

/// C2. Missing part is rejected before the store is touched
#[tokio::test]
async fn test_incomplete_parts_do_not_reach_store() {
    let store = create_store();
    let coordinator = create_coordinator(store.clone(), 5_000_000);
    let mut session = coordinator.initiate(&create_intent(12_000_000)).await.unwrap();
    let signed = coordinator.sign_parts(&mut session, 3).await.unwrap();
    let receipts = client_uploads(&store, &signed.urls, payload(12_000_000), 5_000_000).await;

    // Act: drop part 2
    let partial: Vec<PartReceipt> = receipts.into_iter().filter(|r| r.part_number != 2).collect();
    let err = coordinator.finalize(&mut session, &partial).await.unwrap_err();

    // Assert
    match err {
        BlobError::IncompleteParts { missing } => assert_eq!(missing, vec![2]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.complete_calls(), 0);
    assert_eq!(store.object_count(), 0);
    assert_eq!(session.state(), SessionState::PartsSigned);
}

/// C3. Second finalize of the same session fails
#[tokio::test]
async fn test_finalize_twice_is_rejected() {
    let store = create_store();
    let coordinator = create_coordinator(store.clone(), 5_000_000);
    let intent = create_intent(6_000_000);
    let mut session = coordinator.initiate(&intent).await.unwrap();
    let signed = coordinator.sign_parts(&mut session, 2).await.unwrap();
    let receipts = client_uploads(&store, &signed.urls, payload(6_000_000), 5_000_000).await;

    coordinator.finalize(&mut session, &receipts).await.unwrap();

    // Act: same session again, locally rejected
    let err = coordinator.finalize(&mut session, &receipts).await.unwrap_err();
    assert!(matches!(err, BlobError::SessionClosed { .. }));
    assert_eq!(store.complete_calls(), 1);

    // Act: a resumed copy of the same upload id is rejected by the store
    let mut resumed = MultipartSession::resume(
        session.upload_id().as_str(),
        BUCKET,
        &intent.key.to_string(),
        2,
    )
    .unwrap();
    let err = coordinator.finalize(&mut resumed, &receipts).await.unwrap_err();
    assert!(matches!(err, BlobError::SessionClosed { .. }));
}

/// C4. Resumed session holds the client to the planned part count
#[tokio::test]
async fn test_resumed_session_enforces_planned_count() {
    let store = create_store();
    let coordinator = create_coordinator(store.clone(), 5_000_000);
    let intent = create_intent(12_000_000);
    let mut session = coordinator.initiate(&intent).await.unwrap();
    let signed = coordinator.sign_parts(&mut session, 3).await.unwrap();
    let receipts = client_uploads(&store, &signed.urls, payload(12_000_000), 5_000_000).await;

    let mut resumed =
        MultipartSession::resume(session.upload_id().as_str(), BUCKET, &intent.key.to_string(), 3).unwrap();

    // Gap: parts 1 and 3 only
    let gap: Vec<PartReceipt> = receipts.iter().filter(|r| r.part_number != 2).cloned().collect();
    let err = coordinator.finalize(&mut resumed, &gap).await.unwrap_err();
    assert!(matches!(err, BlobError::IncompleteParts { .. }));

    // Trailing part dropped: 1..=2 is contiguous but short of the plan
    let truncated: Vec<PartReceipt> = receipts.iter().filter(|r| r.part_number != 3).cloned().collect();
    let err = coordinator.finalize(&mut resumed, &truncated).await.unwrap_err();
    match err {
        BlobError::IncompleteParts { missing } => assert_eq!(missing, vec![3]),
        other => panic!("expected IncompleteParts, got {other:?}"),
    }
    assert_eq!(store.complete_calls(), 0);

    let finalized = coordinator.finalize(&mut resumed, &receipts).await.unwrap();
    assert_eq!(finalized.size_bytes, 12_000_000);
}

/// C5. Receipt validation: duplicates, out of range, empty tokens
#[tokio::test]
async fn test_receipt_integrity_errors() {
    let store = create_store();
    let coordinator = create_coordinator(store.clone(), 5_000_000);
    let mut session = coordinator.initiate(&create_intent(6_000_000)).await.unwrap();
    coordinator.sign_parts(&mut session, 2).await.unwrap();

    let duplicate = vec![PartReceipt::new(1, "a"), PartReceipt::new(1, "b"), PartReceipt::new(2, "c")];
    assert!(matches!(
        coordinator.finalize(&mut session, &duplicate).await.unwrap_err(),
        BlobError::DuplicatePart { part_number: 1 }
    ));

    let beyond = vec![PartReceipt::new(1, "a"), PartReceipt::new(2, "b"), PartReceipt::new(3, "c")];
    assert!(matches!(
        coordinator.finalize(&mut session, &beyond).await.unwrap_err(),
        BlobError::PartOutOfRange { part_number: 3, part_count: 2 }
    ));

    let empty_token = vec![PartReceipt::new(1, "a"), PartReceipt::new(2, " ")];
    assert!(matches!(
        coordinator.finalize(&mut session, &empty_token).await.unwrap_err(),
        BlobError::Invalid { .. }
    ));

    assert_eq!(store.complete_calls(), 0);
}

/// C6. State machine: finalize before signing fails fast
#[tokio::test]
async fn test_finalize_requires_signed_parts() {
    let store = create_store();
    let coordinator = create_coordinator(store.clone(), 5_000_000);
    let mut session = coordinator.initiate(&create_intent(1_000)).await.unwrap();
    assert_eq!(session.state(), SessionState::Initiated);

    let err = coordinator
        .finalize(&mut session, &[PartReceipt::new(1, "x")])
        .await
        .unwrap_err();
    assert!(matches!(err, BlobError::Invalid { .. }));
    assert_eq!(store.complete_calls(), 0);
}

/// C7. Part planning respects the store minimum
#[tokio::test]
async fn test_part_size_below_store_minimum_is_rejected() {
    let store = create_store();
    let coordinator = create_coordinator(store.clone(), 1_000_000);

    // Single-part uploads may be small
    assert!(coordinator.plan_parts(900_000, 1_000_000).is_ok());

    // Multi-part uploads may not
    let err = coordinator.initiate(&create_intent(3_000_000)).await.unwrap_err();
    assert!(matches!(err, BlobError::Invalid { .. }));
    assert_eq!(store.pending_uploads(), 0);
}

/// C8. Signing a different part count than planned is rejected
#[tokio::test]
async fn test_sign_parts_must_match_plan() {
    let store = create_store();
    let coordinator = create_coordinator(store, 5_000_000);
    let mut session = coordinator.initiate(&create_intent(12_000_000)).await.unwrap();

    assert!(coordinator.sign_parts(&mut session, 2).await.is_err());
    assert_eq!(session.state(), SessionState::Initiated);

    let signed = coordinator.sign_parts(&mut session, 3).await.unwrap();
    assert_eq!(session.state(), SessionState::PartsSigned);
    let expected = coordinator.config().url_expiry.as_secs() as i64;
    let remaining = (signed.expires_at - chrono::Utc::now()).num_seconds();
    assert!(remaining <= expected && remaining >= expected - 5);
}

/// C9. Abort discards the pending upload
#[tokio::test]
async fn test_abort_discards_upload() {
    let store = create_store();
    let coordinator = create_coordinator(store.clone(), 5_000_000);
    let mut session = coordinator.initiate(&create_intent(12_000_000)).await.unwrap();
    coordinator.sign_parts(&mut session, 3).await.unwrap();
    assert_eq!(store.pending_uploads(), 1);

    coordinator.abort(&session).await.unwrap();
    assert_eq!(store.pending_uploads(), 0);

    let err = coordinator.abort(&session).await.unwrap_err();
    assert!(matches!(err, BlobError::SessionClosed { .. }));
}

/// C10. Transfer failures name the part, not the signed URL
#[tokio::test]
async fn test_transfer_failures_do_not_leak_signed_urls() {
    // Arrange
    let store = create_store();
    let coordinator = create_coordinator(store.clone(), 5_000_000);
    let mut session = coordinator.initiate(&create_intent(12_000_000)).await.unwrap();
    let signed = coordinator.sign_parts(&mut session, 3).await.unwrap();
    let executor = PartTransferExecutor::new(
        Arc::new(MemoryTransferClient::new(store.clone()).failing_parts([2])),
        4,
        Duration::from_secs(5),
    );

    // Act
    let err = executor
        .upload_parts("a.jpg", &signed.urls, payload(12_000_000), 5_000_000, "image/jpeg")
        .await
        .unwrap_err();

    // Assert
    let report = match err {
        BlobError::PartsFailed { report, .. } => report,
        other => panic!("unexpected error: {other}"),
    };
    let reason = &report.failures[&2];
    assert!(reason.contains("part 2"), "{reason}");
    assert!(!reason.contains('?'), "{reason}");
    assert!(!reason.contains("uploadId"), "{reason}");
    assert!(!reason.contains(session.upload_id().as_str()), "{reason}");
    assert!(!reason.contains(signed.urls[&2].as_str()));
}
