use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use media_blob::{BlobError, BlobResult, PartTransferExecutor, Stage, TransferClient};

/// Client that fails chosen parts and tracks peak concurrency.
#[derive(Default)]
struct ScriptedClient {
    fail: Vec<u32>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

fn part_of(url: &str) -> u32 {
    url.rsplit('/').next().and_then(|n| n.parse().ok()).unwrap_or(0)
}

#[async_trait]
impl TransferClient for ScriptedClient {
    async fn put_part(&self, url: &str, body: Bytes, _content_type: &str) -> BlobResult<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        let part = part_of(url);
        // Failing part finishes first so siblings are still running when it fails
        let delay = if self.fail.contains(&part) { 1 } else { 20 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail.contains(&part) {
            Err(BlobError::store_message(Stage::Transfer, url, "connection reset"))
        } else {
            Ok(format!("etag-{part}-{}", body.len()))
        }
    }
}

fn urls(count: u32) -> BTreeMap<u32, String> {
    (1..=count).map(|n| (n, format!("https://store.test/part/{n}"))).collect()
}

/// T1. One failing part does not cancel its siblings
#[tokio::test]
async fn test_failed_part_is_reported_with_siblings_complete() {
    let client = Arc::new(ScriptedClient {
        fail: vec![3],
        ..Default::default()
    });
    let executor = PartTransferExecutor::new(client.clone(), 8, Duration::from_secs(5));

    let report = executor
        .transfer_all(&urls(5), Bytes::from(vec![7u8; 50]), 10, "image/jpeg")
        .await
        .unwrap();

    assert_eq!(report.receipts.len(), 4);
    assert_eq!(report.failed_parts(), vec![3]);
    assert!(report.receipts.values().all(|t| !t.is_empty()));
    assert_eq!(client.calls.load(Ordering::SeqCst), 5);

    let err = executor
        .upload_parts("k", &urls(5), Bytes::from(vec![7u8; 50]), 10, "image/jpeg")
        .await
        .unwrap_err();
    match err {
        BlobError::PartsFailed { report, .. } => {
            assert_eq!(report.receipts.len(), 4);
            assert!(report.failures.contains_key(&3));
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// T2. Parts are sliced by the plan; last part is shorter
#[tokio::test]
async fn test_parts_are_sliced_by_plan() {
    let client = Arc::new(ScriptedClient::default());
    let executor = PartTransferExecutor::new(client, 8, Duration::from_secs(5));

    let tokens = executor
        .upload_parts("k", &urls(3), Bytes::from(vec![1u8; 25]), 10, "image/jpeg")
        .await
        .unwrap();

    assert_eq!(tokens.get(&1).map(String::as_str), Some("etag-1-10"));
    assert_eq!(tokens.get(&2).map(String::as_str), Some("etag-2-10"));
    assert_eq!(tokens.get(&3).map(String::as_str), Some("etag-3-5"));
}

/// T3. In-flight transfers never exceed the bound
#[tokio::test]
async fn test_in_flight_is_bounded() {
    let client = Arc::new(ScriptedClient::default());
    let executor = PartTransferExecutor::new(client.clone(), 2, Duration::from_secs(5));

    executor
        .upload_parts("k", &urls(6), Bytes::from(vec![0u8; 60]), 10, "image/jpeg")
        .await
        .unwrap();

    assert!(client.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(client.calls.load(Ordering::SeqCst), 6);
}

/// T4. Url set must match the payload's plan
#[tokio::test]
async fn test_url_set_must_match_plan() {
    let client = Arc::new(ScriptedClient::default());
    let executor = PartTransferExecutor::new(client.clone(), 2, Duration::from_secs(5));

    let err = executor
        .transfer_all(&urls(2), Bytes::from(vec![0u8; 30]), 10, "image/jpeg")
        .await
        .unwrap_err();
    assert!(matches!(err, BlobError::Invalid { .. }));
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
}

/// T5. A part exceeding its deadline is a failure, not a hang
#[tokio::test]
async fn test_slow_part_times_out() {
    struct Stuck;

    #[async_trait]
    impl TransferClient for Stuck {
        async fn put_part(&self, _url: &str, _body: Bytes, _content_type: &str) -> BlobResult<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("late".to_string())
        }
    }

    let executor = PartTransferExecutor::new(Arc::new(Stuck), 2, Duration::from_millis(20));
    let report = executor
        .transfer_all(&urls(1), Bytes::from_static(b"abc"), 10, "image/jpeg")
        .await
        .unwrap();

    assert_eq!(report.failed_parts(), vec![1]);
    assert!(report.failures[&1].contains("timed out"));
}
