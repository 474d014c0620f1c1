use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use asahi::batching::{BatchScheduler, QueuedRequest, RequestQueue};
use asahi::config::BatchingSettings;
use asahi::provider::{BatchExecutor, ProviderResponse};
use asahi::{AsahiError, Result};

fn settings(max_batch: usize) -> BatchingSettings {
    BatchingSettings {
        min_batch_size: 2,
        max_batch_size: max_batch,
        max_wait_ms: 200,
        latency_threshold_ms: 50,
        eligible_task_types: vec!["faq".to_string(), "summarization".to_string()],
        poll_interval_ms: 10,
    }
}

fn response(text: &str) -> ProviderResponse {
    ProviderResponse {
        text: text.to_string(),
        input_tokens: 10,
        output_tokens: 20,
        latency_ms: 5,
    }
}

/// Records every batch it receives and answers each request in order.
struct RecordingExecutor {
    calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingExecutor {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchExecutor for RecordingExecutor {
    async fn execute(&self, batch: &[QueuedRequest]) -> Result<Vec<ProviderResponse>> {
        let ids: Vec<String> = batch.iter().map(|r| r.request_id.clone()).collect();
        self.calls.lock().unwrap().push(ids.clone());
        Ok(ids.iter().map(|id| response(&format!("resp-{id}"))).collect())
    }
}

fn enqueue(
    queue: &RequestQueue,
    id: &str,
    group: &str,
    deadline_ms: i64,
) -> asahi::batching::CompletionReceiver {
    let (request, rx) = QueuedRequest::new(
        id,
        format!("prompt {id}"),
        "sonnet",
        group,
        Utc::now() + chrono::Duration::milliseconds(deadline_ms),
    );
    queue.enqueue(request).unwrap();
    rx
}

#[tokio::test]
async fn full_group_flushes_as_one_batch_in_enqueue_order() {
    let queue = Arc::new(RequestQueue::new());
    let executor = Arc::new(RecordingExecutor::new());
    let scheduler = BatchScheduler::new(queue.clone(), executor.clone(), settings(5));
    scheduler.start().unwrap();

    let receivers: Vec<_> = (0..5)
        .map(|i| enqueue(&queue, &format!("r{i}"), "summarization:sonnet", 1000))
        .collect();

    for (i, rx) in receivers.into_iter().enumerate() {
        let result = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("handle must resolve")
            .expect("sender must not drop")
            .expect("batch must succeed");
        assert_eq!(result.text, format!("resp-r{i}"));
    }

    // One executor call with all five, in enqueue order.
    let calls = executor.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], vec!["r0", "r1", "r2", "r3", "r4"]);

    let stats = scheduler.stats();
    assert_eq!(stats.batches_executed, 1);
    assert_eq!(stats.requests_processed, 5);
    assert_eq!(stats.batch_errors, 0);

    scheduler.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn expired_deadline_flushes_partial_group() {
    let queue = Arc::new(RequestQueue::new());
    let executor = Arc::new(RecordingExecutor::new());
    let scheduler = BatchScheduler::new(queue.clone(), executor.clone(), settings(10));
    scheduler.start().unwrap();

    // One request with an already-passed deadline.
    let rx = enqueue(&queue, "lone", "faq:sonnet", -5);
    let result = tokio::time::timeout(Duration::from_secs(2), rx)
        .await
        .expect("handle must resolve")
        .unwrap()
        .unwrap();
    assert_eq!(result.text, "resp-lone");

    scheduler.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn near_deadline_flushes_min_sized_group() {
    let queue = Arc::new(RequestQueue::new());
    let executor = Arc::new(RecordingExecutor::new());
    // max_wait 200 * 0.7 = 140ms age triggers with >= 2 queued.
    let scheduler = BatchScheduler::new(queue.clone(), executor.clone(), settings(10));
    scheduler.start().unwrap();

    let rx1 = enqueue(&queue, "a", "faq:sonnet", 10_000);
    let rx2 = enqueue(&queue, "b", "faq:sonnet", 10_000);

    let (r1, r2) = tokio::join!(
        tokio::time::timeout(Duration::from_secs(2), rx1),
        tokio::time::timeout(Duration::from_secs(2), rx2),
    );
    assert!(r1.expect("resolve").unwrap().is_ok());
    assert!(r2.expect("resolve").unwrap().is_ok());

    let calls = executor.calls();
    assert_eq!(calls.len(), 1, "both requests should ride one batch");
    assert_eq!(calls[0], vec!["a", "b"]);

    scheduler.stop(Duration::from_secs(1)).await;
}

/// Fails any call with more than one request; individually fails a
/// configurable number of the retries.
struct FailingBatchExecutor {
    individual_failures_remaining: AtomicU32,
    individual_calls: AtomicU32,
}

impl FailingBatchExecutor {
    fn new(individual_failures: u32) -> Self {
        Self {
            individual_failures_remaining: AtomicU32::new(individual_failures),
            individual_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl BatchExecutor for FailingBatchExecutor {
    async fn execute(&self, batch: &[QueuedRequest]) -> Result<Vec<ProviderResponse>> {
        if batch.len() > 1 {
            return Err(AsahiError::Provider("batch endpoint down".to_string()));
        }
        self.individual_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.individual_failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.individual_failures_remaining
                .fetch_sub(1, Ordering::SeqCst);
            return Err(AsahiError::Provider("still down".to_string()));
        }
        Ok(vec![response(&batch[0].request_id)])
    }
}

#[tokio::test]
async fn batch_failure_retries_each_request_individually() {
    let queue = Arc::new(RequestQueue::new());
    // First individual retry fails, the remaining two succeed.
    let executor = Arc::new(FailingBatchExecutor::new(1));
    let scheduler = BatchScheduler::new(queue.clone(), executor.clone(), settings(3));
    scheduler.start().unwrap();

    let receivers: Vec<_> = (0..3)
        .map(|i| enqueue(&queue, &format!("r{i}"), "faq:sonnet", 1000))
        .collect();

    let mut outcomes = Vec::new();
    for rx in receivers {
        let resolved = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("every handle must resolve")
            .expect("sender must not drop");
        outcomes.push(resolved);
    }

    let failures = outcomes.iter().filter(|o| o.is_err()).count();
    let successes = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(failures, 1);
    assert_eq!(successes, 2);

    let stats = scheduler.stats();
    assert_eq!(stats.batch_errors, 1);
    assert_eq!(stats.individual_fallbacks, 2);
    assert_eq!(executor.individual_calls.load(Ordering::SeqCst), 3);

    scheduler.stop(Duration::from_secs(1)).await;
}

/// Returns fewer results than requests.
struct UndersizedExecutor;

#[async_trait]
impl BatchExecutor for UndersizedExecutor {
    async fn execute(&self, batch: &[QueuedRequest]) -> Result<Vec<ProviderResponse>> {
        Ok(batch
            .iter()
            .take(batch.len().saturating_sub(1))
            .map(|r| response(&r.request_id))
            .collect())
    }
}

#[tokio::test]
async fn short_result_list_fails_the_remainder() {
    let queue = Arc::new(RequestQueue::new());
    let scheduler = BatchScheduler::new(queue.clone(), Arc::new(UndersizedExecutor), settings(2));
    scheduler.start().unwrap();

    let rx1 = enqueue(&queue, "first", "faq:sonnet", 1000);
    let rx2 = enqueue(&queue, "second", "faq:sonnet", 1000);

    let first = tokio::time::timeout(Duration::from_secs(2), rx1)
        .await
        .unwrap()
        .unwrap();
    let second = tokio::time::timeout(Duration::from_secs(2), rx2)
        .await
        .unwrap()
        .unwrap();

    assert!(first.is_ok());
    let err = second.unwrap_err();
    assert_eq!(err.kind(), "batching");

    scheduler.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn double_start_is_rejected() {
    let queue = Arc::new(RequestQueue::new());
    let scheduler = BatchScheduler::new(queue, Arc::new(RecordingExecutor::new()), settings(5));
    scheduler.start().unwrap();
    let err = scheduler.start().unwrap_err();
    assert_eq!(err.kind(), "batching");
    scheduler.stop(Duration::from_secs(1)).await;
    assert!(!scheduler.is_running());
    // A stopped scheduler may be started again.
    scheduler.start().unwrap();
    scheduler.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn stop_drains_queued_requests() {
    let queue = Arc::new(RequestQueue::new());
    let executor = Arc::new(RecordingExecutor::new());
    let scheduler = BatchScheduler::new(queue.clone(), executor.clone(), settings(100));
    scheduler.start().unwrap();

    // min_batch_size 2 and generous deadlines: a single request would
    // sit until its deadline, but stop() must resolve it.
    let rx = enqueue(&queue, "straggler", "faq:sonnet", 60_000);
    scheduler.stop(Duration::from_secs(2)).await;

    let resolved = tokio::time::timeout(Duration::from_millis(100), rx)
        .await
        .expect("drain must resolve the handle")
        .unwrap();
    assert!(resolved.is_ok());
    assert_eq!(queue.size(None), 0);
}

#[tokio::test]
async fn groups_are_isolated() {
    let queue = Arc::new(RequestQueue::new());
    let executor = Arc::new(FailingBatchExecutor::new(0));
    let scheduler = BatchScheduler::new(queue.clone(), executor.clone(), settings(2));
    scheduler.start().unwrap();

    // Group A fails as a batch (size 2) then recovers individually;
    // group B flushes independently and must succeed untouched.
    let a1 = enqueue(&queue, "a1", "faq:sonnet", 1000);
    let a2 = enqueue(&queue, "a2", "faq:sonnet", 1000);
    let b1 = enqueue(&queue, "b1", "summarization:sonnet", -1);

    for rx in [a1, a2, b1] {
        let resolved = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("resolve")
            .unwrap();
        assert!(resolved.is_ok());
    }

    scheduler.stop(Duration::from_secs(1)).await;
}
