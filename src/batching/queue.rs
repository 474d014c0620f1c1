//! Thread-safe request queue for batch scheduling.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tracing::debug;

use crate::provider::ProviderResponse;
use crate::{AsahiError, Result};

/// Receiver half of a queued request's completion handle.
pub type CompletionReceiver = oneshot::Receiver<Result<ProviderResponse>>;

/// A single request waiting in the batch queue.
///
/// Carries a single-use completion handle; resolving consumes the
/// request. If the caller has already abandoned the wait, the resolved
/// result is discarded.
#[derive(Debug)]
pub struct QueuedRequest {
    pub request_id: String,
    pub prompt: String,
    /// Target model for inference.
    pub model: String,
    /// Key grouping compatible requests, e.g. `faq:claude-3-5-sonnet`.
    pub batch_group: String,
    pub enqueued_at: DateTime<Utc>,
    /// Must be dispatched by this time.
    pub deadline: DateTime<Utc>,
    completion: oneshot::Sender<Result<ProviderResponse>>,
}

impl QueuedRequest {
    /// Create a request and the receiver its caller awaits.
    pub fn new(
        request_id: impl Into<String>,
        prompt: impl Into<String>,
        model: impl Into<String>,
        batch_group: impl Into<String>,
        deadline: DateTime<Utc>,
    ) -> (Self, CompletionReceiver) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                request_id: request_id.into(),
                prompt: prompt.into(),
                model: model.into(),
                batch_group: batch_group.into(),
                enqueued_at: Utc::now(),
                deadline,
                completion: tx,
            },
            rx,
        )
    }

    /// Resolve the completion handle, consuming the request.
    ///
    /// A caller that stopped waiting drops its receiver; the result is
    /// then discarded.
    pub fn resolve(self, result: Result<ProviderResponse>) {
        let _ = self.completion.send(result);
    }
}

/// FIFO queue of pending requests, partitioned by batch group.
///
/// Every public method takes the single internal lock, so the queue is
/// safe for concurrent producers (request handlers) and the scheduler.
pub struct RequestQueue {
    inner: Mutex<QueueState>,
}

struct QueueState {
    groups: HashMap<String, VecDeque<QueuedRequest>>,
    // request_id -> group, for duplicate detection and removal
    index: HashMap<String, String>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueState {
                groups: HashMap::new(),
                index: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, QueueState>> {
        self.inner
            .lock()
            .map_err(|_| AsahiError::Batching("request queue lock poisoned".to_string()))
    }

    /// Add a request to its group.
    ///
    /// A request id already in the queue is rejected.
    pub fn enqueue(&self, request: QueuedRequest) -> Result<()> {
        let mut state = self.lock()?;
        if state.index.contains_key(&request.request_id) {
            return Err(AsahiError::Batching(format!(
                "request '{}' is already in the queue",
                request.request_id
            )));
        }
        state
            .index
            .insert(request.request_id.clone(), request.batch_group.clone());
        let group = request.batch_group.clone();
        let queue = state.groups.entry(group.clone()).or_default();
        queue.push_back(request);
        debug!(
            batch_group = %group,
            group_size = state.groups.get(&group).map(|q| q.len()).unwrap_or(0),
            "request enqueued"
        );
        Ok(())
    }

    /// Atomically pop up to `max_size` oldest requests from a group.
    ///
    /// Emptied groups are removed.
    pub fn get_batch(&self, group: &str, max_size: usize) -> Vec<QueuedRequest> {
        let Ok(mut state) = self.lock() else {
            return Vec::new();
        };
        let Some(queue) = state.groups.get_mut(group) else {
            return Vec::new();
        };
        let take = max_size.min(queue.len());
        let batch: Vec<QueuedRequest> = queue.drain(..take).collect();
        if queue.is_empty() {
            state.groups.remove(group);
        }
        for request in &batch {
            state.index.remove(&request.request_id);
        }
        debug!(group, batch_size = batch.len(), "batch popped");
        batch
    }

    /// Request ids in a group, oldest first, without removing them.
    pub fn peek(&self, group: &str, max_size: Option<usize>) -> Vec<String> {
        let Ok(state) = self.lock() else {
            return Vec::new();
        };
        let Some(queue) = state.groups.get(group) else {
            return Vec::new();
        };
        let take = max_size.unwrap_or(queue.len());
        queue.iter().take(take).map(|r| r.request_id.clone()).collect()
    }

    /// Whether any request in the group has passed its deadline.
    pub fn has_expired(&self, group: &str) -> bool {
        let now = Utc::now();
        let Ok(state) = self.lock() else {
            return false;
        };
        state
            .groups
            .get(group)
            .is_some_and(|queue| queue.iter().any(|r| r.deadline <= now))
    }

    /// Age of the oldest request in a group, in milliseconds.
    pub fn oldest_age_ms(&self, group: &str) -> u64 {
        let Ok(state) = self.lock() else {
            return 0;
        };
        state
            .groups
            .get(group)
            .and_then(|queue| queue.front())
            .map(|r| {
                (Utc::now() - r.enqueued_at)
                    .num_milliseconds()
                    .max(0) as u64
            })
            .unwrap_or(0)
    }

    /// Remove a specific request by id.
    ///
    /// The request's completion handle is dropped, which cancels its
    /// caller's wait.
    pub fn remove(&self, request_id: &str) -> bool {
        let Ok(mut state) = self.lock() else {
            return false;
        };
        let Some(group) = state.index.remove(request_id) else {
            return false;
        };
        if let Some(queue) = state.groups.get_mut(&group) {
            queue.retain(|r| r.request_id != request_id);
            if queue.is_empty() {
                state.groups.remove(&group);
            }
        }
        debug!(request_id, group = %group, "request removed");
        true
    }

    /// Number of queued requests, in one group or overall.
    pub fn size(&self, group: Option<&str>) -> usize {
        let Ok(state) = self.lock() else {
            return 0;
        };
        match group {
            Some(group) => state.groups.get(group).map(|q| q.len()).unwrap_or(0),
            None => state.groups.values().map(|q| q.len()).sum(),
        }
    }

    /// All non-empty group keys.
    pub fn all_groups(&self) -> Vec<String> {
        let Ok(state) = self.lock() else {
            return Vec::new();
        };
        state
            .groups
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(g, _)| g.clone())
            .collect()
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}
