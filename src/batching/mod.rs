//! Batching subsystem.
//!
//! Compatible requests are coalesced into provider batches: the
//! [`BatchEngine`] decides eligibility and assigns a batch group, the
//! [`RequestQueue`] holds waiting requests per group, and the
//! [`BatchScheduler`] flushes groups to the executor when size or
//! deadline thresholds are met. Each queued request carries a
//! single-use completion handle its caller awaits; the scheduler
//! guarantees every handle is resolved, even across batch failures and
//! shutdown.

mod engine;
mod queue;
mod scheduler;

pub use engine::{BatchEligibility, BatchEngine};
pub use queue::{CompletionReceiver, QueuedRequest, RequestQueue};
pub use scheduler::{BatchScheduler, SchedulerStats};
