//! Asahi - cost-optimizing gateway for LLM inference
//!
//! Client applications submit prompts with quality, latency, and cost
//! constraints; the gateway selects the cheapest model that satisfies
//! them, serves repeated or semantically similar prompts from cache,
//! coalesces compatible prompts into provider batches, and records
//! per-request cost accounting.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use asahi::{Asahi, InferenceRequest, MockProvider};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> asahi::Result<()> {
//!     let gateway = Asahi::builder()
//!         .provider(Arc::new(MockProvider))
//!         .build()?;
//!     gateway.start()?;
//!
//!     let result = gateway
//!         .infer(
//!             InferenceRequest::new("What is the capital of France?")
//!                 .with_latency_budget_ms(500)
//!                 .with_quality_threshold(3.5),
//!         )
//!         .await?;
//!
//!     println!("{} (${:.6} via {})", result.response, result.cost, result.model_used);
//!     gateway.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod batching;
pub mod cache;
pub mod config;
pub mod embedding;
pub mod encryption;
pub mod error;
pub mod gateway;
pub mod provider;
pub mod registry;
pub mod routing;
pub mod similarity;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use config::Settings;
pub use error::{AsahiError, Result};
pub use gateway::{Asahi, AsahiBuilder, Gateway};
pub use provider::{BatchExecutor, InferenceProvider, MockProvider, ProviderResponse};
pub use registry::{ModelProfile, ModelRegistry};
pub use telemetry::{InferenceEvent, MetricsCollector};
pub use types::{CacheTier, CostSensitivity, InferenceRequest, InferenceResult, TaskType};
