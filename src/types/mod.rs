//! Request, response, and classification types shared across the pipeline.

mod request;
mod response;
mod task;

pub use request::{CostSensitivity, InferenceRequest};
pub use response::{CacheTier, InferenceResult};
pub use task::TaskType;
