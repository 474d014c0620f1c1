//! Routing subsystem.
//!
//! Three pieces: the [`ConstraintInterpreter`] turns human preferences
//! into numeric constraints, the [`TaskDetector`] classifies prompts so
//! task-specific overrides and thresholds can apply, and the [`Router`]
//! runs filter-score-select over the model registry.

mod constraints;
mod detector;
mod router;

pub use constraints::{
    ConstraintInterpreter, LatencyPreference, QualityPreference, RoutingConstraints,
    RoutingDecision,
};
pub use detector::{TaskDetection, TaskDetector};
pub use router::{ExplicitDecision, ModelAlternative, Router};
