//! Sentra Risk - risk assessment and execution routing.
//!
//! A candidate action (usually a shell command) is scored across five
//! independent 0-100 dimensions by [`RiskAssessor`]: a fast ordered table of
//! regex heuristics first, with a model-based fallback when no heuristic
//! matches confidently. The resulting [`RiskAssessment`] is bucketed into an
//! [`OverallRisk`] and routed by [`route_execution`] to one of four
//! [`ExecutionStrategy`] variants together with confirmation and warning
//! obligations.
//!
//! Assessment and routing are pure apart from the single bounded model
//! call; they hold no shared state and are safe to run concurrently.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod assessor;
pub mod dimensions;
pub mod model;
pub mod patterns;
pub mod router;

pub use assessor::{AssessContext, HistoryContext, RiskAssessment, RiskAssessor};
pub use dimensions::{OverallRisk, RiskDimensions, NEUTRAL_BASELINE};
pub use model::{ModelAdapter, ModelError, ModelResult};
pub use patterns::{match_common_pattern, DimensionOverride, RiskPattern};
pub use router::{route_execution, ExecutionStrategy, RoutingDecision};
