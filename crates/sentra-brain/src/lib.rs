//! Sentra Brain - the propose-act-critique control loop.
//!
//! [`PacLoop`] executes one act-and-verify cycle: run a caller-supplied
//! executor, then ask a model-backed verifier whether the observed output
//! satisfies the success criteria. The loop never retries on its own;
//! repeated failure is handled by [`StepBackEvaluator`], which forces a
//! strategy re-selection through the [`ConsensusOrchestrator`] and its
//! [`Advisor`] capabilities instead of blind retry.
//!
//! [`HistoryTracker`] records action outcomes and feeds confidence
//! adjustments back into risk assessment for similar future commands.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod advisor;
pub mod consensus;
pub mod history;
pub mod pac;
pub mod step_back;

pub use advisor::{Advisor, AdvisorKind, AdvisorProposal, EstimatedTime, ModelAdvisor, SystemSpec};
pub use consensus::ConsensusOrchestrator;
pub use history::{ActionOutcome, HistoryError, HistoryTracker, OutcomeKind};
pub use pac::{ExecutorOutcome, PacLoop, PacResult, ToolExecutor};
pub use step_back::StepBackEvaluator;
