//! Execution-strategy routing.
//!
//! [`route_execution`] is a pure function from a [`crate::RiskAssessment`]
//! to a [`RoutingDecision`]: identical input always yields identical output.
//! The "CRITICAL OPERATION" and "CRITICAL" marker substrings in critical
//! decisions are a stable contract consumers key UI treatment off.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::assessor::RiskAssessment;
use crate::dimensions::OverallRisk;

/// Default retry budget for the iterate strategy.
pub const ITERATE_MAX_RETRIES: u32 = 3;

/// How an approved action should be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ExecutionStrategy {
    /// Execute immediately, no ceremony.
    FastPath,
    /// Show the user what would happen before executing.
    Preview,
    /// Execute with verification and a bounded retry budget.
    Iterate {
        /// Maximum number of retries before stepping back.
        max_retries: u32,
    },
    /// Plan, snapshot state, then execute with rollback available.
    PlanSnapshot,
}

impl ExecutionStrategy {
    /// Strategy the router selects for a given overall risk bucket.
    #[must_use]
    pub fn for_risk(risk: OverallRisk) -> Self {
        match risk {
            OverallRisk::Trivial => Self::FastPath,
            OverallRisk::Normal => Self::Preview,
            OverallRisk::Elevated => Self::Iterate {
                max_retries: ITERATE_MAX_RETRIES,
            },
            OverallRisk::Critical => Self::PlanSnapshot,
        }
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FastPath => write!(f, "fast-path"),
            Self::Preview => write!(f, "preview"),
            Self::Iterate { max_retries } => write!(f, "iterate(max_retries={max_retries})"),
            Self::PlanSnapshot => write!(f, "plan-snapshot"),
        }
    }
}

/// Routing outcome: strategy plus confirmation and warning obligations.
///
/// Derived, never stored: recomputable from the assessment at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Selected execution strategy.
    pub strategy: ExecutionStrategy,
    /// Whether the user must explicitly confirm before execution.
    pub requires_confirmation: bool,
    /// Message shown when confirmation is required.
    pub confirmation_message: Option<String>,
    /// Whether a non-blocking warning should be surfaced.
    pub should_warn: bool,
    /// Warning text.
    pub warning_message: Option<String>,
}

/// Map an assessment to its routing decision.
#[must_use]
pub fn route_execution(assessment: &RiskAssessment) -> RoutingDecision {
    let dims = &assessment.dimensions;
    match assessment.overall {
        OverallRisk::Trivial => RoutingDecision {
            strategy: ExecutionStrategy::FastPath,
            requires_confirmation: false,
            confirmation_message: None,
            should_warn: false,
            warning_message: None,
        },
        OverallRisk::Normal => {
            let requires_confirmation = dims.environment.is_prod();
            RoutingDecision {
                strategy: ExecutionStrategy::Preview,
                requires_confirmation,
                confirmation_message: requires_confirmation.then(|| {
                    "This change targets the production environment. Proceed?".to_string()
                }),
                should_warn: false,
                warning_message: None,
            }
        },
        OverallRisk::Elevated => RoutingDecision {
            strategy: ExecutionStrategy::Iterate {
                max_retries: ITERATE_MAX_RETRIES,
            },
            requires_confirmation: false,
            confirmation_message: None,
            should_warn: true,
            warning_message: Some(format!(
                "Elevated risk ({}): proceeding with verification and bounded retries",
                dims.elevated_dimensions().join(", ")
            )),
        },
        OverallRisk::Critical => RoutingDecision {
            strategy: ExecutionStrategy::PlanSnapshot,
            requires_confirmation: true,
            confirmation_message: Some(format!(
                "CRITICAL OPERATION: {}. A snapshot will be taken before execution. Proceed?",
                assessment.reasoning
            )),
            should_warn: true,
            warning_message: Some(
                "CRITICAL: this action is irreversible or high-consequence".to_string(),
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::RiskDimensions;
    use sentra_core::Environment;

    fn assessment(overall: OverallRisk, dims: RiskDimensions) -> RiskAssessment {
        RiskAssessment {
            dimensions: dims,
            overall,
            reasoning: "test".to_string(),
            suggested_strategy: ExecutionStrategy::for_risk(overall),
        }
    }

    fn base_dims(environment: Environment) -> RiskDimensions {
        RiskDimensions::new(10, 10, 10, 10, 90, environment)
    }

    #[test]
    fn test_trivial_routes_to_fast_path() {
        let decision = route_execution(&assessment(
            OverallRisk::Trivial,
            base_dims(Environment::Dev),
        ));
        assert_eq!(decision.strategy, ExecutionStrategy::FastPath);
        assert!(!decision.requires_confirmation);
        assert!(!decision.should_warn);
    }

    #[test]
    fn test_normal_requires_confirmation_only_in_prod() {
        let dev = route_execution(&assessment(
            OverallRisk::Normal,
            base_dims(Environment::Dev),
        ));
        assert_eq!(dev.strategy, ExecutionStrategy::Preview);
        assert!(!dev.requires_confirmation);

        let prod = route_execution(&assessment(
            OverallRisk::Normal,
            base_dims(Environment::Prod),
        ));
        assert!(prod.requires_confirmation);
        assert!(prod.confirmation_message.is_some());
    }

    #[test]
    fn test_elevated_iterates_and_warns() {
        let dims = RiskDimensions::new(10, 10, 60, 10, 90, Environment::Dev);
        let decision = route_execution(&assessment(OverallRisk::Elevated, dims));
        assert_eq!(
            decision.strategy,
            ExecutionStrategy::Iterate { max_retries: 3 }
        );
        assert!(decision.should_warn);
        let warning = decision.warning_message.unwrap();
        assert!(warning.contains("Elevated risk"));
        assert!(warning.contains("irreversibility"));
    }

    #[test]
    fn test_critical_markers_are_stable() {
        let dims = RiskDimensions::new(10, 10, 90, 95, 55, Environment::Dev);
        let decision = route_execution(&assessment(OverallRisk::Critical, dims));
        assert_eq!(decision.strategy, ExecutionStrategy::PlanSnapshot);
        assert!(decision.requires_confirmation);
        assert!(decision
            .confirmation_message
            .as_deref()
            .is_some_and(|m| m.contains("CRITICAL OPERATION")));
        assert!(decision
            .warning_message
            .as_deref()
            .is_some_and(|m| m.contains("CRITICAL")));
    }

    #[test]
    fn test_routing_is_deterministic() {
        let a = assessment(OverallRisk::Elevated, base_dims(Environment::Staging));
        assert_eq!(route_execution(&a), route_execution(&a));
    }

    #[test]
    fn test_strategy_serialization_tags() {
        let json = serde_json::to_string(&ExecutionStrategy::FastPath).unwrap();
        assert!(json.contains("\"type\":\"fast-path\""));
        let json = serde_json::to_string(&ExecutionStrategy::Iterate { max_retries: 3 }).unwrap();
        assert!(json.contains("\"type\":\"iterate\""));
    }
}
