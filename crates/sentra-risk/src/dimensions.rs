//! Risk dimensions and overall-risk bucketing.

use sentra_core::Environment;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Neutral baseline used for dimensions a heuristic pattern does not assert.
pub const NEUTRAL_BASELINE: u8 = 50;

/// Five independent risk scores in `0..=100`, plus the environment tag.
///
/// Produced once per candidate action and immutable afterwards. `confidence`
/// measures how sure the assessor is of its own scoring, not how safe the
/// action is: low confidence escalates the overall bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDimensions {
    /// How unusual the action is compared to everyday operations.
    pub uniqueness: u8,
    /// Structural complexity of the action.
    pub complexity: u8,
    /// How hard the action's effects are to undo.
    pub irreversibility: u8,
    /// Blast radius if the action misbehaves.
    pub consequences: u8,
    /// Assessor's confidence in the scoring.
    pub confidence: u8,
    /// Environment the action would run against.
    pub environment: Environment,
}

impl RiskDimensions {
    /// Create dimensions with all scores clamped to `0..=100`.
    #[must_use]
    pub fn new(
        uniqueness: u8,
        complexity: u8,
        irreversibility: u8,
        consequences: u8,
        confidence: u8,
        environment: Environment,
    ) -> Self {
        Self {
            uniqueness: uniqueness.min(100),
            complexity: complexity.min(100),
            irreversibility: irreversibility.min(100),
            consequences: consequences.min(100),
            confidence: confidence.min(100),
            environment,
        }
    }

    /// Neutral dimensions: every score at the baseline.
    #[must_use]
    pub fn neutral(environment: Environment) -> Self {
        Self::new(
            NEUTRAL_BASELINE,
            NEUTRAL_BASELINE,
            NEUTRAL_BASELINE,
            NEUTRAL_BASELINE,
            NEUTRAL_BASELINE,
            environment,
        )
    }

    /// Conservative defaults used when the model fallback times out or
    /// returns garbage: assume risk rather than assume safety.
    #[must_use]
    pub fn conservative_default(environment: Environment) -> Self {
        Self::new(
            NEUTRAL_BASELINE,
            NEUTRAL_BASELINE,
            70,
            70,
            30,
            environment,
        )
    }

    /// Bucket these dimensions into an overall risk level.
    ///
    /// Deterministic: critical when irreversibility or consequences reach 80;
    /// elevated when either reaches 50 or confidence drops below 60; trivial
    /// when all four impact dimensions stay at or below 15; normal otherwise.
    #[must_use]
    pub fn overall_risk(&self) -> OverallRisk {
        if self.irreversibility >= 80 || self.consequences >= 80 {
            return OverallRisk::Critical;
        }
        if self.irreversibility >= 50 || self.consequences >= 50 || self.confidence < 60 {
            return OverallRisk::Elevated;
        }
        if self.uniqueness <= 15
            && self.complexity <= 15
            && self.irreversibility <= 15
            && self.consequences <= 15
        {
            return OverallRisk::Trivial;
        }
        OverallRisk::Normal
    }

    /// Names of the dimensions that push this assessment to elevated.
    #[must_use]
    pub fn elevated_dimensions(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.irreversibility >= 50 {
            names.push("irreversibility");
        }
        if self.consequences >= 50 {
            names.push("consequences");
        }
        if self.confidence < 60 {
            names.push("confidence");
        }
        names
    }
}

/// Overall risk bucket derived from [`RiskDimensions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallRisk {
    /// Read-only, reversible, well-understood.
    Trivial,
    /// Routine change.
    Normal,
    /// Needs caution and a warning.
    Elevated,
    /// Irreversible or high-consequence; always confirmed.
    Critical,
}

impl fmt::Display for OverallRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trivial => write!(f, "trivial"),
            Self::Normal => write!(f, "normal"),
            Self::Elevated => write!(f, "elevated"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(
        uniqueness: u8,
        complexity: u8,
        irreversibility: u8,
        consequences: u8,
        confidence: u8,
    ) -> RiskDimensions {
        RiskDimensions::new(
            uniqueness,
            complexity,
            irreversibility,
            consequences,
            confidence,
            Environment::Dev,
        )
    }

    #[test]
    fn test_critical_on_irreversibility() {
        assert_eq!(dims(10, 10, 80, 10, 90).overall_risk(), OverallRisk::Critical);
    }

    #[test]
    fn test_critical_on_consequences() {
        assert_eq!(dims(10, 10, 10, 95, 90).overall_risk(), OverallRisk::Critical);
    }

    #[test]
    fn test_elevated_on_weighted_midrange() {
        // 80 would be critical; 50-79 on either impact dimension is elevated
        assert_eq!(dims(50, 50, 79, 79, 90).overall_risk(), OverallRisk::Elevated);
        assert_eq!(dims(50, 50, 60, 40, 80).overall_risk(), OverallRisk::Elevated);
    }

    #[test]
    fn test_elevated_on_low_confidence() {
        assert_eq!(dims(20, 20, 20, 20, 40).overall_risk(), OverallRisk::Elevated);
    }

    #[test]
    fn test_trivial_when_all_impact_low() {
        assert_eq!(dims(5, 5, 0, 0, 95).overall_risk(), OverallRisk::Trivial);
    }

    #[test]
    fn test_normal_otherwise() {
        assert_eq!(dims(30, 30, 20, 20, 85).overall_risk(), OverallRisk::Normal);
    }

    #[test]
    fn test_new_clamps_scores() {
        let d = RiskDimensions::new(200, 150, 101, 120, 255, Environment::Dev);
        assert_eq!(d.uniqueness, 100);
        assert_eq!(d.confidence, 100);
    }

    #[test]
    fn test_conservative_default_assumes_risk() {
        let d = RiskDimensions::conservative_default(Environment::Prod);
        assert_eq!(d.irreversibility, 70);
        assert_eq!(d.consequences, 70);
        assert_eq!(d.confidence, 30);
        assert_eq!(d.overall_risk(), OverallRisk::Elevated);
    }

    #[test]
    fn test_elevated_dimension_names() {
        let names = dims(10, 10, 60, 10, 40).elevated_dimensions();
        assert!(names.contains(&"irreversibility"));
        assert!(names.contains(&"confidence"));
        assert!(!names.contains(&"consequences"));
    }

    #[test]
    fn test_overall_risk_ordering() {
        assert!(OverallRisk::Trivial < OverallRisk::Normal);
        assert!(OverallRisk::Elevated < OverallRisk::Critical);
    }
}
