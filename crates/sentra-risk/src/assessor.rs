//! Risk assessment of candidate actions.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use sentra_core::Environment;

use crate::dimensions::{OverallRisk, RiskDimensions, NEUTRAL_BASELINE};
use crate::model::ModelAdapter;
use crate::patterns::match_common_pattern;
use crate::router::ExecutionStrategy;

/// Default confidence below which a heuristic match is not trusted on its own.
pub const DEFAULT_CONFIDENCE_THRESHOLD: u8 = 40;

/// Default bound on the model fallback call.
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(10);

/// Historical context for similar commands, supplied by the caller's
/// history tracker.
#[derive(Debug, Clone, Default)]
pub struct HistoryContext {
    /// Recent successes of similar commands.
    pub similar_successes: u32,
    /// Recent failures of similar commands.
    pub similar_failures: u32,
    /// Signed adjustment applied to the confidence dimension.
    pub confidence_adjustment: i16,
    /// Explanation of the adjustment, appended to the assessment reasoning.
    pub reasoning: String,
}

/// Per-assessment input context.
#[derive(Debug, Clone)]
pub struct AssessContext {
    /// Environment the command would run against.
    pub environment: Environment,
    /// Optional history-based confidence adjustment.
    pub history: Option<HistoryContext>,
}

impl AssessContext {
    /// Context with no history signal.
    #[must_use]
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            history: None,
        }
    }

    /// Attach a history signal.
    #[must_use]
    pub fn with_history(mut self, history: HistoryContext) -> Self {
        self.history = Some(history);
        self
    }
}

/// Outcome of assessing one candidate action.
///
/// Owned by the caller for the lifetime of one decision; never mutated.
#[derive(Debug, Clone)]
pub struct RiskAssessment {
    /// The five scored dimensions plus environment.
    pub dimensions: RiskDimensions,
    /// Derived overall bucket.
    pub overall: OverallRisk,
    /// How the assessment was reached.
    pub reasoning: String,
    /// Strategy the router would pick for this bucket.
    pub suggested_strategy: ExecutionStrategy,
}

/// Scores candidate actions across five risk dimensions.
///
/// Heuristics first: the ordered pattern table resolves the common cases
/// without any suspension. When no pattern matches, or the match is below
/// the confidence threshold, the configured [`ModelAdapter`] is consulted
/// under a timeout; if that fails too, conservative defaults apply.
pub struct RiskAssessor {
    model: Option<Arc<dyn ModelAdapter>>,
    confidence_threshold: u8,
    model_timeout: Duration,
}

impl std::fmt::Debug for RiskAssessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskAssessor")
            .field("has_model", &self.model.is_some())
            .field("confidence_threshold", &self.confidence_threshold)
            .field("model_timeout", &self.model_timeout)
            .finish()
    }
}

/// Shape of the model fallback response. Tolerant of missing fields;
/// anything absent falls back to the neutral baseline.
#[derive(Debug, Deserialize)]
struct FallbackResponse {
    #[serde(default)]
    uniqueness: Option<f64>,
    #[serde(default)]
    complexity: Option<f64>,
    #[serde(default)]
    irreversibility: Option<f64>,
    #[serde(default)]
    consequences: Option<f64>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn score(value: Option<f64>) -> u8 {
    value.map_or(NEUTRAL_BASELINE, |v| v.round().clamp(0.0, 100.0) as u8)
}

impl RiskAssessor {
    /// Assessor with no model fallback: unmatched commands degrade straight
    /// to conservative defaults.
    #[must_use]
    pub fn heuristic_only() -> Self {
        Self {
            model: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            model_timeout: DEFAULT_MODEL_TIMEOUT,
        }
    }

    /// Assessor with a model fallback for commands the table cannot score.
    #[must_use]
    pub fn with_model(model: Arc<dyn ModelAdapter>) -> Self {
        Self {
            model: Some(model),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            model_timeout: DEFAULT_MODEL_TIMEOUT,
        }
    }

    /// Override the heuristic confidence threshold.
    #[must_use]
    pub fn confidence_threshold(mut self, threshold: u8) -> Self {
        self.confidence_threshold = threshold.min(100);
        self
    }

    /// Override the model call timeout.
    #[must_use]
    pub fn model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    /// Score a command using the heuristic table only.
    ///
    /// Returns `None` when no pattern matches. Unset dimensions of a partial
    /// override default to the neutral baseline.
    #[must_use]
    pub fn assess_heuristic(
        command: &str,
        environment: Environment,
    ) -> Option<(RiskDimensions, &'static str)> {
        let pattern = match_common_pattern(command)?;
        let o = pattern.dimensions;
        let dims = RiskDimensions::new(
            o.uniqueness.unwrap_or(NEUTRAL_BASELINE),
            o.complexity.unwrap_or(NEUTRAL_BASELINE),
            o.irreversibility.unwrap_or(NEUTRAL_BASELINE),
            o.consequences.unwrap_or(NEUTRAL_BASELINE),
            o.confidence.unwrap_or(NEUTRAL_BASELINE),
            environment,
        );
        Some((dims, pattern.name))
    }

    /// Assess a candidate command.
    ///
    /// Pure apart from the single bounded model call; safe to invoke
    /// concurrently from multiple tasks.
    pub async fn assess(&self, command: &str, context: &AssessContext) -> RiskAssessment {
        let environment = context.environment;

        let (mut dimensions, mut reasoning) =
            match Self::assess_heuristic(command, environment) {
                Some((dims, name)) if dims.confidence >= self.confidence_threshold => {
                    (dims, format!("Matched known pattern: {name}"))
                },
                low_confidence_match => {
                    if let Some((_, name)) = low_confidence_match {
                        debug!(pattern = name, "heuristic match below confidence threshold");
                    }
                    self.assess_with_model(command, environment).await
                },
            };

        if let Some(history) = &context.history {
            dimensions = apply_confidence_adjustment(dimensions, history.confidence_adjustment);
            if !history.reasoning.is_empty() {
                reasoning.push_str("; ");
                reasoning.push_str(&history.reasoning);
            }
        }

        let overall = dimensions.overall_risk();
        RiskAssessment {
            dimensions,
            overall,
            reasoning,
            suggested_strategy: ExecutionStrategy::for_risk(overall),
        }
    }

    /// Model fallback, degrading to conservative defaults on any failure.
    async fn assess_with_model(
        &self,
        command: &str,
        environment: Environment,
    ) -> (RiskDimensions, String) {
        let Some(model) = &self.model else {
            return conservative(environment, "no model fallback configured");
        };

        let prompt = fallback_prompt(command, environment);
        let generated =
            match tokio::time::timeout(self.model_timeout, model.generate(&prompt)).await {
                Ok(Ok(text)) => text,
                Ok(Err(error)) => {
                    warn!(%error, "model fallback failed");
                    return conservative(environment, "model fallback failed");
                },
                Err(_) => {
                    warn!(timeout = ?self.model_timeout, "model fallback timed out");
                    return conservative(environment, "model fallback timed out");
                },
            };

        let Some(parsed) = extract_json::<FallbackResponse>(&generated) else {
            warn!("model fallback returned unparseable output");
            return conservative(environment, "model response was not valid JSON");
        };

        let dims = RiskDimensions::new(
            score(parsed.uniqueness),
            score(parsed.complexity),
            score(parsed.irreversibility),
            score(parsed.consequences),
            score(parsed.confidence),
            environment,
        );
        let reasoning = parsed
            .reasoning
            .filter(|r| !r.is_empty())
            .map_or_else(|| "Model assessment".to_string(), |r| format!("Model assessment: {r}"));
        (dims, reasoning)
    }
}

fn conservative(environment: Environment, why: &str) -> (RiskDimensions, String) {
    (
        RiskDimensions::conservative_default(environment),
        format!("Conservative defaults applied: {why}"),
    )
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn apply_confidence_adjustment(dims: RiskDimensions, adjustment: i16) -> RiskDimensions {
    let adjusted = i32::from(dims.confidence)
        .saturating_add(i32::from(adjustment))
        .clamp(0, 100) as u8;
    RiskDimensions {
        confidence: adjusted,
        ..dims
    }
}

/// Extract and parse the first JSON object embedded in model output.
///
/// Models frequently wrap JSON in prose or code fences; take everything
/// between the first `{` and the last `}`.
fn extract_json<T: serde::de::DeserializeOwned>(text: &str) -> Option<T> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn fallback_prompt(command: &str, environment: Environment) -> String {
    format!(
        "Assess the risk of executing this shell command in the {environment} environment.\n\
         Command: {command}\n\n\
         Score each dimension from 0 to 100 and respond with JSON only:\n\
         {{\"uniqueness\": n, \"complexity\": n, \"irreversibility\": n, \
         \"consequences\": n, \"confidence\": n, \"reasoning\": \"brief explanation\"}}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::CannedModel;

    #[test]
    fn test_heuristic_matches_known_pattern() {
        let (dims, _) = RiskAssessor::assess_heuristic("ls -la", Environment::Dev).unwrap();
        assert_eq!(dims.confidence, 95);
        assert_eq!(dims.irreversibility, 0);
    }

    #[test]
    fn test_heuristic_partial_override_uses_baseline() {
        let (dims, _) =
            RiskAssessor::assess_heuristic("sudo apt upgrade", Environment::Dev).unwrap();
        // sudo asserts nothing about uniqueness or complexity
        assert_eq!(dims.uniqueness, NEUTRAL_BASELINE);
        assert_eq!(dims.complexity, NEUTRAL_BASELINE);
        assert_eq!(dims.irreversibility, 70);
    }

    #[tokio::test]
    async fn test_trivial_command_fast_path() {
        let assessor = RiskAssessor::heuristic_only();
        let assessment = assessor
            .assess("ls -la", &AssessContext::new(Environment::Dev))
            .await;

        assert_eq!(assessment.overall, OverallRisk::Trivial);
        assert_eq!(assessment.suggested_strategy, ExecutionStrategy::FastPath);
        assert!(assessment.reasoning.contains("Matched known pattern"));
        assert_eq!(assessment.dimensions.environment, Environment::Dev);
    }

    #[tokio::test]
    async fn test_model_fallback_when_heuristic_misses() {
        let model = Arc::new(CannedModel::new(
            r#"{"uniqueness": 90, "complexity": 80, "irreversibility": 100,
                "consequences": 100, "confidence": 20, "reasoning": "Highly destructive"}"#,
        ));
        let assessor = RiskAssessor::with_model(model);
        let assessment = assessor
            .assess("custom destroy op", &AssessContext::new(Environment::Prod))
            .await;

        assert!(assessment.reasoning.contains("Highly destructive"));
        assert_eq!(assessment.overall, OverallRisk::Critical);
        assert_eq!(
            assessment.suggested_strategy,
            ExecutionStrategy::PlanSnapshot
        );
    }

    #[tokio::test]
    async fn test_model_fallback_tolerates_prose_wrapping() {
        let model = Arc::new(CannedModel::new(
            "Here is my assessment:\n```json\n{\"irreversibility\": 10, \
             \"consequences\": 10, \"confidence\": 85}\n```",
        ));
        let assessor = RiskAssessor::with_model(model);
        let assessment = assessor
            .assess("terraform plan", &AssessContext::new(Environment::Dev))
            .await;

        assert_eq!(assessment.dimensions.irreversibility, 10);
        // missing dimensions default to the neutral baseline
        assert_eq!(assessment.dimensions.uniqueness, NEUTRAL_BASELINE);
    }

    #[tokio::test]
    async fn test_model_timeout_degrades_conservatively() {
        let model = Arc::new(CannedModel {
            response: r#"{"confidence": 99}"#.to_string(),
            delay: Some(Duration::from_secs(60)),
        });
        let assessor =
            RiskAssessor::with_model(model).model_timeout(Duration::from_millis(10));
        let assessment = assessor
            .assess("mystery-binary --force", &AssessContext::new(Environment::Dev))
            .await;

        assert_eq!(assessment.dimensions.irreversibility, 70);
        assert_eq!(assessment.dimensions.consequences, 70);
        assert_eq!(assessment.dimensions.confidence, 30);
        assert!(assessment.reasoning.contains("Conservative defaults"));
    }

    #[tokio::test]
    async fn test_unparseable_model_output_degrades_conservatively() {
        let model = Arc::new(CannedModel::new("I cannot assess this command."));
        let assessor = RiskAssessor::with_model(model);
        let assessment = assessor
            .assess("mystery-binary", &AssessContext::new(Environment::Staging))
            .await;

        assert_eq!(assessment.dimensions.confidence, 30);
        assert_eq!(assessment.overall, OverallRisk::Elevated);
    }

    #[tokio::test]
    async fn test_no_model_configured_degrades_conservatively() {
        let assessor = RiskAssessor::heuristic_only();
        let assessment = assessor
            .assess("mystery-binary", &AssessContext::new(Environment::Dev))
            .await;
        assert_eq!(assessment.dimensions.irreversibility, 70);
    }

    #[tokio::test]
    async fn test_history_adjustment_lowers_confidence() {
        let assessor = RiskAssessor::heuristic_only();
        let context = AssessContext::new(Environment::Dev).with_history(HistoryContext {
            similar_successes: 0,
            similar_failures: 5,
            confidence_adjustment: -15,
            reasoning: "Similar command failed 5/5 times recently".to_string(),
        });
        let assessment = assessor.assess("rm -rf /tmp/test", &context).await;

        assert!(assessment.dimensions.confidence < 60);
        assert!(assessment.reasoning.contains("failed 5/5 times"));
    }

    #[test]
    fn test_confidence_adjustment_clamps() {
        let dims = RiskDimensions::neutral(Environment::Dev);
        assert_eq!(apply_confidence_adjustment(dims, -200).confidence, 0);
        assert_eq!(apply_confidence_adjustment(dims, 200).confidence, 100);
    }

    #[tokio::test]
    async fn test_rm_rf_root_is_critical() {
        let assessor = RiskAssessor::heuristic_only();
        let assessment = assessor
            .assess("rm -rf /", &AssessContext::new(Environment::Dev))
            .await;

        assert!(assessment.dimensions.irreversibility >= 95);
        assert_eq!(assessment.overall, OverallRisk::Critical);
        assert_eq!(
            assessment.suggested_strategy,
            ExecutionStrategy::PlanSnapshot
        );
    }
}
