//! Advisor consensus.
//!
//! [`ConsensusOrchestrator`] fans a task out to its advisor panel in
//! parallel, bounds each advisor with a timeout, and picks a winner by
//! confidence. A sufficiently confident proposal short-circuits the rest
//! of the panel.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::advisor::{Advisor, AdvisorProposal, EstimatedTime, SystemSpec};

/// Per-advisor time budget.
pub const DEFAULT_ADVISOR_TIMEOUT: Duration = Duration::from_secs(15);

/// Confidence at which the first finished proposal wins outright.
pub const EARLY_RETURN_CONFIDENCE: u8 = 80;

/// Confidence reported by the last-resort fallback proposal.
const FALLBACK_CONFIDENCE: u8 = 30;

/// Runs an advisor panel and selects the winning proposal.
pub struct ConsensusOrchestrator {
    advisors: Vec<Arc<dyn Advisor>>,
    advisor_timeout: Duration,
    early_return_confidence: u8,
}

impl std::fmt::Debug for ConsensusOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusOrchestrator")
            .field("advisors", &self.advisors.len())
            .field("advisor_timeout", &self.advisor_timeout)
            .finish()
    }
}

impl ConsensusOrchestrator {
    /// Create an orchestrator over the given panel.
    #[must_use]
    pub fn new(advisors: Vec<Arc<dyn Advisor>>) -> Self {
        Self {
            advisors,
            advisor_timeout: DEFAULT_ADVISOR_TIMEOUT,
            early_return_confidence: EARLY_RETURN_CONFIDENCE,
        }
    }

    /// Override the per-advisor timeout.
    #[must_use]
    pub fn advisor_timeout(mut self, timeout: Duration) -> Self {
        self.advisor_timeout = timeout;
        self
    }

    /// Override the early-return confidence threshold.
    #[must_use]
    pub fn early_return_confidence(mut self, confidence: u8) -> Self {
        self.early_return_confidence = confidence;
        self
    }

    /// Run the panel and return the winning proposal.
    ///
    /// The first proposal to finish at or above the early-return threshold
    /// wins and the remaining advisors are abandoned. Otherwise proposals
    /// are ranked by confidence, then by speed. If every advisor fails or
    /// times out, a low-confidence direct-execution fallback is returned.
    pub async fn propose(&self, task: &str, spec: &SystemSpec) -> AdvisorProposal {
        if self.advisors.is_empty() {
            return fallback(task);
        }

        let mut set = JoinSet::new();
        for advisor in &self.advisors {
            let advisor = Arc::clone(advisor);
            let task = task.to_string();
            let spec = spec.clone();
            let timeout = self.advisor_timeout;
            set.spawn(async move {
                let name = advisor.name().to_string();
                let outcome =
                    tokio::time::timeout(timeout, advisor.propose(&task, &spec)).await;
                (name, outcome)
            });
        }

        let mut proposals: Vec<AdvisorProposal> = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (name, outcome) = match joined {
                Ok(pair) => pair,
                Err(error) => {
                    warn!(%error, "advisor task panicked");
                    continue;
                },
            };
            match outcome {
                Ok(Ok(proposal)) => {
                    debug!(
                        advisor = %name,
                        confidence = proposal.confidence,
                        "advisor finished"
                    );
                    if proposal.confidence >= self.early_return_confidence {
                        info!(advisor = %name, "early consensus reached");
                        set.abort_all();
                        return proposal;
                    }
                    proposals.push(proposal);
                },
                Ok(Err(error)) => warn!(advisor = %name, %error, "advisor failed"),
                Err(_) => warn!(advisor = %name, "advisor timed out"),
            }
        }

        proposals.sort_by(|a, b| {
            b.confidence
                .cmp(&a.confidence)
                .then(b.estimated_time.speed_rank().cmp(&a.estimated_time.speed_rank()))
        });

        proposals.into_iter().next().unwrap_or_else(|| {
            warn!(task, "no advisor produced a proposal, falling back");
            fallback(task)
        })
    }
}

fn fallback(task: &str) -> AdvisorProposal {
    AdvisorProposal {
        approach: "Direct execution".to_string(),
        reasoning: format!("No advisor produced a usable proposal for \"{task}\""),
        estimated_time: EstimatedTime::Medium,
        required_deps: Vec::new(),
        confidence: FALLBACK_CONFIDENCE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sentra_risk::{ModelError, ModelResult};

    struct StaticAdvisor {
        name: &'static str,
        proposal: Option<AdvisorProposal>,
        delay: Duration,
    }

    impl StaticAdvisor {
        fn new(name: &'static str, approach: &str, confidence: u8, time: EstimatedTime) -> Self {
            Self {
                name,
                proposal: Some(AdvisorProposal {
                    approach: approach.to_string(),
                    reasoning: String::new(),
                    estimated_time: time,
                    required_deps: Vec::new(),
                    confidence,
                }),
                delay: Duration::ZERO,
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                name,
                proposal: None,
                delay: Duration::ZERO,
            }
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl Advisor for StaticAdvisor {
        fn name(&self) -> &str {
            self.name
        }

        async fn propose(&self, _task: &str, _spec: &SystemSpec) -> ModelResult<AdvisorProposal> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.proposal
                .clone()
                .ok_or_else(|| ModelError::Transport("advisor offline".to_string()))
        }
    }

    fn spec() -> SystemSpec {
        SystemSpec {
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
            shell: Some("bash".to_string()),
            package_managers: Vec::new(),
        }
    }

    fn panel(advisors: Vec<StaticAdvisor>) -> ConsensusOrchestrator {
        ConsensusOrchestrator::new(
            advisors
                .into_iter()
                .map(|a| Arc::new(a) as Arc<dyn Advisor>)
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_highest_confidence_wins() {
        let orchestrator = panel(vec![
            StaticAdvisor::new("a", "slow plan", 60, EstimatedTime::Slow),
            StaticAdvisor::new("b", "better plan", 70, EstimatedTime::Medium),
        ]);

        let winner = orchestrator.propose("do a thing", &spec()).await;
        assert_eq!(winner.approach, "better plan");
    }

    #[tokio::test]
    async fn test_speed_breaks_confidence_ties() {
        let orchestrator = panel(vec![
            StaticAdvisor::new("a", "slow plan", 70, EstimatedTime::Slow),
            StaticAdvisor::new("b", "fast plan", 70, EstimatedTime::Fast),
        ]);

        let winner = orchestrator.propose("do a thing", &spec()).await;
        assert_eq!(winner.approach, "fast plan");
    }

    #[tokio::test]
    async fn test_confident_proposal_short_circuits_slow_advisor() {
        let orchestrator = panel(vec![
            StaticAdvisor::new("fast", "confident plan", 90, EstimatedTime::Fast),
            StaticAdvisor::new("slow", "never seen", 95, EstimatedTime::Fast)
                .delayed(Duration::from_secs(30)),
        ])
        .advisor_timeout(Duration::from_secs(60));

        let start = std::time::Instant::now();
        let winner = orchestrator.propose("do a thing", &spec()).await;
        assert_eq!(winner.approach, "confident plan");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_all_failures_yield_fallback() {
        let orchestrator = panel(vec![
            StaticAdvisor::failing("a"),
            StaticAdvisor::failing("b"),
        ]);

        let winner = orchestrator.propose("do a thing", &spec()).await;
        assert_eq!(winner.approach, "Direct execution");
        assert_eq!(winner.confidence, 30);
    }

    #[tokio::test]
    async fn test_timed_out_advisor_is_skipped() {
        let orchestrator = panel(vec![
            StaticAdvisor::new("slow", "late plan", 99, EstimatedTime::Fast)
                .delayed(Duration::from_secs(30)),
            StaticAdvisor::new("ok", "on-time plan", 50, EstimatedTime::Medium),
        ])
        .advisor_timeout(Duration::from_millis(100));

        let winner = orchestrator.propose("do a thing", &spec()).await;
        assert_eq!(winner.approach, "on-time plan");
    }

    #[tokio::test]
    async fn test_empty_panel_falls_back() {
        let orchestrator = ConsensusOrchestrator::new(Vec::new());
        let winner = orchestrator.propose("do a thing", &spec()).await;
        assert_eq!(winner.approach, "Direct execution");
    }
}
