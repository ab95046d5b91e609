//! Step-back evaluation.
//!
//! After repeated failures of the same approach, retrying harder is the
//! wrong move. [`StepBackEvaluator`] decides when the failure budget is
//! spent and reframes the task for the advisor panel so the next attempt
//! uses a genuinely different approach.

use std::sync::Arc;
use tracing::info;

use sentra_core::{SessionId, Timestamp};
use sentra_events::{SessionBus, SessionEvent};

use crate::advisor::{AdvisorProposal, SystemSpec};
use crate::consensus::ConsensusOrchestrator;

/// Consecutive failures tolerated before a step-back is forced.
pub const MAX_FAILURES: u32 = 2;

/// Decides when to abandon the current approach and re-plan.
#[derive(Debug, Default)]
pub struct StepBackEvaluator {
    events: Option<(Arc<SessionBus>, SessionId)>,
}

impl StepBackEvaluator {
    /// Create an evaluator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a [`SessionEvent::StepBack`] whenever a step-back fires.
    #[must_use]
    pub fn with_events(mut self, bus: Arc<SessionBus>, session_id: SessionId) -> Self {
        self.events = Some((bus, session_id));
        self
    }

    /// Whether the consecutive failure count has exhausted the budget.
    #[must_use]
    pub fn should_step_back(&self, failure_count: u32) -> bool {
        failure_count >= MAX_FAILURES
    }

    /// Re-plan through the advisor panel, steering it away from the
    /// approach that keeps failing.
    pub async fn handle_step_back(
        &self,
        task: &str,
        failed_approach: &str,
        orchestrator: &ConsensusOrchestrator,
        spec: &SystemSpec,
    ) -> AdvisorProposal {
        info!(task, failed_approach, "stepping back to re-plan");
        if let Some((bus, session_id)) = &self.events {
            bus.publish(SessionEvent::StepBack {
                session_id: *session_id,
                failed_approach: failed_approach.to_string(),
                failure_count: MAX_FAILURES,
                timestamp: Timestamp::now(),
            });
        }
        let reframed = format!(
            "{task}\n\nThe approach \"{failed_approach}\" has failed repeatedly. \
             Propose a fundamentally different approach; do not repeat or lightly \
             modify the failed one."
        );
        orchestrator.propose(&reframed, spec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::{Advisor, EstimatedTime};
    use async_trait::async_trait;
    use sentra_risk::ModelResult;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_failure_budget_boundary() {
        let evaluator = StepBackEvaluator::new();
        assert!(!evaluator.should_step_back(0));
        assert!(!evaluator.should_step_back(1));
        assert!(evaluator.should_step_back(2));
        assert!(evaluator.should_step_back(3));
    }

    struct RecordingAdvisor {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Advisor for RecordingAdvisor {
        fn name(&self) -> &str {
            "recording"
        }

        async fn propose(&self, task: &str, _spec: &SystemSpec) -> ModelResult<AdvisorProposal> {
            self.seen.lock().unwrap().push(task.to_string());
            Ok(AdvisorProposal {
                approach: "use rsync instead".to_string(),
                reasoning: String::new(),
                estimated_time: EstimatedTime::Fast,
                required_deps: Vec::new(),
                confidence: 85,
            })
        }
    }

    #[tokio::test]
    async fn test_step_back_reframes_the_task() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = ConsensusOrchestrator::new(vec![Arc::new(RecordingAdvisor {
            seen: Arc::clone(&seen),
        })]);
        let spec = SystemSpec {
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
            shell: None,
            package_managers: Vec::new(),
        };

        let proposal = StepBackEvaluator::new()
            .handle_step_back("copy logs to backup", "cp -r /var/log /backup", &orchestrator, &spec)
            .await;

        assert_eq!(proposal.approach, "use rsync instead");
        let prompts = seen.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("copy logs to backup"));
        assert!(prompts[0].contains("cp -r /var/log /backup"));
        assert!(prompts[0].contains("fundamentally different"));
    }

    #[tokio::test]
    async fn test_step_back_publishes_an_event() {
        let bus = Arc::new(sentra_events::SessionBus::new());
        let session_id = sentra_core::SessionId::new();
        let mut rx = bus.subscribe();

        let orchestrator = ConsensusOrchestrator::new(vec![Arc::new(RecordingAdvisor {
            seen: Arc::new(Mutex::new(Vec::new())),
        })]);
        let spec = SystemSpec {
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
            shell: None,
            package_managers: Vec::new(),
        };

        let evaluator = StepBackEvaluator::new().with_events(Arc::clone(&bus), session_id);
        let _ = evaluator
            .handle_step_back("task", "failed approach", &orchestrator, &spec)
            .await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "step_back");
        assert_eq!(event.session_id(), session_id);
    }
}
