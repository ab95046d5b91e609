//! Propose-act-critique execution cycle.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use sentra_audit::{AuditAction, AuditEntry, AuditSink};
use sentra_core::{SessionId, Timestamp};
use sentra_events::{SessionBus, SessionEvent};
use sentra_risk::ModelAdapter;

/// Default bound on the verification model call.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// What the caller-supplied executor observed.
#[derive(Debug, Clone)]
pub struct ExecutorOutcome {
    /// Whether the action itself completed.
    pub success: bool,
    /// Captured output.
    pub output: String,
    /// Failure detail when `success` is false.
    pub error: Option<String>,
}

impl ExecutorOutcome {
    /// Successful outcome with output.
    #[must_use]
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    /// Failed outcome with an error message.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Capability that performs the action under governance.
///
/// The loop never constructs commands itself; it only drives the executor
/// the caller hands it.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Perform the action and report what happened.
    async fn run(&self) -> ExecutorOutcome;
}

/// Result of one PAC cycle.
#[derive(Debug, Clone)]
pub struct PacResult {
    /// Whether the cycle succeeded (executor succeeded and verification passed).
    pub success: bool,
    /// Output observed by the executor.
    pub output: String,
    /// Error detail for a failed cycle.
    pub error: Option<String>,
    /// Consecutive failure count after this cycle.
    pub failure_count: u32,
    /// The verifier's reasoning, when verification ran.
    pub verification_reasoning: Option<String>,
}

/// Shape of the verifier's JSON response.
#[derive(Debug, Deserialize)]
struct Verification {
    satisfied: bool,
    #[serde(default)]
    reasoning: String,
}

/// Drives one act-and-verify cycle per [`PacLoop::execute`] call.
///
/// The consecutive-failure counter is scoped to this instance; create one
/// loop per task/session and never share it across concurrent tasks.
pub struct PacLoop {
    model: Arc<dyn ModelAdapter>,
    verify_timeout: Duration,
    failure_count: u32,
    events: Option<(Arc<SessionBus>, SessionId)>,
    audit: Option<(Arc<dyn AuditSink>, SessionId)>,
}

impl std::fmt::Debug for PacLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacLoop")
            .field("verify_timeout", &self.verify_timeout)
            .field("failure_count", &self.failure_count)
            .finish()
    }
}

impl PacLoop {
    /// Create a loop backed by the given verification model.
    #[must_use]
    pub fn new(model: Arc<dyn ModelAdapter>) -> Self {
        Self {
            model,
            verify_timeout: DEFAULT_VERIFY_TIMEOUT,
            failure_count: 0,
            events: None,
            audit: None,
        }
    }

    /// Override the verification timeout.
    #[must_use]
    pub fn verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    /// Publish a [`SessionEvent::PacOutcome`] after every cycle.
    #[must_use]
    pub fn with_events(mut self, bus: Arc<SessionBus>, session_id: SessionId) -> Self {
        self.events = Some((bus, session_id));
        self
    }

    /// Record every cycle outcome to the audit trail.
    #[must_use]
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>, session_id: SessionId) -> Self {
        self.audit = Some((sink, session_id));
        self
    }

    /// Current consecutive failure count.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Reset the failure counter when a new top-level task begins.
    pub fn reset(&mut self) {
        self.failure_count = 0;
    }

    /// Run one act-and-verify cycle.
    ///
    /// Executor failure returns immediately with the executor's error.
    /// Executor success is verified against `success_criteria`; an
    /// unsatisfied verdict counts as a failure and carries the verifier's
    /// reasoning. The loop itself never retries.
    pub async fn execute(
        &mut self,
        goal: &str,
        success_criteria: &str,
        executor: &dyn ToolExecutor,
    ) -> PacResult {
        let outcome = executor.run().await;

        if !outcome.success {
            self.failure_count = self.failure_count.saturating_add(1);
            let result = PacResult {
                success: false,
                output: outcome.output,
                error: outcome.error,
                failure_count: self.failure_count,
                verification_reasoning: None,
            };
            self.publish_outcome(goal, &result);
            return result;
        }

        let result = match self.verify(goal, success_criteria, &outcome.output).await {
            Some(verification) if verification.satisfied => {
                self.failure_count = 0;
                PacResult {
                    success: true,
                    output: outcome.output,
                    error: None,
                    failure_count: 0,
                    verification_reasoning: Some(verification.reasoning),
                }
            },
            Some(verification) => {
                self.failure_count = self.failure_count.saturating_add(1);
                PacResult {
                    success: false,
                    output: outcome.output,
                    error: Some(format!("Verification failed: {}", verification.reasoning)),
                    failure_count: self.failure_count,
                    verification_reasoning: Some(verification.reasoning),
                }
            },
            None => {
                // Verifier unavailable: trust the executor's own report
                // rather than failing a successful action.
                warn!(goal, "verification unavailable, trusting executor result");
                self.failure_count = 0;
                PacResult {
                    success: true,
                    output: outcome.output,
                    error: None,
                    failure_count: 0,
                    verification_reasoning: None,
                }
            },
        };
        self.publish_outcome(goal, &result);
        result
    }

    fn publish_outcome(&self, goal: &str, result: &PacResult) {
        if let Some((bus, session_id)) = &self.events {
            bus.publish(SessionEvent::PacOutcome {
                session_id: *session_id,
                goal: goal.to_string(),
                success: result.success,
                failure_count: result.failure_count,
                timestamp: Timestamp::now(),
            });
        }
        if let Some((sink, session_id)) = &self.audit {
            let entry = AuditEntry::new(
                *session_id,
                AuditAction::PacOutcome {
                    goal: goal.to_string(),
                    success: result.success,
                    failure_count: result.failure_count,
                    reasoning: result.verification_reasoning.clone(),
                },
            );
            if let Err(error) = sink.record(&entry) {
                warn!(%error, "failed to record audit entry");
            }
        }
    }

    async fn verify(&self, goal: &str, criteria: &str, output: &str) -> Option<Verification> {
        let prompt = format!(
            "Goal: \"{goal}\"\n\
             Success Criteria: \"{criteria}\"\n\
             Action Output:\n\"{output}\"\n\n\
             Analyze the output. Does it satisfy the success criteria for the given goal?\n\
             Respond in JSON:\n{{\n  \"satisfied\": true | false,\n  \"reasoning\": \"brief explanation\"\n}}"
        );

        let text = match tokio::time::timeout(self.verify_timeout, self.model.generate(&prompt))
            .await
        {
            Ok(Ok(text)) => text,
            Ok(Err(error)) => {
                warn!(%error, "verification model call failed");
                return None;
            },
            Err(_) => {
                warn!(timeout = ?self.verify_timeout, "verification timed out");
                return None;
            },
        };

        let start = text.find('{')?;
        let end = text.rfind('}')?;
        if end < start {
            return None;
        }
        match serde_json::from_str::<Verification>(&text[start..=end]) {
            Ok(verification) => {
                debug!(
                    satisfied = verification.satisfied,
                    "verification verdict received"
                );
                Some(verification)
            },
            Err(error) => {
                warn!(%error, "verification response was not valid JSON");
                None
            },
        }
    }
}
