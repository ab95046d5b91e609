//! Approval service.
//!
//! Turns an [`ActionClassification`] into a final approve/refuse
//! decision. Level A passes silently, level B asks for confirmation,
//! level C additionally demands the session PIN, and DENY is final.
//! Non-interactive sessions refuse anything that would need a prompt.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::engine::{ActionClassification, ApprovalLevel};

/// How the service resolves approvals it cannot grant automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalMode {
    /// Ask the user through the configured prompt.
    Interactive,
    /// No user available; anything needing a prompt is refused.
    NonInteractive,
    /// Approve everything that is not denied. For trusted automation only.
    AutoApprove,
}

/// Capability for asking the user.
#[async_trait]
pub trait ApprovalPrompt: Send + Sync {
    /// Yes/no confirmation.
    async fn confirm(&self, message: &str) -> bool;

    /// Ask for the session PIN. `None` when the user declines.
    async fn request_pin(&self, message: &str) -> Option<String>;
}

/// Outcome of an approval check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// The action may proceed.
    Approved,
    /// The action was refused.
    Refused {
        /// Why it was refused.
        reason: String,
    },
}

impl ApprovalDecision {
    fn refused(reason: impl Into<String>) -> Self {
        Self::Refused {
            reason: reason.into(),
        }
    }

    /// Whether the decision allows execution.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

/// Resolves classifications into approvals, prompting where required.
pub struct ApprovalService {
    mode: ApprovalMode,
    prompt: Option<Arc<dyn ApprovalPrompt>>,
    pin: Option<String>,
}

impl fmt::Debug for ApprovalService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalService")
            .field("mode", &self.mode)
            .field("has_prompt", &self.prompt.is_some())
            .field("has_pin", &self.pin.is_some())
            .finish()
    }
}

impl ApprovalService {
    /// Interactive service backed by a prompt.
    #[must_use]
    pub fn interactive(prompt: Arc<dyn ApprovalPrompt>) -> Self {
        Self {
            mode: ApprovalMode::Interactive,
            prompt: Some(prompt),
            pin: None,
        }
    }

    /// Non-interactive service. Levels B and C are always refused.
    #[must_use]
    pub fn non_interactive() -> Self {
        Self {
            mode: ApprovalMode::NonInteractive,
            prompt: None,
            pin: None,
        }
    }

    /// Auto-approving service for trusted automation.
    #[must_use]
    pub fn auto_approve() -> Self {
        Self {
            mode: ApprovalMode::AutoApprove,
            prompt: None,
            pin: None,
        }
    }

    /// Configure the PIN demanded for level C approvals.
    #[must_use]
    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(pin.into());
        self
    }

    /// Resolve one classification.
    pub async fn decide(&self, classification: &ActionClassification) -> ApprovalDecision {
        match classification.level {
            ApprovalLevel::Deny => {
                ApprovalDecision::refused(classification.reason.clone())
            },
            ApprovalLevel::A => ApprovalDecision::Approved,
            ApprovalLevel::B | ApprovalLevel::C => self.resolve_prompted(classification).await,
        }
    }

    async fn resolve_prompted(&self, classification: &ActionClassification) -> ApprovalDecision {
        match self.mode {
            ApprovalMode::AutoApprove => {
                info!(level = %classification.level, "auto-approve mode granted approval");
                ApprovalDecision::Approved
            },
            ApprovalMode::NonInteractive => ApprovalDecision::refused(
                "approval required but the session is non-interactive",
            ),
            ApprovalMode::Interactive => {
                let Some(prompt) = self.prompt.as_deref() else {
                    return ApprovalDecision::refused("no approval prompt is configured");
                };
                let message = classification
                    .prompt
                    .as_deref()
                    .unwrap_or("Approve this action?");
                if !prompt.confirm(message).await {
                    return ApprovalDecision::refused("user declined the action");
                }
                if classification.level == ApprovalLevel::C {
                    return self.check_pin(prompt).await;
                }
                ApprovalDecision::Approved
            },
        }
    }

    async fn check_pin(&self, prompt: &dyn ApprovalPrompt) -> ApprovalDecision {
        let Some(expected) = self.pin.as_deref() else {
            return ApprovalDecision::refused(
                "level C requires a session PIN but none is configured",
            );
        };
        let Some(entered) = prompt.request_pin("Enter the session PIN to approve").await else {
            return ApprovalDecision::refused("user declined to enter the PIN");
        };
        if entered.as_bytes().ct_eq(expected.as_bytes()).into() {
            ApprovalDecision::Approved
        } else {
            warn!("incorrect PIN entered for a level C approval");
            ApprovalDecision::refused("incorrect PIN")
        }
    }
}
