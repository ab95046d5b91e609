//! Event payloads carried on the session bus.

use sentra_core::{SessionId, Timestamp};
use serde::{Deserialize, Serialize};

/// A governance notification published on a [`crate::SessionBus`].
///
/// Variants use plain string fields rather than the richer types of the
/// policy and risk crates so that this crate stays at the bottom of the
/// dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum SessionEvent {
    /// An action was classified by the policy engine.
    Classification {
        /// Session that produced the classification.
        session_id: SessionId,
        /// The command that was classified.
        command: String,
        /// Approval level as a display string (`A`/`B`/`C`/`DENY`).
        level: String,
        /// Whether the action was approved without blocking confirmation.
        approved: bool,
        /// Human-readable reason.
        reason: String,
        /// When the classification was made.
        timestamp: Timestamp,
    },
    /// A PAC execute-and-verify cycle completed.
    PacOutcome {
        /// Session that ran the cycle.
        session_id: SessionId,
        /// The goal that was attempted.
        goal: String,
        /// Whether the cycle succeeded.
        success: bool,
        /// Consecutive failure count after this cycle.
        failure_count: u32,
        /// When the cycle finished.
        timestamp: Timestamp,
    },
    /// Repeated failure forced a strategy re-selection.
    StepBack {
        /// Session that stepped back.
        session_id: SessionId,
        /// The approach that failed.
        failed_approach: String,
        /// Failure count that triggered the step-back.
        failure_count: u32,
        /// When the step-back fired.
        timestamp: Timestamp,
    },
}

impl SessionEvent {
    /// Short name of the event kind, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Classification { .. } => "classification",
            Self::PacOutcome { .. } => "pac_outcome",
            Self::StepBack { .. } => "step_back",
        }
    }

    /// Session the event belongs to.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Classification { session_id, .. }
            | Self::PacOutcome { session_id, .. }
            | Self::StepBack { session_id, .. } => *session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind() {
        let event = SessionEvent::StepBack {
            session_id: SessionId::new(),
            failed_approach: "direct".to_string(),
            failure_count: 2,
            timestamp: Timestamp::now(),
        };
        assert_eq!(event.kind(), "step_back");
    }

    #[test]
    fn test_event_serialization_tags() {
        let session_id = SessionId::new();
        let event = SessionEvent::PacOutcome {
            session_id,
            goal: "build".to_string(),
            success: true,
            failure_count: 0,
            timestamp: Timestamp::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"pac_outcome\""));
        let back: SessionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.session_id(), session_id);
    }
}
