//! Audit entry types.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use sentra_core::{SessionId, Timestamp};
use sentra_policy::ActionClassification;

/// Unique identifier for an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditEntryId(pub Uuid);

impl AuditEntryId {
    /// Create a new random entry ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AuditEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuditEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "audit:{}", self.0)
    }
}

/// What happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditAction {
    /// The policy engine classified an action.
    Classification {
        /// Command that was classified.
        command: String,
        /// Full classification verdict.
        classification: ActionClassification,
    },
    /// A PAC cycle finished.
    PacOutcome {
        /// Goal of the cycle.
        goal: String,
        /// Whether the cycle succeeded.
        success: bool,
        /// Consecutive failure count after the cycle.
        failure_count: u32,
        /// Verifier reasoning, when verification ran.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
    },
    /// The broker refused a request.
    BrokerRefusal {
        /// Stable error code returned to the client.
        code: String,
        /// Why the request was refused.
        reason: String,
    },
}

impl AuditAction {
    /// Short action name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Classification { .. } => "classification",
            Self::PacOutcome { .. } => "pac_outcome",
            Self::BrokerRefusal { .. } => "broker_refusal",
        }
    }
}

/// One record in the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry identifier.
    pub id: AuditEntryId,
    /// Session the action belonged to.
    pub session_id: SessionId,
    /// When the entry was created.
    pub timestamp: Timestamp,
    /// What happened.
    #[serde(flatten)]
    pub action: AuditAction,
}

impl AuditEntry {
    /// Create an entry stamped with the current time.
    #[must_use]
    pub fn new(session_id: SessionId, action: AuditAction) -> Self {
        Self {
            id: AuditEntryId::new(),
            session_id,
            timestamp: Timestamp::now(),
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentra_policy::{ActionContext, ActionMode, PolicyEngine, Zone};

    #[test]
    fn test_entry_id_display_prefix() {
        assert!(AuditEntryId::new().to_string().starts_with("audit:"));
    }

    #[test]
    fn test_classification_entry_round_trips() {
        let classification = PolicyEngine::new().classify_action(&ActionContext::new(
            "echo",
            ActionMode::Exec,
            Zone::Workspace,
        ));
        let entry = AuditEntry::new(
            SessionId::new(),
            AuditAction::Classification {
                command: "echo".to_string(),
                classification,
            },
        );

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"action\":\"classification\""));
        let back: AuditEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, entry.id);
        assert_eq!(back.action.kind(), "classification");
    }

    #[test]
    fn test_pac_outcome_entry_serializes() {
        let entry = AuditEntry::new(
            SessionId::new(),
            AuditAction::PacOutcome {
                goal: "build the project".to_string(),
                success: false,
                failure_count: 2,
                reasoning: Some("tests failed".to_string()),
            },
        );
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"action\":\"pac_outcome\""));
        assert!(json.contains("\"failure_count\":2"));
    }
}
