//! Action classification.
//!
//! [`PolicyEngine::classify_action`] combines the hard-stop list, the
//! target zone and the execution mode into an [`ApprovalLevel`]. Every
//! rule that fires contributes a [`RiskFactor`], and the final level is
//! the most restrictive of all contributions. The hard-stop check runs
//! first and short-circuits everything else.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

use sentra_core::Severity;

use crate::zone::Zone;

/// Approval level of a classified action, least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApprovalLevel {
    /// Auto-approved, no interaction.
    A,
    /// Approved after passive notification.
    B,
    /// Requires explicit user approval.
    C,
    /// Refused outright.
    Deny,
}

impl fmt::Display for ApprovalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
            Self::Deny => write!(f, "DENY"),
        }
    }
}

/// How the command will be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionMode {
    /// Single argv vector, no shell interpretation.
    Exec,
    /// Free-form shell line; metacharacters are live.
    Shell,
}

impl fmt::Display for ActionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exec => write!(f, "exec"),
            Self::Shell => write!(f, "shell"),
        }
    }
}

/// Everything the engine needs to classify one action.
///
/// Constructed fresh per action; `zone` is filled in by the zone
/// classifier before classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionContext {
    /// Program being invoked.
    pub command: String,
    /// Arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Execution mode.
    pub mode: ActionMode,
    /// Working directory of the action.
    pub cwd: PathBuf,
    /// Trust zone of the action's target.
    pub zone: Zone,
    /// Paths the action touches, when known.
    #[serde(default)]
    pub target_paths: Vec<PathBuf>,
    /// Caller explicitly accepted operating outside the workspace.
    /// Relaxes zone restrictions; never relaxes hard-stop or secrets.
    #[serde(default)]
    pub outside_workspace: bool,
}

impl ActionContext {
    /// Minimal context for a command in a zone.
    #[must_use]
    pub fn new(command: impl Into<String>, mode: ActionMode, zone: Zone) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            mode,
            cwd: PathBuf::new(),
            zone,
            target_paths: Vec::new(),
            outside_workspace: false,
        }
    }

    /// Attach arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Attach the working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    /// Attach the touched paths.
    #[must_use]
    pub fn with_target_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.target_paths = paths;
        self
    }

    /// Mark the outside-workspace override as accepted.
    #[must_use]
    pub fn with_outside_workspace(mut self) -> Self {
        self.outside_workspace = true;
        self
    }
}

/// One triggered classification rule, kept for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    /// Name of the rule that fired.
    pub factor: String,
    /// How serious the factor is.
    pub severity: Severity,
    /// Human-readable detail.
    pub description: String,
}

impl RiskFactor {
    fn new(factor: &str, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            factor: factor.to_string(),
            severity,
            description: description.into(),
        }
    }
}

/// Final verdict for one action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionClassification {
    /// Most restrictive level any rule produced.
    pub level: ApprovalLevel,
    /// Why this level was chosen.
    pub reason: String,
    /// Whether the action may proceed without blocking confirmation.
    pub approved: bool,
    /// Prompt to show the user when confirmation is needed.
    pub prompt: Option<String>,
    /// Every rule that fired.
    pub risk_factors: Vec<RiskFactor>,
}

/// Commands denied unconditionally.
const DEFAULT_HARD_STOPS: &[&str] = &["diskpart", "format", "mkfs", "fdisk"];

/// Administrative commands that always require explicit approval.
const RISKY_COMMANDS: &[&str] = &[
    "powershell",
    "pwsh",
    "cmd",
    "reg",
    "sc",
    "net",
    "icacls",
    "takeown",
    "shutdown",
    "taskkill",
    "wmic",
    "bcdedit",
];

/// Denylist of commands that always classify as [`ApprovalLevel::Deny`].
#[derive(Debug, Clone)]
pub struct HardStopConfig {
    commands: HashSet<String>,
}

impl HardStopConfig {
    /// Config with an explicit command list. Matching is case-insensitive.
    #[must_use]
    pub fn new(commands: impl IntoIterator<Item = String>) -> Self {
        Self {
            commands: commands.into_iter().map(|c| c.to_lowercase()).collect(),
        }
    }

    /// Whether an invocation is hard-stopped.
    ///
    /// Besides the plain command list, shadow-copy deletion is always a
    /// hard stop: it is the signature move of ransomware and has no
    /// legitimate automated use here.
    #[must_use]
    pub fn matches(&self, command: &str, args: &[String]) -> bool {
        let command = command.to_lowercase();
        if self.commands.contains(&command) {
            return true;
        }
        command == "vssadmin"
            && args.iter().any(|a| a.eq_ignore_ascii_case("delete"))
            && args.iter().any(|a| a.eq_ignore_ascii_case("shadows"))
    }
}

impl Default for HardStopConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HARD_STOPS.iter().map(ToString::to_string))
    }
}

/// Classifies actions against the hard-stop list and zone/mode rules.
#[derive(Debug, Clone, Default)]
pub struct PolicyEngine {
    hard_stop: HardStopConfig,
}

impl PolicyEngine {
    /// Engine with the default hard-stop list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with a custom hard-stop config.
    #[must_use]
    pub fn with_hard_stop(hard_stop: HardStopConfig) -> Self {
        Self { hard_stop }
    }

    /// Classify one action.
    #[must_use]
    pub fn classify_action(&self, context: &ActionContext) -> ActionClassification {
        if self.hard_stop.matches(&context.command, &context.args) {
            return denied(
                format!("Command '{}' is on the hard-stop list", context.command),
                vec![RiskFactor::new(
                    "hard_stop",
                    Severity::Critical,
                    format!("'{}' is never executed", context.command),
                )],
            );
        }

        let mut factors = Vec::new();

        if context.zone == Zone::Secrets {
            factors.push(RiskFactor::new(
                "secrets_zone",
                Severity::Critical,
                "action targets credential material",
            ));
            return denied("Access to the secrets zone is denied".to_string(), factors);
        }

        let effective_zone = if context.outside_workspace {
            factors.push(RiskFactor::new(
                "outside_workspace_override",
                Severity::Medium,
                "caller accepted operating outside the workspace",
            ));
            Zone::Workspace
        } else {
            context.zone
        };

        let mut level = if effective_zone == Zone::Workspace && context.mode == ActionMode::Exec {
            ApprovalLevel::A
        } else {
            ApprovalLevel::B
        };

        if context.mode == ActionMode::Shell {
            factors.push(RiskFactor::new(
                "shell_mode",
                Severity::High,
                "shell interpretation permits metacharacter injection",
            ));
            level = level.max(ApprovalLevel::C);
        }

        if effective_zone == Zone::System {
            factors.push(RiskFactor::new(
                "system_zone",
                Severity::High,
                "action targets operating system directories",
            ));
            level = level.max(ApprovalLevel::C);
        }

        if RISKY_COMMANDS.contains(&context.command.to_lowercase().as_str()) {
            factors.push(RiskFactor::new(
                "risky_command",
                Severity::High,
                format!("'{}' is an administrative command", context.command),
            ));
            level = level.max(ApprovalLevel::C);
        }

        let reason = match level {
            ApprovalLevel::A => "Safe zone auto-approved",
            ApprovalLevel::B => "User approval required",
            ApprovalLevel::C | ApprovalLevel::Deny => {
                "High-risk operation requires explicit approval"
            },
        }
        .to_string();

        let prompt = (level != ApprovalLevel::A).then(|| {
            format!(
                "Approve {} in {} with mode {}?",
                context.command, context.zone, context.mode
            )
        });

        debug!(
            command = %context.command,
            zone = %context.zone,
            mode = %context.mode,
            level = %level,
            "action classified"
        );

        ActionClassification {
            level,
            reason,
            approved: matches!(level, ApprovalLevel::A | ApprovalLevel::B),
            prompt,
            risk_factors: factors,
        }
    }
}

fn denied(reason: String, risk_factors: Vec<RiskFactor>) -> ActionClassification {
    ActionClassification {
        level: ApprovalLevel::Deny,
        reason,
        approved: false,
        prompt: None,
        risk_factors,
    }
}
