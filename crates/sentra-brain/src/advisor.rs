//! Strategy advisors.
//!
//! An [`Advisor`] proposes one approach for accomplishing a task. The four
//! built-in advisor kinds share a single model-backed implementation,
//! [`ModelAdvisor`], differing only in the perspective their prompt asks
//! the model to take.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use sentra_risk::{ModelAdapter, ModelError, ModelResult};

/// Rough execution-time estimate attached to a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatedTime {
    /// Completes in seconds.
    Fast,
    /// Completes in under a minute.
    Medium,
    /// May take minutes or require installs.
    Slow,
}

impl EstimatedTime {
    /// Ordering weight used to break confidence ties (faster wins).
    #[must_use]
    pub fn speed_rank(self) -> u8 {
        match self {
            Self::Fast => 3,
            Self::Medium => 2,
            Self::Slow => 1,
        }
    }
}

impl fmt::Display for EstimatedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Medium => write!(f, "medium"),
            Self::Slow => write!(f, "slow"),
        }
    }
}

/// One advisor's proposed approach to a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorProposal {
    /// Concrete approach, typically a command or short plan.
    pub approach: String,
    /// Why the advisor believes this approach fits.
    pub reasoning: String,
    /// Rough time estimate.
    pub estimated_time: EstimatedTime,
    /// Tools or packages the approach depends on.
    #[serde(default)]
    pub required_deps: Vec<String>,
    /// Self-reported confidence, 0-100.
    pub confidence: u8,
}

/// Host environment snapshot handed to advisors so proposals fit the
/// machine they will run on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSpec {
    /// Operating system family, e.g. `linux`, `macos`, `windows`.
    pub os: String,
    /// CPU architecture.
    pub arch: String,
    /// Login shell, when known.
    pub shell: Option<String>,
    /// Package managers found on `PATH`.
    pub package_managers: Vec<String>,
}

impl SystemSpec {
    /// Probe the current host.
    #[must_use]
    pub fn detect() -> Self {
        let shell = env::var("SHELL").ok().and_then(|s| {
            Path::new(&s)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        });

        const CANDIDATES: &[&str] = &["apt", "dnf", "pacman", "brew", "winget", "choco"];
        let package_managers = CANDIDATES
            .iter()
            .filter(|name| on_path(name))
            .map(|name| (*name).to_string())
            .collect();

        Self {
            os: env::consts::OS.to_string(),
            arch: env::consts::ARCH.to_string(),
            shell,
            package_managers,
        }
    }

    fn summary(&self) -> String {
        format!(
            "OS: {} ({}), shell: {}, package managers: {}",
            self.os,
            self.arch,
            self.shell.as_deref().unwrap_or("unknown"),
            if self.package_managers.is_empty() {
                "none detected".to_string()
            } else {
                self.package_managers.join(", ")
            }
        )
    }
}

fn on_path(name: &str) -> bool {
    let Some(path) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&path).any(|dir| dir.join(name).is_file())
}

/// Capability that proposes an approach for a task.
#[async_trait]
pub trait Advisor: Send + Sync {
    /// Stable advisor name, used in logs and consensus reporting.
    fn name(&self) -> &str;

    /// Propose an approach for `task` on the given host.
    async fn propose(&self, task: &str, spec: &SystemSpec) -> ModelResult<AdvisorProposal>;
}

/// The perspective a [`ModelAdvisor`] prompts the model with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisorKind {
    /// Match the task against well-known command idioms.
    PatternMatcher,
    /// Enumerate candidate tools and pick the best available one.
    Enumerator,
    /// Build a chain of fallbacks from most to least preferred.
    FallbackChain,
    /// Write a small script when no single command fits.
    CodeGenerator,
}

impl AdvisorKind {
    /// Advisor name for this kind.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::PatternMatcher => "pattern-matcher",
            Self::Enumerator => "enumerator",
            Self::FallbackChain => "fallback-chain",
            Self::CodeGenerator => "code-generator",
        }
    }

    fn perspective(self) -> &'static str {
        match self {
            Self::PatternMatcher => {
                "You recognize common task shapes. If this task matches a well-known \
                 command idiom, propose that idiom directly."
            },
            Self::Enumerator => {
                "You enumerate the tools available on this system and pick the single \
                 best one for the task."
            },
            Self::FallbackChain => {
                "You design resilient command chains. Propose a primary approach with \
                 fallbacks joined so later steps only run if earlier ones fail."
            },
            Self::CodeGenerator => {
                "No single command fits every task. When needed, propose a short \
                 script (shell or python) that accomplishes the task."
            },
        }
    }
}

/// Model-backed advisor parameterized by an [`AdvisorKind`].
pub struct ModelAdvisor {
    kind: AdvisorKind,
    model: Arc<dyn ModelAdapter>,
}

impl fmt::Debug for ModelAdvisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelAdvisor")
            .field("kind", &self.kind)
            .finish()
    }
}

impl ModelAdvisor {
    /// Create an advisor of the given kind.
    #[must_use]
    pub fn new(kind: AdvisorKind, model: Arc<dyn ModelAdapter>) -> Self {
        Self { kind, model }
    }

    /// The full default panel, one advisor per kind.
    #[must_use]
    pub fn default_panel(model: &Arc<dyn ModelAdapter>) -> Vec<Arc<dyn Advisor>> {
        [
            AdvisorKind::PatternMatcher,
            AdvisorKind::Enumerator,
            AdvisorKind::FallbackChain,
            AdvisorKind::CodeGenerator,
        ]
        .into_iter()
        .map(|kind| Arc::new(Self::new(kind, Arc::clone(model))) as Arc<dyn Advisor>)
        .collect()
    }
}

#[async_trait]
impl Advisor for ModelAdvisor {
    fn name(&self) -> &str {
        self.kind.name()
    }

    async fn propose(&self, task: &str, spec: &SystemSpec) -> ModelResult<AdvisorProposal> {
        let prompt = format!(
            "{perspective}\n\n\
             Task: \"{task}\"\n\
             System: {system}\n\n\
             Respond in JSON:\n\
             {{\n  \"approach\": \"the command or plan\",\n  \"reasoning\": \"why this fits\",\n  \"estimated_time\": \"fast\" | \"medium\" | \"slow\",\n  \"required_deps\": [\"tool\", ...],\n  \"confidence\": 0-100\n}}",
            perspective = self.kind.perspective(),
            system = spec.summary(),
        );

        let text = self.model.generate(&prompt).await?;
        let proposal = parse_proposal(&text).ok_or(ModelError::Empty)?;
        debug!(
            advisor = self.name(),
            confidence = proposal.confidence,
            "advisor proposal parsed"
        );
        Ok(proposal)
    }
}

#[derive(Debug, Deserialize)]
struct RawProposal {
    approach: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    estimated_time: Option<EstimatedTime>,
    #[serde(default)]
    required_deps: Vec<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

fn parse_proposal(text: &str) -> Option<AdvisorProposal> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let raw: RawProposal = serde_json::from_str(&text[start..=end]).ok()?;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let confidence = raw.confidence.unwrap_or(50.0).clamp(0.0, 100.0) as u8;

    Some(AdvisorProposal {
        approach: raw.approach,
        reasoning: raw.reasoning,
        estimated_time: raw.estimated_time.unwrap_or(EstimatedTime::Medium),
        required_deps: raw.required_deps,
        confidence,
    })
}
