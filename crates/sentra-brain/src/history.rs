//! Action outcome history.
//!
//! [`HistoryTracker`] appends one JSON line per completed action and turns
//! that record into a [`HistoryContext`] confidence adjustment for future
//! assessments of similar commands. Similarity is by leading program name;
//! the file is pruned to a bounded number of recent entries.

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use sentra_core::Timestamp;
use sentra_risk::HistoryContext;

/// Maximum entries retained after pruning.
pub const MAX_HISTORY_ENTRIES: usize = 1000;

/// Confidence points gained per recent similar success.
const SUCCESS_WEIGHT: i16 = 5;
/// Confidence points lost per recent similar failure.
const FAILURE_WEIGHT: i16 = 10;
/// Bound on the positive adjustment.
const MAX_BOOST: i16 = 20;
/// Bound on the negative adjustment.
const MAX_PENALTY: i16 = 30;

/// How an action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The action completed and verification (if any) passed.
    Success,
    /// The action failed or verification rejected its output.
    Failure,
}

/// One recorded action outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// The command that ran.
    pub command: String,
    /// How it ended.
    pub kind: OutcomeKind,
    /// When it was recorded.
    pub timestamp: Timestamp,
    /// Failure detail, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    /// Record a success.
    #[must_use]
    pub fn success(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            kind: OutcomeKind::Success,
            timestamp: Timestamp::now(),
            error: None,
        }
    }

    /// Record a failure.
    #[must_use]
    pub fn failure(command: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            kind: OutcomeKind::Failure,
            timestamp: Timestamp::now(),
            error: Some(error.into()),
        }
    }
}

/// Errors from history persistence.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// Reading or writing the history file failed.
    #[error("history io error: {0}")]
    Io(#[from] std::io::Error),
    /// An entry could not be serialized.
    #[error("history serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    /// No home directory could be determined for the default location.
    #[error("could not determine home directory for history file")]
    NoHome,
}

/// Append-only JSONL store of action outcomes.
#[derive(Debug, Clone)]
pub struct HistoryTracker {
    path: PathBuf,
    max_entries: usize,
}

impl HistoryTracker {
    /// Tracker at the default location, `~/.sentra/history.jsonl`.
    pub fn from_home() -> Result<Self, HistoryError> {
        let home = std::env::var_os("HOME").ok_or(HistoryError::NoHome)?;
        Ok(Self::at_path(
            Path::new(&home).join(".sentra").join("history.jsonl"),
        ))
    }

    /// Tracker at an explicit path.
    #[must_use]
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_entries: MAX_HISTORY_ENTRIES,
        }
    }

    /// Override the retention bound.
    #[must_use]
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Append an outcome, pruning old entries when over the bound.
    pub fn record(&self, outcome: &ActionOutcome) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(outcome)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;

        self.prune_if_needed()?;
        debug!(command = %outcome.command, kind = ?outcome.kind, "outcome recorded");
        Ok(())
    }

    /// All retained entries, oldest first. Malformed lines are skipped.
    pub fn entries(&self) -> Result<Vec<ActionOutcome>, HistoryError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ActionOutcome>(&line) {
                Ok(entry) => entries.push(entry),
                Err(error) => warn!(%error, "skipping malformed history line"),
            }
        }
        Ok(entries)
    }

    /// Summarize the track record of commands similar to `command`.
    ///
    /// Similarity is by leading program name. Successes raise the
    /// confidence adjustment and failures lower it, both bounded.
    pub fn historical_context(&self, command: &str) -> Result<HistoryContext, HistoryError> {
        let program = leading_program(command);
        let mut successes: u32 = 0;
        let mut failures: u32 = 0;
        for entry in self.entries()? {
            if leading_program(&entry.command) != program {
                continue;
            }
            match entry.kind {
                OutcomeKind::Success => successes = successes.saturating_add(1),
                OutcomeKind::Failure => failures = failures.saturating_add(1),
            }
        }

        let boost = i16::try_from(successes)
            .unwrap_or(i16::MAX)
            .saturating_mul(SUCCESS_WEIGHT)
            .min(MAX_BOOST);
        let penalty = i16::try_from(failures)
            .unwrap_or(i16::MAX)
            .saturating_mul(FAILURE_WEIGHT)
            .min(MAX_PENALTY);
        let adjustment = boost.saturating_sub(penalty);

        let reasoning = if successes == 0 && failures == 0 {
            format!("No recent history for `{program}`")
        } else {
            format!("`{program}` ran {successes} time(s) successfully and failed {failures} time(s) recently")
        };

        Ok(HistoryContext {
            similar_successes: successes,
            similar_failures: failures,
            confidence_adjustment: adjustment,
            reasoning,
        })
    }

    fn prune_if_needed(&self) -> Result<(), HistoryError> {
        let entries = self.entries()?;
        if entries.len() <= self.max_entries {
            return Ok(());
        }
        let keep_from = entries.len().saturating_sub(self.max_entries);
        let mut out = String::new();
        for entry in &entries[keep_from..] {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        fs::write(&self.path, out)?;
        debug!(retained = self.max_entries, "history pruned");
        Ok(())
    }
}

fn leading_program(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tracker(dir: &TempDir) -> HistoryTracker {
        HistoryTracker::at_path(dir.path().join("history.jsonl"))
    }

    #[test]
    fn test_record_and_read_back() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);

        tracker.record(&ActionOutcome::success("ls -la")).unwrap();
        tracker
            .record(&ActionOutcome::failure("cargo build", "exit 101"))
            .unwrap();

        let entries = tracker.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].command, "ls -la");
        assert_eq!(entries[1].kind, OutcomeKind::Failure);
        assert_eq!(entries[1].error.as_deref(), Some("exit 101"));
    }

    #[test]
    fn test_empty_history_is_neutral() {
        let dir = TempDir::new().unwrap();
        let context = tracker(&dir).historical_context("ls -la").unwrap();
        assert_eq!(context.similar_successes, 0);
        assert_eq!(context.similar_failures, 0);
        assert_eq!(context.confidence_adjustment, 0);
    }

    #[test]
    fn test_successes_boost_confidence_bounded() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        for _ in 0..10 {
            tracker.record(&ActionOutcome::success("git status")).unwrap();
        }

        let context = tracker.historical_context("git log").unwrap();
        assert_eq!(context.similar_successes, 10);
        assert_eq!(context.confidence_adjustment, 20);
    }

    #[test]
    fn test_failures_penalize_confidence_bounded() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        for _ in 0..10 {
            tracker
                .record(&ActionOutcome::failure("cargo test", "failed"))
                .unwrap();
        }

        let context = tracker.historical_context("cargo build").unwrap();
        assert_eq!(context.similar_failures, 10);
        assert_eq!(context.confidence_adjustment, -30);
    }

    #[test]
    fn test_similarity_is_by_program_name() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        tracker.record(&ActionOutcome::success("git status")).unwrap();
        tracker
            .record(&ActionOutcome::failure("rm -rf build", "denied"))
            .unwrap();

        let context = tracker.historical_context("git diff").unwrap();
        assert_eq!(context.similar_successes, 1);
        assert_eq!(context.similar_failures, 0);
    }

    #[test]
    fn test_prune_keeps_most_recent() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir).max_entries(5);
        for i in 0..8 {
            tracker
                .record(&ActionOutcome::success(format!("echo {i}")))
                .unwrap();
        }

        let entries = tracker.entries().unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].command, "echo 3");
        assert_eq!(entries[4].command, "echo 7");
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        let tracker = HistoryTracker::at_path(&path);
        tracker.record(&ActionOutcome::success("ls")).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "not json at all").unwrap();

        let entries = tracker.entries().unwrap();
        assert_eq!(entries.len(), 1);
    }
}
