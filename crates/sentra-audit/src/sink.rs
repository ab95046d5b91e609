//! Audit sinks.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

use crate::entry::AuditEntry;
use crate::error::AuditResult;
use crate::redact::Redactor;

/// One-way destination for audit entries.
pub trait AuditSink: Send + Sync {
    /// Persist one entry.
    fn record(&self, entry: &AuditEntry) -> AuditResult<()>;
}

/// Append-only JSONL file sink with redaction applied per line.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    redactor: Redactor,
    lock: Mutex<()>,
}

impl JsonlSink {
    /// Sink writing to the given file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            redactor: Redactor::new(),
            lock: Mutex::new(()),
        }
    }

    /// Replace the redactor.
    #[must_use]
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }
}

impl AuditSink for JsonlSink {
    fn record(&self, entry: &AuditEntry) -> AuditResult<()> {
        let line = serde_json::to_string(entry)?;
        let redacted = self.redactor.redact(&line);

        // Poisoning only happens if a writer panicked; the lock itself
        // still excludes interleaved writes.
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{redacted}")?;
        debug!(id = %entry.id, kind = entry.action.kind(), "audit entry recorded");
        Ok(())
    }
}

/// In-memory sink for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemorySink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl AuditSink for MemorySink {
    fn record(&self, entry: &AuditEntry) -> AuditResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::AuditAction;
    use sentra_core::SessionId;

    fn entry(command: &str) -> AuditEntry {
        AuditEntry::new(
            SessionId::new(),
            AuditAction::PacOutcome {
                goal: command.to_string(),
                success: true,
                failure_count: 0,
                reasoning: None,
            },
        )
    }

    #[test]
    fn test_jsonl_sink_appends_one_line_per_entry() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = JsonlSink::new(&path);

        sink.record(&entry("ls")).unwrap();
        sink.record(&entry("pwd")).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        for line in contents.lines() {
            let parsed: AuditEntry = serde_json::from_str(line).unwrap();
            assert_eq!(parsed.action.kind(), "pac_outcome");
        }
    }

    #[test]
    fn test_jsonl_sink_redacts_secrets() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = JsonlSink::new(&path);

        sink.record(&entry("deploy --token=supersecret123")).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("supersecret123"));
        assert!(contents.contains("--token=***"));
    }

    #[test]
    fn test_memory_sink_collects_entries() {
        let sink = MemorySink::new();
        sink.record(&entry("ls")).unwrap();
        sink.record(&entry("pwd")).unwrap();
        assert_eq!(sink.entries().len(), 2);
    }
}
