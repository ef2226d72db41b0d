//! Run bookkeeping: change logs, the error collector and job status

use serde::{Deserialize, Serialize};

/// Ordered, append-only description of what a sync did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeLog {
    entries: Vec<String>,
    changes: usize,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line and echo it to the log
    pub fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        log::info!("{}", line);
        self.entries.push(line);
    }

    /// Append a failure line; the error collector has already logged it
    pub fn push_error(&mut self, line: impl Into<String>) {
        self.entries.push(line.into());
    }

    /// Append a line describing a catalogue mutation and count it
    pub fn push_change(&mut self, line: impl Into<String>) {
        self.changes += 1;
        self.push(line);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Number of mutations recorded with [`push_change`](Self::push_change)
    pub fn change_count(&self) -> usize {
        self.changes
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn extend(&mut self, other: ChangeLog) {
        self.entries.extend(other.entries);
        self.changes += other.changes;
    }
}

/// Errors gathered during a run.
///
/// Threaded explicitly through each entity sync and merged by the
/// orchestrator; its emptiness decides the run's terminal status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorCollector {
    messages: Vec<String>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error and log it
    pub fn record(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::error!("{}", message);
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn merge(&mut self, other: ErrorCollector) {
        self.messages.extend(other.messages);
    }
}

/// Terminal status reported to the job-status store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Succeeded,
    Errors,
    Failed,
}

impl JobStatus {
    /// Status of a run that got through every entity type
    pub fn from_errors(errors: &ErrorCollector) -> Self {
        if errors.is_empty() {
            JobStatus::Succeeded
        } else {
            JobStatus::Errors
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Succeeded => "Succeeded",
            JobStatus::Errors => "Errors",
            JobStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
