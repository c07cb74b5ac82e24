use std::fmt;

use relaygram_core::MessageId;
use relaygram_state::FailedUnit;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every unit was replicated.
    Completed,
    /// The backlog was drained but some units were recorded as failures.
    CompletedWithErrors,
    /// The run stopped before draining the backlog.
    Aborted,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::CompletedWithErrors => write!(f, "completed with errors"),
            RunOutcome::Aborted => write!(f, "aborted"),
        }
    }
}

/// Why a run stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Checkpoint, identity map or failure log could not be read or written.
    Storage,
    /// The backlog could not be fetched.
    Transport,
    /// A source message was about to be mapped a second time.
    InvariantViolation,
    /// Shutdown was requested.
    Interrupted,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Storage => write!(f, "storage"),
            AbortReason::Transport => write!(f, "transport"),
            AbortReason::InvariantViolation => write!(f, "invariant violation"),
            AbortReason::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Summary of one replication run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub abort_reason: Option<AbortReason>,
    /// Error text for an aborted run.
    pub error: Option<String>,
    /// Checkpoint loaded at start.
    pub checkpoint_before: MessageId,
    /// Last checkpoint known to be durable.
    pub checkpoint_after: MessageId,
    /// Largest source id processed this run.
    pub high_water: MessageId,
    /// Messages fetched after normalisation, including already-mapped ones.
    pub backlog_len: usize,
    /// Backlog messages skipped because they were already mapped.
    pub skipped_mapped: usize,
    pub units_total: usize,
    pub units_sent: usize,
    pub messages_sent: usize,
    pub units_failed: usize,
    pub rate_limit_waits: usize,
    pub failures: Vec<FailedUnit>,
}

impl RunReport {
    pub(crate) fn new(checkpoint_before: MessageId) -> Self {
        Self {
            outcome: RunOutcome::Completed,
            abort_reason: None,
            error: None,
            checkpoint_before,
            checkpoint_after: checkpoint_before,
            high_water: checkpoint_before,
            backlog_len: 0,
            skipped_mapped: 0,
            units_total: 0,
            units_sent: 0,
            messages_sent: 0,
            units_failed: 0,
            rate_limit_waits: 0,
            failures: Vec::new(),
        }
    }

    pub(crate) fn aborted(mut self, reason: AbortReason, error: impl ToString) -> Self {
        self.outcome = RunOutcome::Aborted;
        self.abort_reason = Some(reason);
        self.error = Some(error.to_string());
        self
    }

    /// Process exit code: 0 unless the run was aborted.
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            RunOutcome::Completed | RunOutcome::CompletedWithErrors => 0,
            RunOutcome::Aborted => 1,
        }
    }
}
