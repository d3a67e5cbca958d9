//! Run report returned to whatever UI or CLI drives an assignment run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::lead::Assignment;

/// Terminal state of a run that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No unassigned leads existed.
    NothingToDo,
    /// Every planned write was attempted.
    Completed,
    /// Stopped early; committed assignments stand.
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NothingToDo => "nothing_to_do",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A write that could not be committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFailure {
    pub lead_id: String,
    pub handler: String,
    pub error: String,
    pub attempts: u32,
}

/// Aggregate outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub day: NaiveDate,
    pub status: RunStatus,
    pub eligible: usize,
    pub assigned: usize,
    pub skipped: usize,
    pub failed_writes: usize,
    /// Planned writes never issued because the run was cancelled.
    pub not_attempted: usize,
    pub dry_run: bool,
    /// Committed (or, for a dry run, planned) assignments.
    pub assignments: Vec<Assignment>,
    pub failures: Vec<WriteFailure>,
}

impl RunReport {
    /// Report for a run that found no unassigned leads.
    pub fn nothing_to_do(day: NaiveDate) -> Self {
        Self {
            day,
            status: RunStatus::NothingToDo,
            eligible: 0,
            assigned: 0,
            skipped: 0,
            failed_writes: 0,
            not_attempted: 0,
            dry_run: false,
            assignments: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// One-line notification text.
    pub fn summary(&self) -> String {
        if self.status == RunStatus::NothingToDo {
            return "No unassigned leads found".to_string();
        }
        let verb = if self.dry_run { "Would assign" } else { "Assigned" };
        let mut line = format!(
            "{verb} {} of {} leads ({} skipped, {} failed)",
            self.assigned, self.eligible, self.skipped, self.failed_writes
        );
        if self.status == RunStatus::Cancelled {
            line.push_str(&format!(", cancelled with {} not attempted", self.not_attempted));
        }
        line
    }
}
