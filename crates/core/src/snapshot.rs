//! The [`JobSnapshot`] data model.
//!
//! A snapshot is the merged view of one server-side job as observed by the
//! client. It is mutated only by the owning session's driver task and
//! handed out by value; once the job reaches a terminal status the
//! snapshot is frozen and no further mutation is observable.

use serde::{Deserialize, Serialize};

use crate::types::{JobId, Timestamp};

/// Which family of job a session tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// One-shot web search scan.
    Scan,
    /// Recurring monitor with a fixed end time.
    Monitor,
}

/// Lifecycle status of a tracked job, as reported by the backend.
///
/// `stopping` is a transitional status the backend reports between a stop
/// request and the final `stopped`; it is not terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Stopping,
    Completed,
    Error,
    Stopped,
}

impl JobStatus {
    /// Whether no further state change is expected after this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Stopped)
    }
}

/// Overall risk classification attached to scan results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// Result payload attached to a snapshot on its terminal transition to
/// `completed`.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    /// Total PII findings across all sources.
    pub total_findings: i64,
    /// Highest risk classification among the findings.
    pub overall_risk: RiskLevel,
}

/// Monitor bookkeeping mirrored from the latest poll response.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorMeta {
    /// Number of scan runs the monitor has executed so far.
    pub run_count: i64,
    /// Cumulative findings across all runs.
    pub total_findings: i64,
    /// In-app alerts raised by the monitor.
    pub alerts_sent: i64,
    /// When the next run is scheduled, if known.
    pub next_run_at: Option<Timestamp>,
    /// Risk classification of the most recent run, if any.
    pub last_risk: Option<RiskLevel>,
}

/// Merged client-side view of one server-side job.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    /// Server-assigned job identifier.
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Percentage in [0, 100]; never decreases while non-terminal.
    pub progress: f64,
    /// Append-only log, merged from all channels.
    pub log: Vec<String>,
    /// Set only when `status` is `error`.
    pub error: Option<String>,
    /// Set only on the terminal transition to `completed`.
    pub summary: Option<ScanSummary>,
    /// Present only for monitor jobs.
    pub monitor: Option<MonitorMeta>,
}

impl JobSnapshot {
    /// A fresh snapshot for a job that has just been started.
    pub fn new(id: JobId, kind: JobKind) -> Self {
        Self {
            id,
            kind,
            status: JobStatus::Pending,
            progress: 0.0,
            log: Vec::new(),
            error: None,
            summary: None,
            monitor: None,
        }
    }

    /// Whether this snapshot is frozen.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
