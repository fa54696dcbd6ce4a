//! Terminal rendering of job snapshots.
//!
//! Snapshots arrive as whole values; the renderer tracks what it has
//! already printed so each log line and progress step appears once.

use piiwatch_core::snapshot::{JobSnapshot, JobStatus};

/// Incremental printer for a single session's snapshots.
pub struct Renderer {
    printed_lines: usize,
    last_percent: i64,
    last_run_count: i64,
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            printed_lines: 0,
            last_percent: -1,
            last_run_count: -1,
        }
    }

    /// Print whatever `snapshot` adds over what was already shown.
    pub fn apply(&mut self, snapshot: &JobSnapshot) {
        let percent = snapshot.progress.round() as i64;
        if percent != self.last_percent {
            println!("[{percent:>3}%]");
            self.last_percent = percent;
        }

        for line in &snapshot.log[self.printed_lines..] {
            println!("  {line}");
        }
        self.printed_lines = snapshot.log.len();

        if let Some(meta) = &snapshot.monitor {
            if meta.run_count != self.last_run_count {
                let next_run = meta
                    .next_run_at
                    .map(|at| at.format("%H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                let risk = meta
                    .last_risk
                    .map(|risk| risk.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  run #{} | findings {} | alerts {} | last risk {} | next run {}",
                    meta.run_count, meta.total_findings, meta.alerts_sent, risk, next_run
                );
                self.last_run_count = meta.run_count;
            }
        }
    }

    /// Print the final outcome line for a frozen snapshot.
    pub fn outcome(&self, snapshot: &JobSnapshot) {
        match snapshot.status {
            JobStatus::Completed => {
                if let Some(summary) = &snapshot.summary {
                    println!(
                        "COMPLETE -- {} findings | risk {}",
                        summary.total_findings, summary.overall_risk
                    );
                } else {
                    println!("COMPLETE");
                }
            }
            JobStatus::Stopped => println!("STOPPED"),
            JobStatus::Error => {
                let message = snapshot.error.as_deref().unwrap_or("unknown error");
                println!("FAILED -- {message}");
            }
            status => println!("ended in unexpected state {status:?}"),
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}
