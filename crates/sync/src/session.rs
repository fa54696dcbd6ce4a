//! Scan and monitor session state machines.
//!
//! A session owns the channels for one job and is the sole writer of its
//! snapshot. Channel tasks communicate with the session's *driver task*
//! only through an mpsc of [`ChannelSignal`]s, so every merge runs to
//! completion on one task and the finalization guard is a plain boolean
//! checked before any other effect -- no locking.
//!
//! There is no ordering guarantee between a scan's two channels; either
//! may observe the terminal status first. Whichever signal arrives first
//! wins: it flips the guard, cancels every owned channel, forces progress
//! to 100, freezes the snapshot, and publishes the single `Finalized`
//! event. Later terminal signals are ignored.

use std::sync::Arc;

use piiwatch_core::error::EngineError;
use piiwatch_core::snapshot::{JobKind, JobSnapshot, JobStatus, MonitorMeta, RiskLevel, ScanSummary};
use piiwatch_core::types::{JobId, Timestamp};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::api::{MonitorStatus, ScanStatus, ScannerApi};
use crate::config::SyncConfig;
use crate::events::{SessionEvent, SessionEventBus};
use crate::messages::StreamEvent;
use crate::progress::{clamp_progress, derive_time_progress, ProgressRatchet};
use crate::watermark::LogWatermark;
use crate::{poll, push};

/// Buffer size for the signal queue feeding a session driver.
const SIGNAL_CHANNEL_CAPACITY: usize = 64;

/// A delivery from one of a session's channels.
#[derive(Debug)]
pub(crate) enum ChannelSignal {
    /// Typed event from the push stream.
    Push(StreamEvent),
    /// The push stream closed (stream end or transport failure).
    /// Advisory: the poll channel carries the session from here.
    PushClosed,
    /// Full scan status payload from the poll channel.
    ScanReport(ScanStatus),
    /// Full monitor status payload from the poll channel.
    MonitorReport(MonitorStatus),
    /// The poll channel failed. Fatal to the session.
    PollFailed(EngineError),
}

/// Handle to a running session, held by the registry.
pub struct SessionHandle {
    /// Server-assigned id of the tracked job.
    pub job_id: JobId,
    snapshot_rx: watch::Receiver<JobSnapshot>,
    cancel: CancellationToken,
    driver: tokio::task::JoinHandle<()>,
}

impl SessionHandle {
    /// Latest merged snapshot.
    pub fn snapshot(&self) -> JobSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Cancel the session's channels and wait (bounded) for its driver
    /// to exit. A disposed session emits no further events.
    pub(crate) async fn dispose(self, timeout: std::time::Duration) {
        self.cancel.cancel();
        if tokio::time::timeout(timeout, self.driver).await.is_err() {
            tracing::warn!(job_id = %self.job_id, "Session driver did not exit in time");
        }
    }
}

/// One-shot scan tracked over a push stream plus a poll channel.
pub struct ScanSession;

impl ScanSession {
    /// Open both channels for `job_id` and spawn the merge driver.
    pub(crate) fn spawn(
        api: &Arc<ScannerApi>,
        job_id: JobId,
        config: &SyncConfig,
        bus: &SessionEventBus,
        cancel: CancellationToken,
    ) -> SessionHandle {
        let (tx, rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
        push::spawn(
            Arc::clone(api),
            job_id.clone(),
            tx.clone(),
            cancel.child_token(),
        );
        poll::spawn_scan(
            Arc::clone(api),
            job_id.clone(),
            config.scan_poll_interval,
            tx,
            cancel.child_token(),
        );
        spawn_driver(job_id, JobKind::Scan, bus, cancel, rx)
    }
}

/// Recurring monitor tracked over a poll channel alone.
pub struct MonitorSession;

impl MonitorSession {
    /// Open the poll channel for `job_id` and spawn the merge driver.
    pub(crate) fn spawn(
        api: &Arc<ScannerApi>,
        job_id: JobId,
        config: &SyncConfig,
        bus: &SessionEventBus,
        cancel: CancellationToken,
    ) -> SessionHandle {
        let (tx, rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
        poll::spawn_monitor(
            Arc::clone(api),
            job_id.clone(),
            config.monitor_poll_interval,
            tx,
            cancel.child_token(),
        );
        spawn_driver(job_id, JobKind::Monitor, bus, cancel, rx)
    }
}

fn spawn_driver(
    job_id: JobId,
    kind: JobKind,
    bus: &SessionEventBus,
    cancel: CancellationToken,
    rx: mpsc::Receiver<ChannelSignal>,
) -> SessionHandle {
    let (watch_tx, snapshot_rx) = watch::channel(JobSnapshot::new(job_id.clone(), kind));
    let core = SessionCore::new(job_id.clone(), kind, watch_tx, bus.clone(), cancel.clone());
    let driver = tokio::spawn(drive(core, rx));
    SessionHandle {
        job_id,
        snapshot_rx,
        cancel,
        driver,
    }
}

/// Per-session merge state. Owned exclusively by the driver task.
struct SessionCore {
    kind: JobKind,
    snapshot: JobSnapshot,
    progress: ProgressRatchet,
    push_log: LogWatermark,
    poll_log: LogWatermark,
    finalized: bool,
    watch_tx: watch::Sender<JobSnapshot>,
    bus: SessionEventBus,
    cancel: CancellationToken,
}

impl SessionCore {
    fn new(
        job_id: JobId,
        kind: JobKind,
        watch_tx: watch::Sender<JobSnapshot>,
        bus: SessionEventBus,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            kind,
            snapshot: JobSnapshot::new(job_id, kind),
            progress: ProgressRatchet::new(),
            push_log: LogWatermark::new(),
            poll_log: LogWatermark::new(),
            finalized: false,
            watch_tx,
            bus,
            cancel,
        }
    }

    /// Fold an explicit progress reading through the ratchet.
    fn ratchet_progress(&mut self, raw: Option<f64>) {
        self.snapshot.progress = self.progress.observe(clamp_progress(raw));
    }

    /// Fold a time-derived progress reading, when the window allows one.
    fn derive_progress(&mut self, started_at: Timestamp, ends_at: Timestamp) {
        if let Some(derived) = derive_time_progress(started_at, ends_at, chrono::Utc::now()) {
            self.snapshot.progress = self.progress.observe(derived);
        }
    }

    /// Append a line delivered incrementally by the push stream.
    fn append_push_line(&mut self, line: String) {
        self.push_log.record();
        self.snapshot.log.push(line);
    }

    /// Append the poll source's unseen suffix of the full log array.
    fn absorb_poll_log(&mut self, full: &[String]) {
        for line in self.poll_log.novel(full) {
            self.snapshot.log.push(line.clone());
        }
    }

    /// Publish the current snapshot to the watch cell and the bus.
    fn publish(&self) {
        let _ = self.watch_tx.send(self.snapshot.clone());
        self.bus.publish(SessionEvent::Updated {
            kind: self.kind,
            snapshot: self.snapshot.clone(),
        });
    }

    /// One-shot finalization. Returns `false` when the session already
    /// finalized; the caller must then ignore its terminal signal.
    ///
    /// The guard check runs synchronously before any other effect, so
    /// two channels racing to report completion can never both win.
    fn finalize(
        &mut self,
        status: JobStatus,
        error: Option<String>,
        summary: Option<ScanSummary>,
    ) -> bool {
        if self.finalized {
            return false;
        }
        self.finalized = true;

        // Release every owned channel: timers stop, streams close, and
        // post-disposal deliveries land on a dropped receiver.
        self.cancel.cancel();

        if let Some(message) = &error {
            self.snapshot.log.push(format!("ERROR: {message}"));
        }
        self.snapshot.status = status;
        self.snapshot.error = error;
        if summary.is_some() {
            self.snapshot.summary = summary;
        }
        self.snapshot.progress = self.progress.force_complete();

        let _ = self.watch_tx.send(self.snapshot.clone());
        self.bus.publish(SessionEvent::Finalized {
            kind: self.kind,
            snapshot: self.snapshot.clone(),
        });
        tracing::info!(
            job_id = %self.snapshot.id,
            status = ?status,
            "Session finalized",
        );
        true
    }
}

/// Merge loop shared by both session kinds.
///
/// Exits when the session finalizes, when every channel sender is gone,
/// or when the registry disposes the session (cancellation before any
/// terminal signal -- the session is discarded, not finalized).
async fn drive(mut core: SessionCore, mut rx: mpsc::Receiver<ChannelSignal>) {
    loop {
        let signal = tokio::select! {
            _ = core.cancel.cancelled() => return,
            signal = rx.recv() => match signal {
                Some(signal) => signal,
                None => return,
            },
        };

        match signal {
            ChannelSignal::Push(event) => apply_push(&mut core, event),
            ChannelSignal::PushClosed => {
                tracing::debug!(
                    job_id = %core.snapshot.id,
                    "Push channel closed; poll channel continues",
                );
            }
            ChannelSignal::ScanReport(report) => apply_scan_report(&mut core, report),
            ChannelSignal::MonitorReport(report) => apply_monitor_report(&mut core, report),
            ChannelSignal::PollFailed(e) => {
                core.finalize(JobStatus::Error, Some(e.to_string()), None);
            }
        }

        if core.finalized {
            return;
        }
    }
}

fn apply_push(core: &mut SessionCore, event: StreamEvent) {
    match event {
        StreamEvent::Progress(data) => {
            if core.snapshot.status == JobStatus::Pending {
                core.snapshot.status = JobStatus::Running;
            }
            core.ratchet_progress(data.progress);
            core.publish();
        }
        StreamEvent::Log(data) => {
            if core.snapshot.status == JobStatus::Pending {
                core.snapshot.status = JobStatus::Running;
            }
            core.append_push_line(data.message);
            core.publish();
        }
        StreamEvent::Completed(data) => {
            let summary = ScanSummary {
                total_findings: data.total_findings,
                overall_risk: data.overall_risk.unwrap_or(RiskLevel::Low),
            };
            core.finalize(JobStatus::Completed, None, Some(summary));
        }
        // The push task maps these to `PushClosed` before they reach the
        // driver; nothing to merge.
        StreamEvent::Done | StreamEvent::Error => {}
    }
}

fn apply_scan_report(core: &mut SessionCore, report: ScanStatus) {
    core.ratchet_progress(report.progress);
    core.absorb_poll_log(&report.log);

    match report.status {
        JobStatus::Completed => {
            let summary = ScanSummary {
                total_findings: report.total_findings.unwrap_or(0),
                overall_risk: report.overall_risk.unwrap_or(RiskLevel::Low),
            };
            core.finalize(JobStatus::Completed, None, Some(summary));
        }
        JobStatus::Error => {
            let message = report
                .error
                .unwrap_or_else(|| "scan ended with an error".to_string());
            core.finalize(JobStatus::Error, Some(message), None);
        }
        JobStatus::Stopped => {
            core.finalize(JobStatus::Stopped, None, None);
        }
        status => {
            core.snapshot.status = status;
            core.publish();
        }
    }
}

fn apply_monitor_report(core: &mut SessionCore, report: MonitorStatus) {
    if let (Some(started_at), Some(ends_at)) = (report.started_at, report.ends_at) {
        core.derive_progress(started_at, ends_at);
    }
    core.absorb_poll_log(&report.log);
    core.snapshot.monitor = Some(MonitorMeta {
        run_count: report.run_count,
        total_findings: report.total_findings,
        alerts_sent: report.alerts_sent,
        next_run_at: report.next_run_at,
        last_risk: report
            .last_summary
            .as_ref()
            .and_then(|summary| summary.overall_risk),
    });

    match report.status {
        JobStatus::Completed => {
            let summary = ScanSummary {
                total_findings: report.total_findings,
                overall_risk: report
                    .last_summary
                    .and_then(|summary| summary.overall_risk)
                    .unwrap_or(RiskLevel::Low),
            };
            core.finalize(JobStatus::Completed, None, Some(summary));
        }
        JobStatus::Error => {
            let message = report
                .error
                .unwrap_or_else(|| "monitor ended with an error".to_string());
            core.finalize(JobStatus::Error, Some(message), None);
        }
        JobStatus::Stopped => {
            core.finalize(JobStatus::Stopped, None, None);
        }
        status => {
            core.snapshot.status = status;
            core.publish();
        }
    }
}
