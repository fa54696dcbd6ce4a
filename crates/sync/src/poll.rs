//! Poll channels: timer-driven full-status fetches.
//!
//! Each tick fetches the complete job resource and forwards it to the
//! session driver. The fetch is awaited inline in the tick loop, so
//! fetches for one channel never overlap; missed ticks are skipped, not
//! queued. A terminal status in the response stops the ticker. A fetch
//! failure is fatal to the channel: the error is forwarded and no
//! further ticks are scheduled.

use std::sync::Arc;
use std::time::Duration;

use piiwatch_core::types::JobId;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::api::ScannerApi;
use crate::session::ChannelSignal;

/// Spawn the poll-channel task for a scan.
pub(crate) fn spawn_scan(
    api: Arc<ScannerApi>,
    job_id: JobId,
    interval: Duration,
    tx: mpsc::Sender<ChannelSignal>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_scan(api, job_id, interval, tx, cancel))
}

/// Spawn the poll-channel task for a monitor.
pub(crate) fn spawn_monitor(
    api: Arc<ScannerApi>,
    job_id: JobId,
    interval: Duration,
    tx: mpsc::Sender<ChannelSignal>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_monitor(api, job_id, interval, tx, cancel))
}

async fn run_scan(
    api: Arc<ScannerApi>,
    job_id: JobId,
    interval: Duration,
    tx: mpsc::Sender<ChannelSignal>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        match api.scan_status(&job_id).await {
            Ok(report) => {
                let terminal = report.status.is_terminal();
                if tx.send(ChannelSignal::ScanReport(report)).await.is_err() {
                    return;
                }
                if terminal {
                    tracing::debug!(job_id = %job_id, "Scan poll observed a terminal status");
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Scan poll failed");
                let _ = tx.send(ChannelSignal::PollFailed(e)).await;
                return;
            }
        }
    }
}

async fn run_monitor(
    api: Arc<ScannerApi>,
    job_id: JobId,
    interval: Duration,
    tx: mpsc::Sender<ChannelSignal>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        match api.monitor_status(&job_id).await {
            Ok(report) => {
                let terminal = report.status.is_terminal();
                if tx.send(ChannelSignal::MonitorReport(report)).await.is_err() {
                    return;
                }
                if terminal {
                    tracing::debug!(job_id = %job_id, "Monitor poll observed a terminal status");
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Monitor poll failed");
                let _ = tx.send(ChannelSignal::PollFailed(e)).await;
                return;
            }
        }
    }
}
