//! Process-wide session registry.
//!
//! [`SessionRegistry`] tracks at most one active [`ScanSession`] and one
//! active [`MonitorSession`]. Starting a new session of a kind first
//! disposes the prior one, so no stale timer or stream outlives its
//! replacement. Created once and shared via `Arc`.
//!
//! [`ScanSession`]: crate::session::ScanSession
//! [`MonitorSession`]: crate::session::MonitorSession

use std::sync::Arc;

use piiwatch_core::error::EngineError;
use piiwatch_core::snapshot::JobSnapshot;
use piiwatch_core::types::JobId;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use crate::api::{MonitorRequest, ScannerApi};
use crate::config::SyncConfig;
use crate::events::{SessionEvent, SessionEventBus};
use crate::session::{MonitorSession, ScanSession, SessionHandle};

/// Tab-wide owner of the active scan and monitor sessions.
pub struct SessionRegistry {
    api: Arc<ScannerApi>,
    config: SyncConfig,
    bus: SessionEventBus,
    scan: RwLock<Option<SessionHandle>>,
    monitor: RwLock<Option<SessionHandle>>,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
}

impl SessionRegistry {
    /// Create a registry for the backend named by `config`.
    ///
    /// Returns a shared handle that is safe to clone into tasks.
    pub fn new(config: SyncConfig) -> Arc<Self> {
        let api = Arc::new(ScannerApi::new(config.base_url.clone()));
        Arc::new(Self {
            api,
            config,
            bus: SessionEventBus::default(),
            scan: RwLock::new(None),
            monitor: RwLock::new(None),
            cancel: CancellationToken::new(),
        })
    }

    /// Subscribe to snapshot updates and finalization notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    /// Start a new scan session for `query`.
    ///
    /// Any scan session already active is disposed first. Returns the
    /// server-assigned scan id.
    pub async fn start_scan(&self, query: &str) -> Result<JobId, EngineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::Validation("query must not be empty".into()));
        }

        let mut slot = self.scan.write().await;
        if let Some(previous) = slot.take() {
            tracing::info!(job_id = %previous.job_id, "Disposing superseded scan session");
            previous.dispose(self.config.dispose_timeout).await;
        }

        let started = self.api.start_scan(query).await?;
        let handle = ScanSession::spawn(
            &self.api,
            started.scan_id.clone(),
            &self.config,
            &self.bus,
            self.cancel.child_token(),
        );
        tracing::info!(job_id = %handle.job_id, "Scan session started");
        *slot = Some(handle);
        Ok(started.scan_id)
    }

    /// Start a new monitor session.
    ///
    /// The request is validated before anything is sent; any monitor
    /// session already active is disposed first. Returns the
    /// server-assigned monitor id.
    pub async fn start_monitor(&self, request: MonitorRequest) -> Result<JobId, EngineError> {
        request.validate()?;

        let mut slot = self.monitor.write().await;
        if let Some(previous) = slot.take() {
            tracing::info!(job_id = %previous.job_id, "Disposing superseded monitor session");
            previous.dispose(self.config.dispose_timeout).await;
        }

        let started = self.api.start_monitor(&request).await?;
        let handle = MonitorSession::spawn(
            &self.api,
            started.monitor_id.clone(),
            &self.config,
            &self.bus,
            self.cancel.child_token(),
        );
        tracing::info!(
            job_id = %handle.job_id,
            ends_at = ?started.ends_at,
            "Monitor session started",
        );
        *slot = Some(handle);
        Ok(started.monitor_id)
    }

    /// Ask the backend to stop the active monitor.
    ///
    /// Stopping is asynchronous: the session keeps polling and only
    /// finalizes when a subsequent poll reports a terminal status.
    pub async fn stop_monitor(&self) -> Result<(), EngineError> {
        let slot = self.monitor.read().await;
        let handle = slot
            .as_ref()
            .ok_or_else(|| EngineError::Validation("no active monitor to stop".into()))?;
        self.api.stop_monitor(&handle.job_id).await
    }

    /// Latest snapshot of the current scan session, if any.
    ///
    /// A finalized session's frozen snapshot stays available until the
    /// session is replaced.
    pub async fn current_scan(&self) -> Option<JobSnapshot> {
        self.scan.read().await.as_ref().map(SessionHandle::snapshot)
    }

    /// Latest snapshot of the current monitor session, if any.
    pub async fn current_monitor(&self) -> Option<JobSnapshot> {
        self.monitor
            .read()
            .await
            .as_ref()
            .map(SessionHandle::snapshot)
    }

    /// Dispose every active session and release their channels.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down session registry");
        self.cancel.cancel();

        if let Some(handle) = self.scan.write().await.take() {
            handle.dispose(self.config.dispose_timeout).await;
        }
        if let Some(handle) = self.monitor.write().await.take() {
            handle.dispose(self.config.dispose_timeout).await;
        }
    }
}
