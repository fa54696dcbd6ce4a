//! REST client for the scanner job-control endpoints.
//!
//! Wraps the backend HTTP surface (scan start/poll, monitor
//! start/poll/stop, stream subscription) using [`reqwest`]. All failures
//! are translated into the [`EngineError`] taxonomy at this boundary.

use piiwatch_core::error::EngineError;
use piiwatch_core::snapshot::{JobStatus, RiskLevel};
use piiwatch_core::types::Timestamp;
use serde::{Deserialize, Serialize};

use crate::timefmt;

/// HTTP client for a single scanner backend.
pub struct ScannerApi {
    client: reqwest::Client,
    base_url: String,
}

/// Response returned by `POST /api/scan` after queuing a scan.
#[derive(Debug, Deserialize)]
pub struct StartScanResponse {
    /// Server-assigned identifier for the queued scan.
    pub scan_id: String,
}

/// Full scan state returned by `GET /api/scan/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanStatus {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: Option<f64>,
    /// The complete log so far, not a delta.
    #[serde(default)]
    pub log: Vec<String>,
    #[serde(default)]
    pub total_findings: Option<i64>,
    #[serde(default)]
    pub overall_risk: Option<RiskLevel>,
    #[serde(default)]
    pub error: Option<String>,
}

/// What a monitor watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    Web,
    Url,
    Social,
    Email,
    All,
}

/// Request body for `POST /api/monitor/start`.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorRequest {
    pub mode: MonitorMode,
    pub query: Option<String>,
    pub url: Option<String>,
    pub platform: Option<String>,
    pub handle: Option<String>,
    pub email: Option<String>,
    pub max_results: u32,
    pub interval_seconds: u64,
    pub duration_minutes: u64,
}

impl MonitorRequest {
    /// A request for `mode` with the backend's default knobs.
    pub fn new(mode: MonitorMode) -> Self {
        Self {
            mode,
            query: None,
            url: None,
            platform: None,
            handle: None,
            email: None,
            max_results: 5,
            interval_seconds: 120,
            duration_minutes: 60,
        }
    }

    /// Reject requests the backend would refuse, before any channel opens.
    pub fn validate(&self) -> Result<(), EngineError> {
        let has = |field: &Option<String>| {
            field
                .as_deref()
                .is_some_and(|v| !v.trim().is_empty())
        };
        let social_target = has(&self.platform) && has(&self.handle);

        if has(&self.platform) != has(&self.handle) {
            return Err(EngineError::Validation(
                "social target needs both platform and handle".into(),
            ));
        }

        match self.mode {
            MonitorMode::Web if !has(&self.query) => Err(EngineError::Validation(
                "query is required for web mode".into(),
            )),
            MonitorMode::Url if !has(&self.url) => Err(EngineError::Validation(
                "url is required for url mode".into(),
            )),
            MonitorMode::Social if !social_target => Err(EngineError::Validation(
                "platform and handle are required for social mode".into(),
            )),
            MonitorMode::Email if !has(&self.email) => Err(EngineError::Validation(
                "email is required for email mode".into(),
            )),
            MonitorMode::All
                if !(has(&self.query) || has(&self.url) || has(&self.email) || social_target) =>
            {
                Err(EngineError::Validation(
                    "at least one target must be configured for all mode".into(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Response returned by `POST /api/monitor/start`.
#[derive(Debug, Deserialize)]
pub struct StartMonitorResponse {
    pub monitor_id: String,
    #[serde(default, deserialize_with = "timefmt::opt_flexible")]
    pub started_at: Option<Timestamp>,
    #[serde(default, deserialize_with = "timefmt::opt_flexible")]
    pub ends_at: Option<Timestamp>,
}

/// Full monitor state returned by `GET /api/monitor/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorStatus {
    pub status: JobStatus,
    #[serde(default, deserialize_with = "timefmt::opt_flexible")]
    pub started_at: Option<Timestamp>,
    #[serde(default, deserialize_with = "timefmt::opt_flexible")]
    pub ends_at: Option<Timestamp>,
    #[serde(default)]
    pub run_count: i64,
    #[serde(default)]
    pub total_findings: i64,
    #[serde(default)]
    pub alerts_sent: i64,
    #[serde(default)]
    pub last_summary: Option<MonitorRunSummary>,
    /// The complete log so far, not a delta.
    #[serde(default)]
    pub log: Vec<String>,
    #[serde(default, deserialize_with = "timefmt::opt_flexible")]
    pub next_run_at: Option<Timestamp>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Summary of a monitor's most recent run, as embedded in its status.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorRunSummary {
    #[serde(default)]
    pub total_pii: i64,
    #[serde(default)]
    pub overall_risk: Option<RiskLevel>,
    #[serde(default)]
    pub alert_ready: bool,
}

/// Error body shape used by the backend for non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

impl ScannerApi {
    /// Create a new API client.
    ///
    /// * `base_url` - backend root, e.g. `http://127.0.0.1:8000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Backend root URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Queue a new web search scan.
    pub async fn start_scan(&self, query: &str) -> Result<StartScanResponse, EngineError> {
        let body = serde_json::json!({ "query": query });
        let response = self
            .client
            .post(format!("{}/api/scan", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        Self::parse_response(response).await
    }

    /// Fetch the full state of a scan.
    pub async fn scan_status(&self, scan_id: &str) -> Result<ScanStatus, EngineError> {
        let response = self
            .client
            .get(format!("{}/api/scan/{}", self.base_url, scan_id))
            .send()
            .await
            .map_err(transport)?;
        Self::parse_response(response).await
    }

    /// Open the SSE event stream for a scan.
    ///
    /// The caller reads the response body incrementally; see
    /// [`crate::push`].
    pub(crate) async fn open_scan_stream(
        &self,
        scan_id: &str,
    ) -> Result<reqwest::Response, EngineError> {
        let response = self
            .client
            .get(format!("{}/api/scan/{}/stream", self.base_url, scan_id))
            .send()
            .await
            .map_err(transport)?;
        Self::ensure_success(response).await
    }

    /// Start a recurring monitor.
    pub async fn start_monitor(
        &self,
        request: &MonitorRequest,
    ) -> Result<StartMonitorResponse, EngineError> {
        let response = self
            .client
            .post(format!("{}/api/monitor/start", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        Self::parse_response(response).await
    }

    /// Fetch the full state of a monitor.
    pub async fn monitor_status(&self, monitor_id: &str) -> Result<MonitorStatus, EngineError> {
        let response = self
            .client
            .get(format!("{}/api/monitor/{}", self.base_url, monitor_id))
            .send()
            .await
            .map_err(transport)?;
        Self::parse_response(response).await
    }

    /// Request a monitor stop.
    ///
    /// Stopping is asynchronous on the server; the caller keeps polling
    /// until the monitor itself reports a terminal status.
    pub async fn stop_monitor(&self, monitor_id: &str) -> Result<(), EngineError> {
        let response = self
            .client
            .post(format!("{}/api/monitor/{}/stop", self.base_url, monitor_id))
            .send()
            .await
            .map_err(transport)?;
        Self::check_status(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. On failure, extract
    /// the backend's `detail` message when the body carries one.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, EngineError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.detail)
                .unwrap_or(body);
            return Err(EngineError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, EngineError> {
        let response = Self::ensure_success(response).await?;
        response.json::<T>().await.map_err(transport)
    }

    /// Assert a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), EngineError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

fn transport(err: reqwest::Error) -> EngineError {
    EngineError::Transport(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn social(platform: Option<&str>, handle: Option<&str>) -> MonitorRequest {
        let mut req = MonitorRequest::new(MonitorMode::Social);
        req.platform = platform.map(String::from);
        req.handle = handle.map(String::from);
        req
    }

    #[test]
    fn web_mode_requires_a_query() {
        let req = MonitorRequest::new(MonitorMode::Web);
        assert_matches!(req.validate(), Err(EngineError::Validation(_)));

        let mut req = MonitorRequest::new(MonitorMode::Web);
        req.query = Some("jane doe".into());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn url_mode_requires_a_url() {
        let req = MonitorRequest::new(MonitorMode::Url);
        assert_matches!(req.validate(), Err(EngineError::Validation(_)));
    }

    #[test]
    fn social_mode_requires_platform_and_handle() {
        assert_matches!(
            social(None, None).validate(),
            Err(EngineError::Validation(_))
        );
        assert_matches!(
            social(Some("github"), None).validate(),
            Err(EngineError::Validation(_))
        );
        assert!(social(Some("github"), Some("octocat")).validate().is_ok());
    }

    #[test]
    fn lone_platform_or_handle_is_invalid_in_any_mode() {
        let mut req = MonitorRequest::new(MonitorMode::All);
        req.query = Some("jane doe".into());
        req.platform = Some("github".into());
        assert_matches!(req.validate(), Err(EngineError::Validation(_)));
    }

    #[test]
    fn all_mode_requires_at_least_one_target() {
        let req = MonitorRequest::new(MonitorMode::All);
        assert_matches!(req.validate(), Err(EngineError::Validation(_)));

        let mut req = MonitorRequest::new(MonitorMode::All);
        req.email = Some("jane@example.com".into());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn whitespace_only_targets_do_not_count() {
        let mut req = MonitorRequest::new(MonitorMode::Web);
        req.query = Some("   ".into());
        assert_matches!(req.validate(), Err(EngineError::Validation(_)));
    }

    #[test]
    fn scan_status_parses_a_minimal_payload() {
        let status: ScanStatus = serde_json::from_str(r#"{"status": "running"}"#).unwrap();
        assert_eq!(status.status, JobStatus::Running);
        assert!(status.progress.is_none());
        assert!(status.log.is_empty());
    }

    #[test]
    fn scan_status_parses_a_completed_payload() {
        let status: ScanStatus = serde_json::from_str(
            r#"{
                "status": "completed",
                "progress": 100,
                "log": ["a", "b"],
                "total_findings": 4,
                "overall_risk": "MEDIUM"
            }"#,
        )
        .unwrap();
        assert_eq!(status.total_findings, Some(4));
        assert_eq!(status.overall_risk, Some(RiskLevel::Medium));
    }

    #[test]
    fn monitor_status_parses_naive_timestamps() {
        let status: MonitorStatus = serde_json::from_str(
            r#"{
                "status": "running",
                "started_at": "2026-08-06T10:00:00.500",
                "ends_at": "2026-08-06T11:00:00.500",
                "run_count": 3,
                "last_summary": {"total_pii": 2, "overall_risk": "HIGH", "alert_ready": true}
            }"#,
        )
        .unwrap();
        assert!(status.started_at.is_some());
        assert!(status.ends_at.is_some());
        assert_eq!(status.run_count, 3);
        let summary = status.last_summary.unwrap();
        assert_eq!(summary.overall_risk, Some(RiskLevel::High));
        assert!(summary.alert_ready);
    }

    #[test]
    fn monitor_status_ignores_unknown_summary_keys() {
        let status: MonitorStatus = serde_json::from_str(
            r#"{
                "status": "running",
                "last_summary": {"total_pii": 1, "by_method": {"regex": 1}}
            }"#,
        )
        .unwrap();
        assert_eq!(status.last_summary.unwrap().total_pii, 1);
    }

    #[test]
    fn base_url_is_normalized() {
        let api = ScannerApi::new("http://localhost:8000/");
        assert_eq!(api.base_url(), "http://localhost:8000");
    }
}
