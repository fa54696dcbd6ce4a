//! `piiwatch` -- terminal client for the PII scanner backend.
//!
//! Starts a scan or monitor job, follows its progress and log through
//! the synchronization engine, and prints the final outcome when the
//! session finalizes.
//!
//! # Environment variables
//!
//! | Variable                     | Required | Default                 | Description                     |
//! |------------------------------|----------|-------------------------|---------------------------------|
//! | `PIIWATCH_API_URL`           | no       | `http://127.0.0.1:8000` | Scanner backend root URL        |
//! | `PIIWATCH_SCAN_POLL_SECS`    | no       | `2`                     | Scan poll interval, seconds     |
//! | `PIIWATCH_MONITOR_POLL_SECS` | no       | `3`                     | Monitor poll interval, seconds  |

mod render;

use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use piiwatch_core::snapshot::{JobKind, JobStatus};
use piiwatch_sync::api::{MonitorMode, MonitorRequest};
use piiwatch_sync::config::SyncConfig;
use piiwatch_sync::events::SessionEvent;
use piiwatch_sync::registry::SessionRegistry;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::render::Renderer;

#[derive(Parser)]
#[command(name = "piiwatch", version, about = "Track PII scanner jobs from the terminal")]
struct Cli {
    /// Backend root URL (overrides PIIWATCH_API_URL).
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a one-shot web search scan and follow it to completion.
    Scan {
        /// Search query to scan for exposed PII.
        query: String,
    },
    /// Run a recurring monitor. Ctrl-C requests a stop; the monitor
    /// finalizes once the backend confirms it.
    Monitor(MonitorArgs),
}

#[derive(Args)]
struct MonitorArgs {
    /// What the monitor watches.
    #[arg(long, value_enum, default_value = "all")]
    mode: ModeArg,
    /// Web search query (web/all modes).
    #[arg(long)]
    query: Option<String>,
    /// Page URL to re-scan (url/all modes).
    #[arg(long)]
    url: Option<String>,
    /// Social platform name (social/all modes).
    #[arg(long)]
    platform: Option<String>,
    /// Social handle (social/all modes).
    #[arg(long)]
    handle: Option<String>,
    /// Email address to watch (email/all modes).
    #[arg(long)]
    email: Option<String>,
    /// Maximum results per run.
    #[arg(long, default_value_t = 5)]
    max_results: u32,
    /// Seconds between monitor runs.
    #[arg(long, default_value_t = 120)]
    interval_seconds: u64,
    /// Total monitoring window in minutes.
    #[arg(long, default_value_t = 60)]
    duration_minutes: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Web,
    Url,
    Social,
    Email,
    All,
}

impl From<ModeArg> for MonitorMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Web => Self::Web,
            ModeArg::Url => Self::Url,
            ModeArg::Social => Self::Social,
            ModeArg::Email => Self::Email,
            ModeArg::All => Self::All,
        }
    }
}

impl MonitorArgs {
    fn into_request(self) -> MonitorRequest {
        MonitorRequest {
            mode: self.mode.into(),
            query: self.query,
            url: self.url,
            platform: self.platform,
            handle: self.handle,
            email: self.email,
            max_results: self.max_results,
            interval_seconds: self.interval_seconds,
            duration_minutes: self.duration_minutes,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "piiwatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = SyncConfig::from_env();
    if let Some(api_url) = cli.api_url {
        config.base_url = api_url;
    }
    let registry = SessionRegistry::new(config);

    match cli.command {
        Command::Scan { query } => run_scan(registry, &query).await,
        Command::Monitor(args) => run_monitor(registry, args.into_request()).await,
    }
}

/// Follow a scan session until it finalizes.
async fn run_scan(registry: Arc<SessionRegistry>, query: &str) -> anyhow::Result<()> {
    let mut events = registry.subscribe();
    let job_id = registry.start_scan(query).await?;
    println!("scan {job_id} started");

    let mut renderer = Renderer::new();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("interrupted; abandoning scan {job_id}");
                registry.shutdown().await;
                std::process::exit(130);
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Updated { kind: JobKind::Scan, snapshot }) => {
                    renderer.apply(&snapshot);
                }
                Ok(SessionEvent::Finalized { kind: JobKind::Scan, snapshot }) => {
                    renderer.apply(&snapshot);
                    renderer.outcome(&snapshot);
                    return exit_status(snapshot.status);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Renderer lagged behind session events");
                }
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    }
}

/// Follow a monitor session until it finalizes. The first Ctrl-C asks
/// the backend to stop the monitor and keeps following; a second Ctrl-C
/// abandons the session.
async fn run_monitor(
    registry: Arc<SessionRegistry>,
    request: MonitorRequest,
) -> anyhow::Result<()> {
    let mut events = registry.subscribe();
    let job_id = registry.start_monitor(request).await?;
    println!("monitor {job_id} started");

    let mut renderer = Renderer::new();
    let mut stop_requested = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                if stop_requested {
                    println!("interrupted again; abandoning monitor {job_id}");
                    registry.shutdown().await;
                    std::process::exit(130);
                }
                stop_requested = true;
                println!("stop requested; waiting for the backend to wind down");
                if let Err(e) = registry.stop_monitor().await {
                    tracing::error!(error = %e, "Stop request failed");
                }
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Updated { kind: JobKind::Monitor, snapshot }) => {
                    renderer.apply(&snapshot);
                }
                Ok(SessionEvent::Finalized { kind: JobKind::Monitor, snapshot }) => {
                    renderer.apply(&snapshot);
                    renderer.outcome(&snapshot);
                    return exit_status(snapshot.status);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Renderer lagged behind session events");
                }
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    }
}

fn exit_status(status: JobStatus) -> anyhow::Result<()> {
    match status {
        JobStatus::Error => anyhow::bail!("job ended with an error"),
        _ => Ok(()),
    }
}
