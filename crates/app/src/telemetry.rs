use std::{
    fmt::Write as _,
    sync::{Mutex, OnceLock, PoisonError},
    time::Instant,
};

use metrics::describe_gauge;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;
use tracing_subscriber::{
    fmt::{self as tracing_fmt, time::UtcTime},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer,
};

use id_review_util::{AppConfig, Environment};

use crate::{review, session};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to initialize tracing: {0}")]
    Tracing(#[from] TryInitError),
    #[error("failed to install prometheus recorder: {0}")]
    Metrics(#[from] BuildError),
}

static TRACING_READY: OnceLock<()> = OnceLock::new();
static RECORDER: Mutex<Option<PrometheusHandle>> = Mutex::new(None);
static STARTED_AT: OnceLock<Instant> = OnceLock::new();

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn git_sha() -> &'static str {
    option_env!("GIT_SHA").unwrap_or("unknown")
}

/// Installs the global subscriber: human-readable output while developing,
/// one JSON object per line in production.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryError> {
    if TRACING_READY.get().is_some() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let output = match config.environment {
        Environment::Production => tracing_fmt::layer()
            .json()
            .with_target(false)
            .with_timer(UtcTime::rfc_3339())
            .boxed(),
        Environment::Development | Environment::Test => tracing_fmt::layer()
            .pretty()
            .with_target(false)
            .with_timer(UtcTime::rfc_3339())
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()?;

    TRACING_READY.set(()).ok();
    tracing::info!(stage = "telemetry", env = %config.environment.as_str(), version = VERSION, git_sha = git_sha(), "tracing initialized");
    Ok(())
}

/// Installs the Prometheus recorder once and returns its handle on every call.
pub fn init_metrics() -> Result<PrometheusHandle, TelemetryError> {
    let mut recorder = RECORDER.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(handle) = recorder.as_ref() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_gauge!("app_build_info", "Build metadata for the running binary");
    describe_gauge!("app_uptime_seconds", "Seconds since the process started");
    session::describe_metrics();
    review::describe_metrics();
    STARTED_AT.get_or_init(Instant::now);

    *recorder = Some(handle.clone());
    Ok(handle)
}

/// Recorder output followed by the build and uptime gauges, which are
/// computed at scrape time.
pub fn render_metrics(handle: &PrometheusHandle) -> String {
    let mut body = handle.render();
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }

    let uptime = STARTED_AT
        .get()
        .map(|start| start.elapsed().as_secs_f64())
        .unwrap_or_default();
    let _ = writeln!(body, "# TYPE app_build_info gauge");
    let _ = writeln!(
        body,
        "app_build_info{{version=\"{VERSION}\",git=\"{}\"}} 1",
        git_sha()
    );
    let _ = writeln!(body, "# TYPE app_uptime_seconds gauge");
    let _ = writeln!(body, "app_uptime_seconds {uptime}");
    body
}
