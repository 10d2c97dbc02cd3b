//! Order Reconciler Binary
//!
//! Follows one workspace: attaches the reconciliation controller and serves
//! health, metrics and cached views over HTTP.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin order-reconciler
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `RECONCILER_WORKSPACE_ID`: Workspace to follow
//! - `RECONCILER_PUSH_URL`: WebSocket push source (`ws://` or `wss://`)
//! - `RECONCILER_API_BASE_URL`: REST query boundary base URL
//!
//! ## Optional
//! - `RECONCILER_TIME_ZONE`: IANA zone for day boundaries (default: America/Sao_Paulo)
//! - `RECONCILER_PERIOD_DAYS`: Trailing period length (default: 30)
//! - `RECONCILER_PERIOD_FROM` / `RECONCILER_PERIOD_TO`: Custom period, `YYYY-MM-DD`
//! - `RECONCILER_LIST_DATE`: Recent-orders day, `YYYY-MM-DD` (default: today)
//! - `RECONCILER_LIST_LIMIT`: Recent-orders capacity (default: 50)
//! - `RECONCILER_INCLUDE_CANCELLED`: Include cancelled orders (default: false)
//! - `RECONCILER_FALLBACK_INTERVAL_SECS`: Fallback polling interval (default: 30)
//! - `RECONCILER_PROCESSED_KEYS_CAP`: Processed key cap, 0 = unbounded (default: 0)
//! - `RECONCILER_HTTP_TIMEOUT_SECS`: REST timeout (default: 15)
//! - `RECONCILER_RECONNECT_DELAY_INITIAL_MS`, `RECONCILER_RECONNECT_DELAY_MAX_SECS`,
//!   `RECONCILER_RECONNECT_DELAY_MULTIPLIER`, `RECONCILER_MAX_RECONNECT_ATTEMPTS`
//! - `RECONCILER_HEALTH_PORT`: Health HTTP port (default: 8083)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`, `RUST_LOG`

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use order_reconciler::infrastructure::health::{HealthServer, HealthServerState};
use order_reconciler::infrastructure::telemetry;
use order_reconciler::{
    AttachOutcome, HttpSnapshotSource, ReconcilerConfig, ReconciliationController,
    WebSocketPushTransport, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Time allowed for the health server to drain.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Ignore the error when a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    load_dotenv();

    let _telemetry_guard = telemetry::init().context("initializing telemetry")?;

    tracing::info!("Starting Order Reconciler");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = ReconcilerConfig::from_env().context("loading configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let transport = Arc::new(WebSocketPushTransport::new(config.push.clone()));
    transport
        .subscription_url(&config.workspace_id)
        .context("validating push URL")?;
    let source = Arc::new(HttpSnapshotSource::new(&config.rest).context("building REST client")?);

    let controller = Arc::new(ReconciliationController::new(
        config.controller_settings(),
        transport,
        source,
    ));

    match controller.attach(&config.selection()) {
        AttachOutcome::Attached => tracing::info!("Reconciliation session attached"),
        outcome => tracing::warn!(?outcome, "Reconciliation session not attached"),
    }

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&controller),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    let health_task = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Order reconciler ready");

    await_shutdown().await;

    controller.dispose();
    shutdown_token.cancel();
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, health_task)
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Health server did not stop in time"
        );
    }

    tracing::info!("Order reconciler stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &ReconcilerConfig) {
    tracing::info!(
        workspace_id = %config.workspace_id,
        time_zone = %config.time_zone,
        period = ?config.period,
        list_window = ?config.list_window,
        list_limit = config.list_limit,
        fallback_interval_secs = config.fallback_interval.as_secs(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        push_url = %config.push.url,
        api_base_url = %config.rest.base_url,
        "Upstream endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
