//! Empathy Auditor
//!
//! Headless runner: starts the camera, optionally enables live mode, and
//! logs every session event until Ctrl-C.

use empathy_auditor::{
    models::ScanKind,
    state::{AppConfig, AppState},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "empathy_auditor=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Empathy Auditor v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    config.validate()?;
    tracing::info!(
        base_url = %config.base_url,
        audit_model = %config.audit_model,
        edit_model = %config.edit_model,
        camera = %config.camera_snapshot_url.as_deref().unwrap_or(&config.camera_device),
        stats_path = %config.stats_path.display(),
        live_period_secs = config.live_period.as_secs(),
        "Configuration loaded"
    );

    let state = AppState::build(config).await?;
    tracing::info!("Components initialized");

    if state.inference.health_check().await {
        tracing::info!("Inference service reachable");
    } else {
        tracing::warn!("Inference service unreachable, scans will come back empty");
    }

    // Event log subscriber
    let (subscriber_id, mut events) = state.realtime.register("console").await;
    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::info!(event = %event, "Session event");
        }
    });

    match state.auditor.start_camera().await {
        Ok(status) => {
            tracing::info!(?status, "Camera started");
            if state.config.auto_live {
                state.auditor.set_live_mode(true).await?;
            } else {
                match state.auditor.scan(ScanKind::Manual).await {
                    Ok(outcome) => tracing::info!(?outcome, "Initial scan finished"),
                    Err(e) => tracing::error!(error = %e, "Initial scan failed"),
                }
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Camera unavailable, waiting for shutdown");
        }
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    state.auditor.shutdown().await;
    state.realtime.unregister(&subscriber_id).await;
    event_task.abort();

    let stats = state.stats.stats().await;
    tracing::info!(
        audits = stats.audit_reports_generated,
        scenarios = stats.scenarios_completed,
        "Empathy Auditor stopped"
    );

    Ok(())
}
