//! Application state
//!
//! Holds the configuration and all shared components

use crate::ai_client::{GeminiClient, GeminiConfig, InferenceClient};
use crate::audit_store::ApplyPolicy;
use crate::auditor::{AuditorConfig, AuditorSession};
use crate::error::{Error, Result};
use crate::realtime_hub::RealtimeHub;
use crate::scan_scheduler::SchedulerPolicy;
use crate::snapshot_service::{
    CameraDevice, FfmpegCamera, FrameCaptureSource, HttpSnapshotCamera, DEFAULT_JPEG_QUALITY,
};
use crate::stats_store::{StatsStore, AUDITOR_CONTEXT};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Gemini API key
    pub api_key: String,
    /// Gemini endpoint
    pub base_url: String,
    pub audit_model: String,
    pub edit_model: String,
    pub advisor_model: String,
    /// Per-request inference timeout
    pub inference_timeout: Duration,
    /// Thinking budget for the audit model
    pub thinking_budget: u32,
    /// Local camera input (ffmpeg `-i`)
    pub camera_device: String,
    /// ffmpeg input format (v4l2, avfoundation, dshow)
    pub camera_format: String,
    /// Snapshot URL; takes precedence over the local camera when set
    pub camera_snapshot_url: Option<String>,
    pub camera_timeout: Duration,
    pub jpeg_quality: u8,
    pub live_period: Duration,
    pub silent_cooldown: Duration,
    /// Ignore completions older than the applied one
    pub discard_stale_results: bool,
    /// Stats / transcript blob
    pub stats_path: PathBuf,
    /// Enable live mode once the camera is up
    pub auto_live: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let gemini = GeminiConfig::default();
        let scheduler = SchedulerPolicy::default();
        Self {
            api_key: env_string("GEMINI_API_KEY", ""),
            base_url: env_string("GEMINI_BASE_URL", &gemini.base_url),
            audit_model: env_string("AUDIT_MODEL", &gemini.audit_model),
            edit_model: env_string("EDIT_MODEL", &gemini.edit_model),
            advisor_model: env_string("ADVISOR_MODEL", &gemini.advisor_model),
            inference_timeout: Duration::from_secs(env_or(
                "INFERENCE_TIMEOUT_SECS",
                gemini.timeout.as_secs(),
            )),
            thinking_budget: env_or("AUDIT_THINKING_BUDGET", gemini.thinking_budget),
            camera_device: env_string("CAMERA_DEVICE", "/dev/video0"),
            camera_format: env_string("CAMERA_FORMAT", "v4l2"),
            camera_snapshot_url: std::env::var("CAMERA_SNAPSHOT_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            camera_timeout: Duration::from_secs(env_or("CAMERA_TIMEOUT_SECS", 10)),
            jpeg_quality: env_or("JPEG_QUALITY", DEFAULT_JPEG_QUALITY),
            live_period: Duration::from_secs(env_or(
                "LIVE_PERIOD_SECS",
                scheduler.live_period.as_secs(),
            )),
            silent_cooldown: Duration::from_secs(env_or(
                "SILENT_COOLDOWN_SECS",
                scheduler.silent_cooldown.as_secs(),
            )),
            discard_stale_results: env_or("DISCARD_STALE_RESULTS", false),
            stats_path: std::env::var("STATS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./walkinmyshoes_stats.json")),
            auto_live: env_or("AUTO_LIVE", false),
        }
    }
}

impl AppConfig {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config("GEMINI_API_KEY is not set".to_string()));
        }
        if self.live_period.is_zero() {
            return Err(Error::Config("LIVE_PERIOD_SECS must be positive".to_string()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::Config("JPEG_QUALITY must be 1-100".to_string()));
        }
        Ok(())
    }

    pub fn gemini_config(&self) -> GeminiConfig {
        GeminiConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            audit_model: self.audit_model.clone(),
            edit_model: self.edit_model.clone(),
            advisor_model: self.advisor_model.clone(),
            timeout: self.inference_timeout,
            thinking_budget: self.thinking_budget,
        }
    }

    pub fn auditor_config(&self) -> AuditorConfig {
        AuditorConfig {
            scheduler: SchedulerPolicy {
                silent_cooldown: self.silent_cooldown,
                live_period: self.live_period,
            },
            apply_policy: if self.discard_stale_results {
                ApplyPolicy::DiscardStale
            } else {
                ApplyPolicy::LastCompleted
            },
            context_label: AUDITOR_CONTEXT.to_string(),
        }
    }

    /// Camera device selected by the configuration
    pub fn camera_device(&self) -> Result<Arc<dyn CameraDevice>> {
        match &self.camera_snapshot_url {
            Some(url) => Ok(Arc::new(HttpSnapshotCamera::new(
                url.clone(),
                self.camera_timeout,
            )?)),
            None => Ok(Arc::new(FfmpegCamera::new(
                self.camera_device.clone(),
                self.camera_format.clone(),
                self.camera_timeout,
            ))),
        }
    }
}

/// Application state shared across tasks
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub inference: Arc<GeminiClient>,
    pub capture: Arc<FrameCaptureSource>,
    pub stats: Arc<StatsStore>,
    pub realtime: Arc<RealtimeHub>,
    pub auditor: Arc<AuditorSession>,
}

impl AppState {
    /// Wire all components from `config`
    pub async fn build(config: AppConfig) -> Result<Self> {
        let inference = Arc::new(GeminiClient::new(config.gemini_config())?);
        let capture = Arc::new(FrameCaptureSource::new(
            config.camera_device()?,
            config.jpeg_quality,
        ));
        let stats = Arc::new(StatsStore::load(config.stats_path.clone()).await);
        let realtime = Arc::new(RealtimeHub::new());

        let auditor = AuditorSession::new(
            capture.clone(),
            inference.clone() as Arc<dyn InferenceClient>,
            stats.clone(),
            realtime.clone(),
            config.auditor_config(),
        );

        Ok(Self {
            config,
            inference,
            capture,
            stats,
            realtime,
            auditor,
        })
    }
}
