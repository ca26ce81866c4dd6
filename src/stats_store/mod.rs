//! StatsStore - Persistent Progress and Transcripts
//!
//! ## Responsibilities
//!
//! - Aggregate counters (scenarios, audits, time spent, empathy score)
//! - Per-context chat transcripts
//! - Single JSON blob on disk, rehydrated at startup, rewritten on every change
//!
//! The auditor only sees the `SessionLedger` trait.

use crate::error::Result;
use crate::models::ChatMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// Context label of the AR auditor transcript
pub const AUDITOR_CONTEXT: &str = "AR_AUDITOR";

/// Minutes credited per completed scenario
const MINUTES_PER_SCENARIO: u32 = 8;

/// History and counter sink used by the auditor and the advisor
#[async_trait]
pub trait SessionLedger: Send + Sync {
    /// Append one turn to the transcript of `context`
    async fn append_history(&self, context: &str, message: ChatMessage) -> Result<()>;

    /// Count one generated audit report
    async fn increment_audit_count(&self) -> Result<()>;

    /// Full transcript of `context`, hidden turns included
    async fn history(&self, context: &str) -> Vec<ChatMessage>;
}

/// Persisted aggregate state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmpathyStats {
    pub scenarios_completed: u32,
    pub empathy_score: u32,
    pub audit_reports_generated: u32,
    pub time_spent_minutes: u32,
    pub chat_histories: HashMap<String, Vec<ChatMessage>>,
}

impl EmpathyStats {
    /// Blend a scenario score into the running average
    ///
    /// The first sample is taken as-is, later ones are averaged with the
    /// current score.
    pub fn record_scenario(&mut self, score: u32) {
        let divisor = if self.scenarios_completed > 0 { 2.0 } else { 1.0 };
        self.empathy_score = ((self.empathy_score + score) as f64 / divisor).round() as u32;
        self.scenarios_completed += 1;
        self.time_spent_minutes += MINUTES_PER_SCENARIO;
    }
}

/// File-backed stats holder
pub struct StatsStore {
    path: Option<PathBuf>,
    stats: Mutex<EmpathyStats>,
}

impl StatsStore {
    /// Load from `path`; a missing or unreadable file yields defaults
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let stats = match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<EmpathyStats>(&bytes) {
                Ok(stats) => {
                    tracing::info!(path = %path.display(), "Stats loaded");
                    stats
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Corrupt stats file, starting fresh");
                    EmpathyStats::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No stats file, starting fresh");
                EmpathyStats::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read stats file");
                EmpathyStats::default()
            }
        };

        Self {
            path: Some(path),
            stats: Mutex::new(stats),
        }
    }

    /// Store without persistence
    pub fn in_memory() -> Self {
        Self {
            path: None,
            stats: Mutex::new(EmpathyStats::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn stats(&self) -> EmpathyStats {
        self.stats.lock().await.clone()
    }

    pub async fn complete_scenario(&self, score: u32) -> Result<EmpathyStats> {
        let mut stats = self.stats.lock().await;
        stats.record_scenario(score);
        self.persist(&stats).await?;
        Ok(stats.clone())
    }

    /// Replace the whole transcript of `context`
    pub async fn replace_history(&self, context: &str, messages: Vec<ChatMessage>) -> Result<()> {
        let mut stats = self.stats.lock().await;
        stats.chat_histories.insert(context.to_string(), messages);
        self.persist(&stats).await
    }

    /// Write via temp file + rename
    async fn persist(&self, stats: &EmpathyStats) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(stats)?;
        let tmp = path.with_extension("json.tmp");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(&tmp, &json).await?;
        fs::rename(&tmp, path).await?;

        tracing::trace!(path = %path.display(), bytes = json.len(), "Stats persisted");
        Ok(())
    }
}

#[async_trait]
impl SessionLedger for StatsStore {
    async fn append_history(&self, context: &str, message: ChatMessage) -> Result<()> {
        let mut stats = self.stats.lock().await;
        stats
            .chat_histories
            .entry(context.to_string())
            .or_default()
            .push(message);
        self.persist(&stats).await
    }

    async fn increment_audit_count(&self) -> Result<()> {
        let mut stats = self.stats.lock().await;
        stats.audit_reports_generated += 1;
        self.persist(&stats).await
    }

    async fn history(&self, context: &str) -> Vec<ChatMessage> {
        self.stats
            .lock()
            .await
            .chat_histories
            .get(context)
            .cloned()
            .unwrap_or_default()
    }
}
