//! RealtimeHub - Session Event Distribution
//!
//! ## Responsibilities
//!
//! - Subscriber registry (one unbounded channel per subscriber)
//! - Broadcast of auditor events: sensor status, scan lifecycle, live mode,
//!   focus, remediation outcomes, alerts
//!
//! Messages are JSON with a `type`/`data` envelope. Image bytes never go
//! through the hub; subscribers read them from the session view.

use crate::models::ScanKind;
use crate::remediation::RemediationOutcome;
use crate::scan_scheduler::ScanRejection;
use crate::snapshot_service::SensorStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Hub message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HubMessage {
    SensorStatus(SensorStatusMessage),
    ScanStarted(ScanStartedMessage),
    ScanRejected(ScanRejectedMessage),
    ScanCompleted(ScanCompletedMessage),
    LiveMode(LiveModeMessage),
    FocusChanged(FocusChangedMessage),
    Remediation(RemediationMessage),
    /// Blocking user-facing notification
    Alert(AlertMessage),
}

impl HubMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            HubMessage::SensorStatus(_) => "sensor_status",
            HubMessage::ScanStarted(_) => "scan_started",
            HubMessage::ScanRejected(_) => "scan_rejected",
            HubMessage::ScanCompleted(_) => "scan_completed",
            HubMessage::LiveMode(_) => "live_mode",
            HubMessage::FocusChanged(_) => "focus_changed",
            HubMessage::Remediation(_) => "remediation",
            HubMessage::Alert(_) => "alert",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorStatusMessage {
    pub status: SensorStatus,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanStartedMessage {
    pub kind: ScanKind,
    pub sequence: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRejectedMessage {
    pub kind: ScanKind,
    pub rejection: ScanRejection,
}

/// Scan completion summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanCompletedMessage {
    pub kind: ScanKind,
    pub sequence: u64,
    pub issue_count: usize,
    pub compliance_score: u8,
    /// False when the completion was dropped (stale or session closed)
    pub applied: bool,
    /// Capture + inference time in milliseconds
    pub processing_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveModeMessage {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusChangedMessage {
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationMessage {
    pub outcome: RemediationOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertMessage {
    pub title: String,
    pub message: String,
}

/// Subscriber connection
struct Subscriber {
    id: Uuid,
    label: String,
    tx: mpsc::UnboundedSender<String>,
}

/// RealtimeHub instance
pub struct RealtimeHub {
    subscribers: RwLock<HashMap<Uuid, Subscriber>>,
    connection_count: AtomicU64,
}

impl RealtimeHub {
    /// Create new RealtimeHub
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            connection_count: AtomicU64::new(0),
        }
    }

    /// Register a new subscriber
    pub async fn register(&self, label: impl Into<String>) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let label = label.into();

        tracing::info!(subscriber_id = %id, label = %label, "Subscriber registered");

        self.subscribers
            .write()
            .await
            .insert(id, Subscriber { id, label, tx });
        self.connection_count.fetch_add(1, Ordering::Relaxed);

        (id, rx)
    }

    /// Unregister a subscriber
    pub async fn unregister(&self, id: &Uuid) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(sub) = subscribers.remove(id) {
            self.connection_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(subscriber_id = %id, label = %sub.label, "Subscriber unregistered");
        }
    }

    /// Broadcast message to all subscribers
    pub async fn broadcast(&self, message: HubMessage) {
        tracing::debug!(message_type = message.kind(), "Broadcasting message");

        let json = match serde_json::to_string(&message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
                return;
            }
        };

        let closed: Vec<Uuid> = {
            let subscribers = self.subscribers.read().await;
            subscribers
                .values()
                .filter(|sub| sub.tx.send(json.clone()).is_err())
                .map(|sub| sub.id)
                .collect()
        };

        // Receivers dropped without unregister
        for id in closed {
            tracing::warn!(subscriber_id = %id, "Subscriber channel closed, removing");
            self.unregister(&id).await;
        }
    }

    /// Get subscriber count
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}
