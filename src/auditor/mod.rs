//! AuditorSession - AR Audit Pipeline
//!
//! ## Responsibilities
//!
//! - Camera lifecycle and the DENIED alert
//! - Manual and live (silent) scans: admission, capture, analysis, store update
//! - Manual completion bookkeeping (hidden transcript note + audit counter)
//! - Overlay focus and its two actions (remediation prefill, advisor question)
//! - Remediation submissions against the current captured frame
//! - Teardown: live timer cancelled, store sealed, late completions ignored
//!
//! ## Scan flow
//!
//! ```text
//! scan(kind) -> scheduler.try_begin -> capture.snapshot -> analyze_image
//!            -> store.apply -> [manual] ledger note + counter -> hub
//! ```

use crate::ai_client::InferenceClient;
use crate::audit_store::{ApplyPolicy, AuditStateStore};
use crate::error::{Error, Result};
use crate::models::{AuditResult, CapturedFrame, ChatMessage, RemediationResult, ScanKind};
use crate::overlay::{self, IssueDetail, OverlayRegion, OverlayRenderer, Viewport};
use crate::realtime_hub::{
    AlertMessage, FocusChangedMessage, HubMessage, LiveModeMessage, RealtimeHub,
    RemediationMessage, ScanCompletedMessage, ScanRejectedMessage, ScanStartedMessage,
    SensorStatusMessage,
};
use crate::remediation::{
    DisplayedImage, RemediationOutcome, RemediationPhase, RemediationWorkflow,
};
use crate::scan_scheduler::{LiveTimer, ScanRejection, ScanScheduler, SchedulerPolicy};
use crate::snapshot_service::{FrameCaptureSource, FrameDimensions, SensorStatus};
use crate::stats_store::{SessionLedger, AUDITOR_CONTEXT};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Session configuration
#[derive(Debug, Clone)]
pub struct AuditorConfig {
    pub scheduler: SchedulerPolicy,
    pub apply_policy: ApplyPolicy,
    /// Ledger context the transcript notes go to
    pub context_label: String,
}

impl Default for AuditorConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerPolicy::default(),
            apply_policy: ApplyPolicy::default(),
            context_label: AUDITOR_CONTEXT.to_string(),
        }
    }
}

/// Result of a scan request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
    Completed {
        sequence: u64,
        /// False when the store dropped the completion
        applied: bool,
        issue_count: usize,
        compliance_score: u8,
    },
    Rejected { rejection: ScanRejection },
}

impl ScanOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ScanOutcome::Completed { .. })
    }
}

/// Everything a front end needs to draw the auditor
#[derive(Debug, Clone, Serialize)]
pub struct AuditorView {
    pub sensor: SensorStatus,
    pub dimensions: Option<FrameDimensions>,
    pub live: bool,
    /// Any scan in flight
    pub scanning: bool,
    /// Manual scan in flight
    pub loading: bool,
    /// Silent scan in flight
    pub processing: bool,
    pub compliance_score: Option<u8>,
    pub regions: Vec<OverlayRegion>,
    pub focused: Option<IssueDetail>,
    pub has_frame: bool,
    pub remediation_phase: RemediationPhase,
    pub remediation_instruction: String,
    pub can_submit_remediation: bool,
    pub displayed_image: DisplayedImage,
}

fn manual_scan_note(score: u8) -> String {
    format!(
        "[SYSTEM] Manual analysis complete. Accessibility score: {}%.",
        score
    )
}

fn remediation_note(instruction: &str) -> String {
    format!("[SYSTEM] Visual fix rendered: \"{}\"", instruction)
}

/// One auditor session
pub struct AuditorSession {
    capture: Arc<FrameCaptureSource>,
    inference: Arc<dyn InferenceClient>,
    ledger: Arc<dyn SessionLedger>,
    hub: Arc<RealtimeHub>,
    scheduler: Arc<ScanScheduler>,
    store: AuditStateStore,
    overlay: Mutex<OverlayRenderer>,
    remediation: Mutex<RemediationWorkflow>,
    live: LiveTimer,
    closed: AtomicBool,
    config: AuditorConfig,
}

impl AuditorSession {
    /// Create new session
    pub fn new(
        capture: Arc<FrameCaptureSource>,
        inference: Arc<dyn InferenceClient>,
        ledger: Arc<dyn SessionLedger>,
        hub: Arc<RealtimeHub>,
        config: AuditorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            capture,
            inference,
            ledger,
            hub,
            scheduler: Arc::new(ScanScheduler::new(config.scheduler)),
            store: AuditStateStore::new(config.apply_policy),
            overlay: Mutex::new(OverlayRenderer::new()),
            remediation: Mutex::new(RemediationWorkflow::new()),
            live: LiveTimer::new(),
            closed: AtomicBool::new(false),
            config,
        })
    }

    pub fn config(&self) -> &AuditorConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Camera
    // ========================================================================

    /// Acquire the camera. Any failure leaves the sensor DENIED and raises
    /// an alert.
    pub async fn start_camera(&self) -> Result<SensorStatus> {
        if self.is_closed() {
            return Err(Error::Validation("Session is closed".to_string()));
        }

        match self.capture.start().await {
            Ok(status) => {
                self.broadcast_sensor().await;
                Ok(status)
            }
            Err(e) => {
                self.broadcast_sensor().await;
                let message = if e.is_permission_denied() {
                    "Camera access was denied. Allow camera access and retry.".to_string()
                } else {
                    format!("Camera could not be started: {}", e)
                };
                self.hub
                    .broadcast(HubMessage::Alert(AlertMessage {
                        title: "Camera unavailable".to_string(),
                        message,
                    }))
                    .await;
                Err(e)
            }
        }
    }

    /// Release the camera; live mode is disarmed with it
    pub async fn stop_camera(&self) {
        self.disarm_live().await;
        self.capture.stop().await;
        self.broadcast_sensor().await;
    }

    async fn broadcast_sensor(&self) {
        let status = self.capture.status().await;
        let dims = self.capture.dimensions().await;
        self.hub
            .broadcast(HubMessage::SensorStatus(SensorStatusMessage {
                status,
                width: dims.map(|d| d.width),
                height: dims.map(|d| d.height),
            }))
            .await;
    }

    // ========================================================================
    // Scans
    // ========================================================================

    /// Run one scan of `kind`
    ///
    /// Rejections are reported in the outcome; a capture failure is an error.
    /// Analysis failures are not: they come back as the empty result.
    pub async fn scan(&self, kind: ScanKind) -> Result<ScanOutcome> {
        if self.is_closed() {
            return Ok(ScanOutcome::Rejected {
                rejection: ScanRejection::SessionClosed,
            });
        }
        if !self.capture.is_active().await {
            return Ok(self.reject(kind, ScanRejection::SensorOffline).await);
        }

        let lease = match self.scheduler.try_begin(kind) {
            Ok(lease) => lease,
            Err(rejection) => return Ok(self.reject(kind, rejection).await),
        };
        let sequence = lease.sequence();

        self.hub
            .broadcast(HubMessage::ScanStarted(ScanStartedMessage { kind, sequence }))
            .await;

        let frame = match self.capture.snapshot().await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(kind = kind.as_str(), sequence, error = %e, "Snapshot failed");
                return Err(e);
            }
        };

        let result = self.inference.analyze_image(&frame).await;
        let issue_count = result.issues.len();
        let compliance_score = result.compliance_score;

        let applied = self.store.apply(sequence, frame, result).await;
        if applied {
            self.overlay.lock().blur();
        }

        if kind == ScanKind::Manual && applied && !self.is_closed() {
            self.record_manual_completion(compliance_score).await;
        }

        let processing_ms = lease.elapsed().as_millis() as u64;
        drop(lease);

        tracing::info!(
            kind = kind.as_str(),
            sequence,
            issues = issue_count,
            score = compliance_score,
            applied,
            processing_ms,
            "Scan completed"
        );

        if !self.is_closed() {
            self.hub
                .broadcast(HubMessage::ScanCompleted(ScanCompletedMessage {
                    kind,
                    sequence,
                    issue_count,
                    compliance_score,
                    applied,
                    processing_ms,
                }))
                .await;
        }

        Ok(ScanOutcome::Completed {
            sequence,
            applied,
            issue_count,
            compliance_score,
        })
    }

    async fn reject(&self, kind: ScanKind, rejection: ScanRejection) -> ScanOutcome {
        self.hub
            .broadcast(HubMessage::ScanRejected(ScanRejectedMessage { kind, rejection }))
            .await;
        ScanOutcome::Rejected { rejection }
    }

    async fn record_manual_completion(&self, score: u8) {
        let context = &self.config.context_label;
        if let Err(e) = self
            .ledger
            .append_history(context, ChatMessage::hidden_note(manual_scan_note(score)))
            .await
        {
            tracing::warn!(error = %e, "Failed to record manual scan note");
        }
        if let Err(e) = self.ledger.increment_audit_count().await {
            tracing::warn!(error = %e, "Failed to increment audit count");
        }
    }

    // ========================================================================
    // Live mode
    // ========================================================================

    /// Enable or disable live mode
    ///
    /// Enabling fires one silent scan right away and then one per period.
    /// Requires an active camera.
    pub async fn set_live_mode(self: &Arc<Self>, enabled: bool) -> Result<()> {
        if !enabled {
            self.disarm_live().await;
            return Ok(());
        }

        if self.is_closed() {
            return Err(Error::Validation("Session is closed".to_string()));
        }
        if !self.capture.is_active().await {
            return Err(Error::Validation(
                "Live mode requires an active camera".to_string(),
            ));
        }

        self.live.arm(
            self.config.scheduler.live_period,
            Arc::downgrade(self),
            |session: Arc<AuditorSession>| async move {
                if let Err(e) = session.scan(ScanKind::Silent).await {
                    tracing::warn!(error = %e, "Silent scan failed");
                }
            },
        );
        self.hub
            .broadcast(HubMessage::LiveMode(LiveModeMessage { enabled: true }))
            .await;
        Ok(())
    }

    pub fn is_live(&self) -> bool {
        self.live.is_armed()
    }

    async fn disarm_live(&self) {
        if self.live.disarm() {
            self.hub
                .broadcast(HubMessage::LiveMode(LiveModeMessage { enabled: false }))
                .await;
        }
    }

    // ========================================================================
    // Overlay
    // ========================================================================

    pub async fn current_result(&self) -> Option<Arc<AuditResult>> {
        self.store.current_result().await
    }

    pub async fn current_frame(&self) -> Option<Arc<CapturedFrame>> {
        self.store.current_frame().await
    }

    /// Focus issue `index` of the current result
    pub async fn focus_issue(&self, index: usize) -> Option<IssueDetail> {
        let result = self.store.current_result().await?;
        let detail = {
            let mut overlay = self.overlay.lock();
            if !overlay.focus(&result, index) {
                return None;
            }
            overlay.focused_detail(&result)
        };

        self.hub
            .broadcast(HubMessage::FocusChanged(FocusChangedMessage { index: Some(index) }))
            .await;
        detail
    }

    pub async fn clear_focus(&self) {
        let was_focused = {
            let mut overlay = self.overlay.lock();
            let was = overlay.focused().is_some();
            overlay.blur();
            was
        };
        if was_focused {
            self.hub
                .broadcast(HubMessage::FocusChanged(FocusChangedMessage { index: None }))
                .await;
        }
    }

    /// Prefill the remediation instruction from issue `index`
    pub async fn prefill_remediation(&self, index: usize) -> Option<String> {
        let result = self.store.current_result().await?;
        let instruction = overlay::remediation_instruction(result.issue(index)?);
        self.remediation.lock().set_instruction(instruction.clone());
        Some(instruction)
    }

    /// Append a question about issue `index` to the advisor transcript
    pub async fn ask_advisor(&self, index: usize) -> Result<Option<ChatMessage>> {
        let Some(result) = self.store.current_result().await else {
            return Ok(None);
        };
        let Some(issue) = result.issue(index) else {
            return Ok(None);
        };

        let message = ChatMessage::user(overlay::advisor_question(issue));
        self.ledger
            .append_history(&self.config.context_label, message.clone())
            .await?;
        Ok(Some(message))
    }

    // ========================================================================
    // Remediation
    // ========================================================================

    pub fn set_remediation_instruction(&self, instruction: impl Into<String>) {
        self.remediation.lock().set_instruction(instruction);
    }

    /// Submit the current instruction against the current captured frame
    pub async fn submit_remediation(&self) -> RemediationOutcome {
        let frame = self.store.current_frame().await;
        let ticket = match self.remediation.lock().begin_submit(frame) {
            Ok(ticket) => ticket,
            Err(rejection) => {
                tracing::debug!(%rejection, "Remediation rejected");
                return RemediationOutcome::Rejected(rejection);
            }
        };

        tracing::info!(instruction = %ticket.instruction, "Remediation submitted");
        let edited = self
            .inference
            .edit_image(&ticket.frame, &ticket.instruction)
            .await;

        if self.is_closed() {
            return RemediationOutcome::Superseded;
        }

        let outcome = self.remediation.lock().complete(&ticket, edited);

        if outcome == RemediationOutcome::Rendered {
            if let Err(e) = self
                .ledger
                .append_history(
                    &self.config.context_label,
                    ChatMessage::hidden_note(remediation_note(&ticket.instruction)),
                )
                .await
            {
                tracing::warn!(error = %e, "Failed to record remediation note");
            }
        }

        tracing::info!(?outcome, "Remediation finished");
        self.hub
            .broadcast(HubMessage::Remediation(RemediationMessage {
                outcome,
                instruction: Some(ticket.instruction),
            }))
            .await;
        outcome
    }

    pub fn remediation_phase(&self) -> RemediationPhase {
        self.remediation.lock().phase()
    }

    pub fn remediation_image(&self) -> Option<Arc<RemediationResult>> {
        self.remediation.lock().result()
    }

    pub fn remediation_instruction(&self) -> String {
        self.remediation.lock().instruction().to_string()
    }

    pub fn hold_compare(&self) {
        self.remediation.lock().hold_compare();
    }

    pub fn release_compare(&self) {
        self.remediation.lock().release_compare();
    }

    pub fn displayed_image(&self) -> DisplayedImage {
        self.remediation.lock().displayed()
    }

    pub fn flush_remediation(&self) {
        self.remediation.lock().flush();
    }

    // ========================================================================
    // View / teardown
    // ========================================================================

    /// Drawable state for `viewport`
    pub async fn view(&self, viewport: Viewport) -> AuditorView {
        let sensor = self.capture.status().await;
        let dimensions = self.capture.dimensions().await;
        let snapshot = self.store.snapshot().await;
        let requests = self.scheduler.state();

        let (regions, focused) = match &snapshot.result {
            Some(result) => {
                let overlay = self.overlay.lock();
                (
                    overlay.render(result, viewport),
                    overlay.focused_detail(result),
                )
            }
            None => (Vec::new(), None),
        };

        let has_frame = snapshot.frame.is_some();
        let remediation = self.remediation.lock();

        AuditorView {
            sensor,
            dimensions,
            live: self.live.is_armed(),
            scanning: requests.manual_in_flight || requests.silent_in_flight,
            loading: requests.manual_in_flight,
            processing: requests.silent_in_flight,
            compliance_score: snapshot.result.as_ref().map(|r| r.compliance_score),
            regions,
            focused,
            has_frame,
            remediation_phase: remediation.phase(),
            remediation_instruction: remediation.instruction().to_string(),
            can_submit_remediation: remediation.can_submit(has_frame),
            displayed_image: remediation.displayed(),
        }
    }

    /// Tear the session down
    ///
    /// Scans still in flight resolve without writing state or touching the
    /// ledger.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.disarm_live().await;
        self.store.close().await;
        self.capture.stop().await;
        tracing::info!("Auditor session closed");
    }
}
