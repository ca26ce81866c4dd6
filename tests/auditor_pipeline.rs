//! Auditor pipeline tests against a fake camera and a scripted inference client

use async_trait::async_trait;
use empathy_auditor::ai_client::{parse_audit_text, AdvisorSession, InferenceClient};
use empathy_auditor::audit_store::ApplyPolicy;
use empathy_auditor::auditor::{AuditorConfig, AuditorSession, ScanOutcome};
use empathy_auditor::error::{Error, Result};
use empathy_auditor::models::{
    AuditResult, CapturedFrame, ChatRole, RemediationResult, ScanKind,
};
use empathy_auditor::overlay::Viewport;
use empathy_auditor::realtime_hub::RealtimeHub;
use empathy_auditor::remediation::{
    DisplayedImage, RemediationOutcome, RemediationPhase, RemediationRejection,
};
use empathy_auditor::scan_scheduler::ScanRejection;
use empathy_auditor::snapshot_service::{
    CameraDevice, FrameCaptureSource, FrameDimensions, SensorStatus,
};
use empathy_auditor::stats_store::{SessionLedger, StatsStore, AUDITOR_CONTEXT};
use parking_lot::Mutex;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const RAMP_RESPONSE: &str = r#"{
    "issues": [{
        "category": "RAMP",
        "complianceStatus": "NON_COMPLIANT",
        "description": "Ramp slope exceeds 1:12",
        "recommendation": "Regrade the ramp to 1:12",
        "costEstimate": "$4,000",
        "boundingBox": [100, 100, 300, 300]
    }],
    "complianceScore": 42
}"#;

fn png_frame() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(16, 12, image::Rgb([90, 90, 90]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

struct FakeCamera {
    deny: bool,
    frame: Vec<u8>,
}

#[async_trait]
impl CameraDevice for FakeCamera {
    async fn open(&self) -> Result<FrameDimensions> {
        if self.deny {
            return Err(Error::PermissionDenied("camera refused".to_string()));
        }
        Ok(FrameDimensions {
            width: 16,
            height: 12,
        })
    }

    async fn grab_frame(&self) -> Result<Vec<u8>> {
        Ok(self.frame.clone())
    }

    async fn close(&self) {}
}

/// Scripted inference client
///
/// With a gate, the first `gated_calls` analyze calls wait for one permit each.
struct ScriptedInference {
    analyze_calls: AtomicUsize,
    edit_calls: AtomicUsize,
    result: Mutex<AuditResult>,
    edited: Mutex<Option<Vec<u8>>>,
    edited_from: Mutex<Vec<Vec<u8>>>,
    gate: Option<Semaphore>,
    gated_calls: usize,
}

impl ScriptedInference {
    fn new(result: AuditResult) -> Arc<Self> {
        Arc::new(Self::build(result, None))
    }

    fn gated(result: AuditResult) -> Arc<Self> {
        Arc::new(Self::build(result, Some(Semaphore::new(0))))
    }

    /// Only the first analyze call waits on the gate
    fn gated_first(result: AuditResult) -> Arc<Self> {
        let mut inference = Self::build(result, Some(Semaphore::new(0)));
        inference.gated_calls = 1;
        Arc::new(inference)
    }

    fn build(result: AuditResult, gate: Option<Semaphore>) -> Self {
        Self {
            analyze_calls: AtomicUsize::new(0),
            edit_calls: AtomicUsize::new(0),
            result: Mutex::new(result),
            edited: Mutex::new(None),
            edited_from: Mutex::new(Vec::new()),
            gate,
            gated_calls: usize::MAX,
        }
    }

    fn analyze_calls(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }

    fn edit_calls(&self) -> usize {
        self.edit_calls.load(Ordering::SeqCst)
    }

    fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    async fn analyze_image(&self, _frame: &CapturedFrame) -> AuditResult {
        let call = self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = self.gate.as_ref().filter(|_| call < self.gated_calls) {
            gate.acquire().await.unwrap().forget();
        }
        self.result.lock().clone()
    }

    async fn edit_image(
        &self,
        frame: &CapturedFrame,
        instruction: &str,
    ) -> Option<RemediationResult> {
        self.edit_calls.fetch_add(1, Ordering::SeqCst);
        self.edited_from.lock().push(frame.bytes.clone());
        self.edited.lock().clone().map(|bytes| RemediationResult {
            bytes,
            mime_type: "image/png".to_string(),
            instruction: instruction.to_string(),
        })
    }

    async fn send_advisor_turn(
        &self,
        _session: &mut AdvisorSession,
        _text: &str,
    ) -> Option<String> {
        None
    }
}

struct Harness {
    session: Arc<AuditorSession>,
    inference: Arc<ScriptedInference>,
    ledger: Arc<StatsStore>,
    hub: Arc<RealtimeHub>,
}

impl Harness {
    async fn new(inference: Arc<ScriptedInference>) -> Self {
        Self::with_camera(inference, false).await
    }

    async fn with_camera(inference: Arc<ScriptedInference>, deny: bool) -> Self {
        Self::with_config(inference, deny, AuditorConfig::default()).await
    }

    async fn with_config(
        inference: Arc<ScriptedInference>,
        deny: bool,
        config: AuditorConfig,
    ) -> Self {
        let camera = Arc::new(FakeCamera {
            deny,
            frame: png_frame(),
        });
        let capture = Arc::new(FrameCaptureSource::new(camera, 80));
        let ledger = Arc::new(StatsStore::in_memory());
        let hub = Arc::new(RealtimeHub::new());
        let session = AuditorSession::new(
            capture,
            inference.clone(),
            ledger.clone(),
            hub.clone(),
            config,
        );
        Self {
            session,
            inference,
            ledger,
            hub,
        }
    }

    async fn started(inference: Arc<ScriptedInference>) -> Self {
        let h = Self::new(inference).await;
        h.session.start_camera().await.unwrap();
        h
    }

    async fn hidden_notes(&self) -> Vec<String> {
        self.ledger
            .history(AUDITOR_CONTEXT)
            .await
            .into_iter()
            .filter(|m| m.is_hidden)
            .map(|m| m.text)
            .collect()
    }
}

async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..100_000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

fn ramp_result() -> AuditResult {
    parse_audit_text(RAMP_RESPONSE).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_silent_requests_within_cooldown_dispatch_once() {
    let h = Harness::started(ScriptedInference::new(ramp_result())).await;

    assert!(h.session.scan(ScanKind::Silent).await.unwrap().is_completed());

    tokio::time::advance(Duration::from_secs(5)).await;
    match h.session.scan(ScanKind::Silent).await.unwrap() {
        ScanOutcome::Rejected {
            rejection: ScanRejection::Cooldown { .. },
        } => {}
        other => panic!("expected cooldown rejection, got {:?}", other),
    }
    assert_eq!(h.inference.analyze_calls(), 1);

    tokio::time::advance(Duration::from_secs(7)).await;
    assert!(h.session.scan(ScanKind::Silent).await.unwrap().is_completed());
    assert_eq!(h.inference.analyze_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_silent_in_flight_blocks_silent_not_manual() {
    let h = Harness::started(ScriptedInference::gated(ramp_result())).await;

    let session = h.session.clone();
    let silent = tokio::spawn(async move { session.scan(ScanKind::Silent).await });
    let inference = h.inference.clone();
    wait_until(|| inference.analyze_calls() == 1).await;

    assert_eq!(
        h.session.scan(ScanKind::Silent).await.unwrap(),
        ScanOutcome::Rejected {
            rejection: ScanRejection::SilentInFlight
        }
    );

    let session = h.session.clone();
    let manual = tokio::spawn(async move { session.scan(ScanKind::Manual).await });
    wait_until(|| inference.analyze_calls() == 2).await;

    let view = h.session.view(Viewport::normalized()).await;
    assert!(view.loading);
    assert!(view.processing);
    assert!(view.scanning);

    h.inference.release(2);
    assert!(silent.await.unwrap().unwrap().is_completed());
    assert!(manual.await.unwrap().unwrap().is_completed());
    assert_eq!(h.inference.analyze_calls(), 2);

    let view = h.session.view(Viewport::normalized()).await;
    assert!(!view.scanning);
}

#[tokio::test(start_paused = true)]
async fn test_live_mode_off_stops_dispatches() {
    let h = Harness::started(ScriptedInference::new(ramp_result())).await;

    h.session.set_live_mode(true).await.unwrap();
    assert!(h.session.is_live());

    let inference = h.inference.clone();
    wait_until(|| inference.analyze_calls() == 1).await;

    h.session.set_live_mode(false).await.unwrap();
    assert!(!h.session.is_live());

    tokio::time::sleep(Duration::from_secs(60)).await;
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.inference.analyze_calls(), 1);
}

#[tokio::test]
async fn test_live_mode_requires_active_camera() {
    let h = Harness::new(ScriptedInference::new(ramp_result())).await;
    assert!(h.session.set_live_mode(true).await.is_err());
    assert!(!h.session.is_live());
}

#[tokio::test(start_paused = true)]
async fn test_stop_camera_disarms_live_mode() {
    let h = Harness::started(ScriptedInference::new(ramp_result())).await;
    h.session.set_live_mode(true).await.unwrap();
    let inference = h.inference.clone();
    wait_until(|| inference.analyze_calls() == 1).await;

    h.session.stop_camera().await;
    assert!(!h.session.is_live());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.inference.analyze_calls(), 1);
}

#[tokio::test]
async fn test_empty_instruction_makes_no_edit_call() {
    let h = Harness::started(ScriptedInference::new(ramp_result())).await;
    h.session.scan(ScanKind::Manual).await.unwrap();

    assert_eq!(
        h.session.submit_remediation().await,
        RemediationOutcome::Rejected(RemediationRejection::EmptyInstruction)
    );
    h.session.set_remediation_instruction("  ");
    assert_eq!(
        h.session.submit_remediation().await,
        RemediationOutcome::Rejected(RemediationRejection::EmptyInstruction)
    );
    assert_eq!(h.inference.edit_calls(), 0);
}

#[tokio::test]
async fn test_remediation_without_frame_is_rejected() {
    let h = Harness::started(ScriptedInference::new(ramp_result())).await;
    h.session.set_remediation_instruction("add ramp");
    assert_eq!(
        h.session.submit_remediation().await,
        RemediationOutcome::Rejected(RemediationRejection::NoFrame)
    );
    assert_eq!(h.inference.edit_calls(), 0);
}

#[tokio::test]
async fn test_remediation_render_then_flush() {
    let h = Harness::started(ScriptedInference::new(ramp_result())).await;
    *h.inference.edited.lock() = Some(vec![0xE1, 0xE1]);

    h.session.scan(ScanKind::Manual).await.unwrap();
    let f1 = h.session.current_frame().await.unwrap();

    h.session.set_remediation_instruction("add ramp");
    assert_eq!(
        h.session.submit_remediation().await,
        RemediationOutcome::Rendered
    );
    assert_eq!(h.session.remediation_phase(), RemediationPhase::Rendered);
    assert_eq!(
        h.session.remediation_image().unwrap().bytes,
        vec![0xE1, 0xE1]
    );
    assert_eq!(h.inference.edited_from.lock()[0], f1.bytes);

    let notes = h.hidden_notes().await;
    assert!(notes
        .iter()
        .any(|n| n == "[SYSTEM] Visual fix rendered: \"add ramp\""));

    h.session.hold_compare();
    assert_eq!(h.session.displayed_image(), DisplayedImage::Original);
    h.session.release_compare();
    assert_eq!(h.session.displayed_image(), DisplayedImage::Remediated);

    h.session.flush_remediation();
    assert_eq!(h.session.remediation_phase(), RemediationPhase::Idle);
    assert!(h.session.remediation_instruction().is_empty());
    assert!(h.session.remediation_image().is_none());
}

#[tokio::test]
async fn test_remediation_failure_returns_to_idle() {
    let h = Harness::started(ScriptedInference::new(ramp_result())).await;
    h.session.scan(ScanKind::Manual).await.unwrap();
    let notes_before = h.hidden_notes().await.len();

    h.session.set_remediation_instruction("add ramp");
    assert_eq!(h.session.submit_remediation().await, RemediationOutcome::Failed);
    assert_eq!(h.session.remediation_phase(), RemediationPhase::Idle);
    assert_eq!(h.hidden_notes().await.len(), notes_before);
}

#[tokio::test]
async fn test_ramp_scan_focus_and_ask_advisor() {
    let h = Harness::started(ScriptedInference::new(ramp_result())).await;
    h.session.scan(ScanKind::Manual).await.unwrap();

    let result = h.session.current_result().await.unwrap();
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.compliance_score, 42);

    let detail = h.session.focus_issue(0).await.unwrap();
    assert_eq!(detail.description, "Ramp slope exceeds 1:12");
    assert_eq!(detail.recommendation, "Regrade the ramp to 1:12");
    assert_eq!(detail.cost_estimate, "$4,000");
    assert!(h.session.focus_issue(1).await.is_none());

    let before = h.ledger.history(AUDITOR_CONTEXT).await.len();
    let asked = h.session.ask_advisor(0).await.unwrap().unwrap();
    let history = h.ledger.history(AUDITOR_CONTEXT).await;
    assert_eq!(history.len(), before + 1);
    let last = history.last().unwrap();
    assert_eq!(last, &asked);
    assert_eq!(last.role, ChatRole::User);
    assert!(!last.is_hidden);
    assert!(last.text.contains("RAMP"));

    let prefill = h.session.prefill_remediation(0).await.unwrap();
    assert!(prefill.contains("RAMP"));
    assert_eq!(h.session.remediation_instruction(), prefill);
}

#[tokio::test]
async fn test_short_box_issue_is_excluded_score_kept() {
    let response = r#"{
        "issues": [
            {"category": "DOORWAY", "complianceStatus": "COMPLIANT",
             "description": "d", "recommendation": "r", "costEstimate": "$0",
             "boundingBox": [10, 20, 30]},
            {"category": "SIGNAGE", "complianceStatus": "WARNING",
             "description": "d", "recommendation": "r", "costEstimate": "$50",
             "boundingBox": [500, 500, 700, 900]}
        ],
        "complianceScore": 77
    }"#;
    let h = Harness::started(ScriptedInference::new(parse_audit_text(response).unwrap())).await;
    h.session.scan(ScanKind::Manual).await.unwrap();

    let result = h.session.current_result().await.unwrap();
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].category, "SIGNAGE");
    assert_eq!(result.compliance_score, 77);

    let view = h.session.view(Viewport::new(1000.0, 500.0)).await;
    assert_eq!(view.regions.len(), 1);
    assert_eq!(view.compliance_score, Some(77));
}

#[tokio::test(start_paused = true)]
async fn test_only_manual_scans_are_counted() {
    let h = Harness::started(ScriptedInference::new(ramp_result())).await;

    h.session.scan(ScanKind::Manual).await.unwrap();
    assert_eq!(h.ledger.stats().await.audit_reports_generated, 1);
    assert_eq!(
        h.hidden_notes().await,
        vec!["[SYSTEM] Manual analysis complete. Accessibility score: 42%.".to_string()]
    );

    h.session.scan(ScanKind::Silent).await.unwrap();
    assert_eq!(h.ledger.stats().await.audit_reports_generated, 1);
    assert_eq!(h.hidden_notes().await.len(), 1);
}

#[tokio::test]
async fn test_empty_sentinel_still_applied() {
    let h = Harness::started(ScriptedInference::new(AuditResult::empty())).await;
    h.session.scan(ScanKind::Manual).await.unwrap();

    let result = h.session.current_result().await.unwrap();
    assert!(result.is_empty());
    assert_eq!(result.compliance_score, 0);
    assert_eq!(h.ledger.stats().await.audit_reports_generated, 1);
}

#[tokio::test]
async fn test_new_result_clears_focus() {
    let h = Harness::started(ScriptedInference::new(ramp_result())).await;
    h.session.scan(ScanKind::Manual).await.unwrap();
    h.session.focus_issue(0).await.unwrap();

    h.session.scan(ScanKind::Manual).await.unwrap();
    let view = h.session.view(Viewport::normalized()).await;
    assert!(view.focused.is_none());
    assert!(view.regions.iter().all(|r| !r.focused));
}

#[tokio::test]
async fn test_denied_camera_alerts_and_blocks_scans() {
    let h = Harness::with_camera(ScriptedInference::new(ramp_result()), true).await;
    let (_id, mut events) = h.hub.register("test").await;

    let err = h.session.start_camera().await.unwrap_err();
    assert!(err.is_permission_denied());

    let mut saw_alert = false;
    while let Ok(event) = events.try_recv() {
        let json: serde_json::Value = serde_json::from_str(&event).unwrap();
        if json["type"] == "alert" {
            saw_alert = true;
        }
    }
    assert!(saw_alert);

    let view = h.session.view(Viewport::normalized()).await;
    assert_eq!(view.sensor, SensorStatus::Denied);

    assert_eq!(
        h.session.scan(ScanKind::Manual).await.unwrap(),
        ScanOutcome::Rejected {
            rejection: ScanRejection::SensorOffline
        }
    );
    assert_eq!(h.inference.analyze_calls(), 0);
}

#[tokio::test]
async fn test_shutdown_drops_late_completion() {
    let h = Harness::started(ScriptedInference::gated(ramp_result())).await;

    let session = h.session.clone();
    let manual = tokio::spawn(async move { session.scan(ScanKind::Manual).await });
    let inference = h.inference.clone();
    wait_until(|| inference.analyze_calls() == 1).await;

    h.session.shutdown().await;
    h.inference.release(1);

    match manual.await.unwrap().unwrap() {
        ScanOutcome::Completed { applied, .. } => assert!(!applied),
        other => panic!("expected completion, got {:?}", other),
    }
    assert!(h.session.current_result().await.is_none());
    assert_eq!(h.ledger.stats().await.audit_reports_generated, 0);
    assert!(h.hidden_notes().await.is_empty());

    assert_eq!(
        h.session.scan(ScanKind::Manual).await.unwrap(),
        ScanOutcome::Rejected {
            rejection: ScanRejection::SessionClosed
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_stale_completion_not_applied_or_counted() {
    let config = AuditorConfig {
        apply_policy: ApplyPolicy::DiscardStale,
        ..AuditorConfig::default()
    };
    let h = Harness::with_config(ScriptedInference::gated_first(ramp_result()), false, config).await;
    h.session.start_camera().await.unwrap();

    let session = h.session.clone();
    let silent = tokio::spawn(async move { session.scan(ScanKind::Silent).await });
    let inference = h.inference.clone();
    wait_until(|| inference.analyze_calls() == 1).await;

    match h.session.scan(ScanKind::Manual).await.unwrap() {
        ScanOutcome::Completed { applied, .. } => assert!(applied),
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(h.ledger.stats().await.audit_reports_generated, 1);

    h.inference.release(1);
    match silent.await.unwrap().unwrap() {
        ScanOutcome::Completed { applied, .. } => assert!(!applied),
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(h.ledger.stats().await.audit_reports_generated, 1);
    assert_eq!(h.hidden_notes().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_announces_live_mode_off() {
    let h = Harness::started(ScriptedInference::new(ramp_result())).await;
    let (_id, mut events) = h.hub.register("test").await;

    h.session.set_live_mode(true).await.unwrap();
    h.session.shutdown().await;
    assert!(!h.session.is_live());

    let mut live_flags = Vec::new();
    while let Ok(event) = events.try_recv() {
        let json: serde_json::Value = serde_json::from_str(&event).unwrap();
        if json["type"] == "live_mode" {
            live_flags.push(json["data"]["enabled"].as_bool().unwrap());
        }
    }
    assert_eq!(live_flags.last(), Some(&false));
}
