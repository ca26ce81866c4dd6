//! AIClient - Inference Service Adapter
//!
//! ## Responsibilities
//!
//! - Send captured frames for ADA/WCAG accessibility analysis
//! - Send frame + instruction for visual remediation (image edit)
//! - Seed and continue advisor chat sessions
//! - Validate model output (drop issues without a usable bounding box)
//!
//! Every failure is swallowed here: analysis degrades to `AuditResult::empty()`
//! and edits/advisor turns to `None`. Callers never see an `Error`.

pub mod types;

use crate::error::{Error, Result};
use crate::models::{
    AuditIssue, AuditResult, BoundingBox, CapturedFrame, ChatMessage, ChatRole, ComplianceStatus,
    RemediationResult,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use std::time::Duration;
use types::{Content, GenerateContentResponse, Part, RawAuditIssue, RawAuditResponse};

/// Shared system instruction for audit and advisor calls
pub const SYSTEM_INSTRUCTION: &str = "You are an accessibility consultant specialized in ADA and WCAG \
compliance. Estimate real-world dimensions from visual cues and explain barriers plainly.";

const AUDIT_PROMPT: &str = "Audit the attached image for ADA and WCAG accessibility. \
For every accessibility feature or barrier found (tactile paving, ramps, doorways, operable parts, \
protruding objects, signage), return its type, status (COMPLIANT, NON_COMPLIANT or WARNING), \
description, recommendation, cost estimate and bounding box [ymin, xmin, ymax, xmax] on a 0-1000 scale. \
Also return an overall compliance score from 0 to 100. Return JSON only.";

const EDIT_PROMPT: &str = "Render a photo-realistic, ADA-compliant fix for the barrier described below. \
Keep the original perspective, materials and lighting.";

/// Advisor chat session
///
/// A plain value: the full turn history travels with every request, so a
/// session is rebuilt from stored history whenever the context changes.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisorSession {
    pub context_label: String,
    pub system_instruction: String,
    pub turns: Vec<ChatMessage>,
}

impl AdvisorSession {
    pub fn new(context_label: &str, prior_turns: &[ChatMessage]) -> Self {
        Self {
            context_label: context_label.to_string(),
            system_instruction: format!(
                "{}\n\nYou are a specialist interactive guide for {}.",
                SYSTEM_INSTRUCTION, context_label
            ),
            turns: prior_turns.to_vec(),
        }
    }
}

/// Remote inference boundary
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Analyze a frame. Returns `AuditResult::empty()` on any failure.
    async fn analyze_image(&self, frame: &CapturedFrame) -> AuditResult;

    /// Edit a frame following `instruction`. Returns `None` on any failure.
    async fn edit_image(&self, frame: &CapturedFrame, instruction: &str)
        -> Option<RemediationResult>;

    /// Build an advisor session seeded with prior turns (hidden turns included)
    fn create_advisor_session(
        &self,
        context_label: &str,
        prior_turns: &[ChatMessage],
    ) -> AdvisorSession {
        AdvisorSession::new(context_label, prior_turns)
    }

    /// Send one user turn. On success both turns are appended to the session
    /// and the reply is returned; on failure the session is left untouched.
    async fn send_advisor_turn(&self, session: &mut AdvisorSession, text: &str) -> Option<String>;
}

/// Gemini client configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub api_key: String,
    pub audit_model: String,
    pub edit_model: String,
    pub advisor_model: String,
    pub timeout: Duration,
    pub thinking_budget: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key: String::new(),
            audit_model: "gemini-3-pro-preview".to_string(),
            edit_model: "gemini-2.5-flash-image".to_string(),
            advisor_model: "gemini-3-pro-preview".to_string(),
            timeout: Duration::from_secs(90),
            thinking_budget: 24000,
        }
    }
}

/// generateContent client
pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    /// Create new client
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Check the service is reachable with the configured credential
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/v1beta/models", self.config.base_url.trim_end_matches('/'));
        match self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "Inference service health check failed");
                false
            }
        }
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    async fn generate(&self, model: &str, body: Value) -> Result<GenerateContentResponse> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        );

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api(format!(
                "generateContent ({}) failed: {} - {}",
                model, status, body
            )));
        }

        Ok(resp.json().await?)
    }

    fn audit_request_body(&self, frame: &CapturedFrame) -> Value {
        json!({
            "systemInstruction": { "parts": [{ "text": SYSTEM_INSTRUCTION }] },
            "contents": [{
                "role": "user",
                "parts": [
                    Part::text(AUDIT_PROMPT),
                    Part::inline(frame.mime_type(), BASE64.encode(&frame.bytes)),
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "thinkingConfig": { "thinkingBudget": self.config.thinking_budget },
                "responseSchema": audit_response_schema(),
            }
        })
    }

    async fn try_analyze(&self, frame: &CapturedFrame) -> Result<AuditResult> {
        let body = self.audit_request_body(frame);
        let resp = self.generate(&self.config.audit_model, body).await?;
        let text = resp
            .text()
            .ok_or_else(|| Error::Inference("Audit response had no text".to_string()))?;
        parse_audit_text(&text)
    }

    async fn try_edit(
        &self,
        frame: &CapturedFrame,
        instruction: &str,
    ) -> Result<Option<RemediationResult>> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    Part::inline(frame.mime_type(), BASE64.encode(&frame.bytes)),
                    Part::text(format!("{}\nModification request: {}", EDIT_PROMPT, instruction)),
                ]
            }]
        });
        let resp = self.generate(&self.config.edit_model, body).await?;
        decode_edited_image(&resp, instruction)
    }

    async fn try_advise(&self, session: &AdvisorSession, text: &str) -> Result<String> {
        let mut contents: Vec<Content> = session.turns.iter().map(turn_content).collect();
        contents.push(turn_content(&ChatMessage::user(text)));

        let body = json!({
            "systemInstruction": { "parts": [{ "text": session.system_instruction }] },
            "contents": contents,
        });
        let resp = self.generate(&self.config.advisor_model, body).await?;
        resp.text()
            .ok_or_else(|| Error::Inference("Advisor response had no text".to_string()))
    }
}

#[async_trait]
impl InferenceClient for GeminiClient {
    async fn analyze_image(&self, frame: &CapturedFrame) -> AuditResult {
        match self.try_analyze(frame).await {
            Ok(result) => {
                tracing::debug!(
                    issues = result.issues.len(),
                    score = result.compliance_score,
                    "Audit analysis completed"
                );
                result
            }
            Err(e) => {
                tracing::error!(error = %e, code = e.code(), "Audit analysis failed");
                AuditResult::empty()
            }
        }
    }

    async fn edit_image(
        &self,
        frame: &CapturedFrame,
        instruction: &str,
    ) -> Option<RemediationResult> {
        match self.try_edit(frame, instruction).await {
            Ok(Some(image)) => Some(image),
            Ok(None) => {
                tracing::warn!("Image edit response contained no image");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, code = e.code(), "Image edit failed");
                None
            }
        }
    }

    async fn send_advisor_turn(&self, session: &mut AdvisorSession, text: &str) -> Option<String> {
        match self.try_advise(session, text).await {
            Ok(reply) => {
                session.turns.push(ChatMessage::user(text));
                session.turns.push(ChatMessage::model(reply.clone()));
                Some(reply)
            }
            Err(e) => {
                tracing::error!(
                    context = %session.context_label,
                    error = %e,
                    "Advisor turn failed"
                );
                None
            }
        }
    }
}

fn turn_content(msg: &ChatMessage) -> Content {
    Content {
        role: Some(
            match msg.role {
                ChatRole::User => "user",
                ChatRole::Model => "model",
            }
            .to_string(),
        ),
        parts: vec![Part::text(msg.text.clone())],
    }
}

fn audit_response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "issues": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "type": { "type": "STRING" },
                        "status": { "type": "STRING", "enum": ["COMPLIANT", "NON_COMPLIANT", "WARNING"] },
                        "description": { "type": "STRING" },
                        "recommendation": { "type": "STRING" },
                        "costEstimate": { "type": "STRING" },
                        "coordinates": { "type": "ARRAY", "items": { "type": "NUMBER" } }
                    },
                    "required": ["type", "status", "description", "recommendation", "costEstimate", "coordinates"]
                }
            },
            "overallComplianceScore": { "type": "NUMBER" }
        },
        "required": ["issues", "overallComplianceScore"]
    })
}

/// Parse the model's JSON text into a validated result
///
/// Tolerates a surrounding markdown code fence. Issues are validated one by
/// one; a bad issue is dropped, a bad document is an error.
pub fn parse_audit_text(text: &str) -> Result<AuditResult> {
    let trimmed = strip_code_fence(text.trim());
    let raw: RawAuditResponse = serde_json::from_str(trimmed)
        .map_err(|e| Error::Parse(format!("Audit JSON: {}", e)))?;
    Ok(validate_audit(raw))
}

/// Validate a raw audit payload
pub fn validate_audit(raw: RawAuditResponse) -> AuditResult {
    let total = raw.issues.len();
    let issues: Vec<AuditIssue> = raw.issues.into_iter().filter_map(parse_issue).collect();

    if issues.len() < total {
        tracing::debug!(
            dropped = total - issues.len(),
            kept = issues.len(),
            "Dropped audit issues without a valid bounding box"
        );
    }

    let compliance_score = raw
        .compliance_score
        .filter(|s| s.is_finite())
        .map(|s| s.round().clamp(0.0, 100.0) as u8)
        .unwrap_or(0);

    AuditResult {
        issues,
        compliance_score,
    }
}

fn parse_issue(value: Value) -> Option<AuditIssue> {
    let raw: RawAuditIssue = serde_json::from_value(value).ok()?;
    let bounding_box = raw.bounding_box.as_ref().and_then(box_from_value)?;

    Some(AuditIssue {
        category: raw.category,
        compliance_status: ComplianceStatus::from_wire(&raw.compliance_status),
        description: raw.description,
        recommendation: raw.recommendation,
        cost_estimate: raw.cost_estimate,
        bounding_box,
    })
}

fn box_from_value(value: &Value) -> Option<BoundingBox> {
    let items = value.as_array()?;
    let coords: Option<Vec<f64>> = items.iter().map(Value::as_f64).collect();
    BoundingBox::from_coords(&coords?)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Pull the first inline image out of an edit response
pub fn decode_edited_image(
    resp: &GenerateContentResponse,
    instruction: &str,
) -> Result<Option<RemediationResult>> {
    let Some(inline) = resp.first_inline_data() else {
        return Ok(None);
    };

    let bytes = BASE64.decode(inline.data.as_bytes())?;
    if bytes.is_empty() {
        return Ok(None);
    }

    Ok(Some(RemediationResult {
        bytes,
        mime_type: inline.mime_type.clone(),
        instruction: instruction.to_string(),
    }))
}
