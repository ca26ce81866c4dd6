//! Shared models and types for the auditor
//!
//! This module contains types shared across multiple modules
//! to avoid circular dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound of the normalized coordinate space (both axes)
pub const NORMALIZED_EXTENT: f64 = 1000.0;

/// Compliance classification returned by the audit model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    NonCompliant,
    Warning,
}

impl ComplianceStatus {
    /// Parse the wire string; anything unrecognized is treated as a barrier
    pub fn from_wire(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "COMPLIANT" => ComplianceStatus::Compliant,
            "WARNING" => ComplianceStatus::Warning,
            _ => ComplianceStatus::NonCompliant,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "COMPLIANT",
            ComplianceStatus::NonCompliant => "NON_COMPLIANT",
            ComplianceStatus::Warning => "WARNING",
        }
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounding box in the fixed 0-1000 normalized space
///
/// Field order follows the model output `[yMin, xMin, yMax, xMax]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub y_min: f64,
    pub x_min: f64,
    pub y_max: f64,
    pub x_max: f64,
}

impl BoundingBox {
    /// Build from a raw coordinate list. Requires exactly 4 finite numbers.
    pub fn from_coords(coords: &[f64]) -> Option<Self> {
        match coords {
            [y_min, x_min, y_max, x_max] if coords.iter().all(|c| c.is_finite()) => Some(Self {
                y_min: *y_min,
                x_min: *x_min,
                y_max: *y_max,
                x_max: *x_max,
            }),
            _ => None,
        }
    }

    /// Same box with inverted edges swapped and every edge clamped to 0-1000
    pub fn normalized(&self) -> Self {
        let clamp = |v: f64| v.clamp(0.0, NORMALIZED_EXTENT);
        Self {
            y_min: clamp(self.y_min.min(self.y_max)),
            x_min: clamp(self.x_min.min(self.x_max)),
            y_max: clamp(self.y_min.max(self.y_max)),
            x_max: clamp(self.x_min.max(self.x_max)),
        }
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }
}

/// One detected accessibility feature or barrier
///
/// Issues without a valid box never get this far: the inference boundary
/// drops them, so `bounding_box` is not optional here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditIssue {
    pub category: String,
    pub compliance_status: ComplianceStatus,
    pub description: String,
    pub recommendation: String,
    pub cost_estimate: String,
    pub bounding_box: BoundingBox,
}

/// One completed scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResult {
    /// Model response order, stable for display indexing
    pub issues: Vec<AuditIssue>,
    /// Overall score, 0-100
    pub compliance_score: u8,
}

impl AuditResult {
    /// Failure sentinel: no issues, score 0
    pub fn empty() -> Self {
        Self {
            issues: Vec::new(),
            compliance_score: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issue(&self, index: usize) -> Option<&AuditIssue> {
        self.issues.get(index)
    }
}

/// A single encoded still image taken from the camera
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    /// JPEG bytes
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

impl CapturedFrame {
    pub fn new(bytes: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            bytes,
            width,
            height,
            captured_at: Utc::now(),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        "image/jpeg"
    }
}

/// Edited image produced by a remediation request
#[derive(Debug, Clone, PartialEq)]
pub struct RemediationResult {
    /// Encoded image bytes (any format)
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Instruction the image was rendered from
    pub instruction: String,
}

/// Which request source issued a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanKind {
    /// User-triggered, one-shot
    Manual,
    /// Live-mode background scan
    Silent,
}

impl ScanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanKind::Manual => "manual",
            ScanKind::Silent => "silent",
        }
    }
}

/// Chat speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

/// One transcript turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
    /// Unix epoch milliseconds
    pub timestamp: i64,
    /// Hidden turns are kept for model context but not shown in the chat stream
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_hidden: bool,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
            timestamp: Utc::now().timestamp_millis(),
            is_hidden: false,
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            ..Self::user(text)
        }
    }

    /// System-style note attributed to the user but hidden from display
    pub fn hidden_note(text: impl Into<String>) -> Self {
        Self {
            is_hidden: true,
            ..Self::user(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_wire() {
        assert_eq!(ComplianceStatus::from_wire("COMPLIANT"), ComplianceStatus::Compliant);
        assert_eq!(ComplianceStatus::from_wire("warning"), ComplianceStatus::Warning);
        assert_eq!(ComplianceStatus::from_wire("Non-Compliant"), ComplianceStatus::NonCompliant);
        assert_eq!(ComplianceStatus::from_wire("UNKNOWN"), ComplianceStatus::NonCompliant);
    }

    #[test]
    fn test_bounding_box_requires_four_finite_coords() {
        assert!(BoundingBox::from_coords(&[100.0, 100.0, 300.0, 300.0]).is_some());
        assert!(BoundingBox::from_coords(&[100.0, 100.0, 300.0]).is_none());
        assert!(BoundingBox::from_coords(&[1.0, 2.0, 3.0, 4.0, 5.0]).is_none());
        assert!(BoundingBox::from_coords(&[1.0, f64::NAN, 3.0, 4.0]).is_none());
    }

    #[test]
    fn test_bounding_box_normalized() {
        let bbox = BoundingBox::from_coords(&[400.0, 1200.0, 100.0, -5.0]).unwrap();
        let n = bbox.normalized();
        assert_eq!(n.y_min, 100.0);
        assert_eq!(n.y_max, 400.0);
        assert_eq!(n.x_min, 0.0);
        assert_eq!(n.x_max, 1000.0);
    }

    #[test]
    fn test_hidden_note_serialization() {
        let msg = ChatMessage::hidden_note("[SYSTEM] note");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["isHidden"], true);

        let visible = serde_json::to_value(ChatMessage::model("hi")).unwrap();
        assert!(visible.get("isHidden").is_none());
    }
}
