//! OverlayRenderer - Issue Highlight Layout
//!
//! ## Responsibilities
//!
//! - Project normalized (0-1000) boxes into viewport pixels
//! - Status coloring and bracket/fill geometry
//! - Single-issue focus and its detail panel
//! - Prefill texts for the remediation and advisor actions
//!
//! Layout only; drawing is left to whatever front end consumes the regions.

use crate::models::{AuditIssue, AuditResult, BoundingBox, ComplianceStatus, NORMALIZED_EXTENT};
use serde::{Deserialize, Serialize};

/// Bracket arm length as a fraction of the shorter box side
const BRACKET_RATIO: f64 = 0.2;

const FILL_OPACITY_FOCUSED: f64 = 0.2;
const FILL_OPACITY_IDLE: f64 = 0.08;

/// Target drawing surface, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Viewport matching the normalized space one-to-one
    pub fn normalized() -> Self {
        Self::new(NORMALIZED_EXTENT, NORMALIZED_EXTENT)
    }
}

/// Pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    /// Linear projection of a normalized box
    pub fn project(bbox: &BoundingBox, viewport: Viewport) -> Self {
        let b = bbox.normalized();
        let sx = viewport.width / NORMALIZED_EXTENT;
        let sy = viewport.height / NORMALIZED_EXTENT;
        Self {
            x: b.x_min * sx,
            y: b.y_min * sy,
            width: b.width() * sx,
            height: b.height() * sy,
        }
    }
}

/// Highlight palette
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightColor {
    Green,
    Amber,
    Red,
}

impl HighlightColor {
    pub fn for_status(status: ComplianceStatus) -> Self {
        match status {
            ComplianceStatus::Compliant => HighlightColor::Green,
            ComplianceStatus::Warning => HighlightColor::Amber,
            ComplianceStatus::NonCompliant => HighlightColor::Red,
        }
    }

    pub fn hex(&self) -> &'static str {
        match self {
            HighlightColor::Green => "#10b981",
            HighlightColor::Amber => "#fbbf24",
            HighlightColor::Red => "#f43f5e",
        }
    }
}

/// One highlighted region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayRegion {
    /// Index into the result's issue list
    pub index: usize,
    pub category: String,
    pub status: ComplianceStatus,
    pub rect: ScreenRect,
    pub color: HighlightColor,
    pub focused: bool,
    pub bracket_len: f64,
    pub fill_opacity: f64,
}

/// Which side of the box the detail panel opens on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelSide {
    Left,
    Right,
}

/// Detail panel content for the focused issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueDetail {
    pub index: usize,
    pub category: String,
    pub status: ComplianceStatus,
    pub description: String,
    pub recommendation: String,
    pub cost_estimate: String,
    pub panel_side: PanelSide,
}

impl IssueDetail {
    fn from_issue(index: usize, issue: &AuditIssue) -> Self {
        let b = issue.bounding_box.normalized();
        let panel_side = if b.x_max > NORMALIZED_EXTENT / 2.0 {
            PanelSide::Left
        } else {
            PanelSide::Right
        };
        Self {
            index,
            category: issue.category.clone(),
            status: issue.compliance_status,
            description: issue.description.clone(),
            recommendation: issue.recommendation.clone(),
            cost_estimate: issue.cost_estimate.clone(),
            panel_side,
        }
    }
}

/// Overlay layout and focus state
#[derive(Debug, Default)]
pub struct OverlayRenderer {
    focused: Option<usize>,
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focused(&self) -> Option<usize> {
        self.focused
    }

    /// Regions for every issue, in result order
    pub fn render(&self, result: &AuditResult, viewport: Viewport) -> Vec<OverlayRegion> {
        result
            .issues
            .iter()
            .enumerate()
            .map(|(index, issue)| {
                let rect = ScreenRect::project(&issue.bounding_box, viewport);
                let focused = self.focused == Some(index);
                OverlayRegion {
                    index,
                    category: issue.category.clone(),
                    status: issue.compliance_status,
                    rect,
                    color: HighlightColor::for_status(issue.compliance_status),
                    focused,
                    bracket_len: rect.width.min(rect.height) * BRACKET_RATIO,
                    fill_opacity: if focused {
                        FILL_OPACITY_FOCUSED
                    } else {
                        FILL_OPACITY_IDLE
                    },
                }
            })
            .collect()
    }

    /// Focus one issue. Out-of-range indices are refused.
    pub fn focus(&mut self, result: &AuditResult, index: usize) -> bool {
        if index >= result.issues.len() {
            return false;
        }
        self.focused = Some(index);
        true
    }

    pub fn blur(&mut self) {
        self.focused = None;
    }

    pub fn focused_detail(&self, result: &AuditResult) -> Option<IssueDetail> {
        let index = self.focused?;
        result
            .issue(index)
            .map(|issue| IssueDetail::from_issue(index, issue))
    }
}

/// Remediation prefill for an issue
pub fn remediation_instruction(issue: &AuditIssue) -> String {
    format!(
        "REDUCE BARRIER: {}. Instruction: {}. Create a realistic, architectural fix that matches the environment.",
        issue.category, issue.recommendation
    )
}

/// Advisor question for an issue
pub fn advisor_question(issue: &AuditIssue) -> String {
    format!(
        "Cite the ADA standards for this {}: {}",
        issue.category, issue.description
    )
}
