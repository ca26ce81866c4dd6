//! Empathy Auditor Library
//!
//! Camera-driven accessibility audit pipeline: capture a frame, have a
//! vision model mark accessibility features and barriers, overlay them,
//! and render visual fixes on request.
//!
//! ## Architecture (10 Components)
//!
//! 1. SnapshotService - Camera ownership and JPEG stills
//! 2. AIClient - Gemini analyze / edit / advisor adapter
//! 3. ScanScheduler - Manual vs silent scan admission, live timer
//! 4. AuditStateStore - Latest frame + result, replaced atomically
//! 5. Overlay - Box projection, coloring, focus and detail panel
//! 6. Remediation - Visual fix state machine
//! 7. StatsStore - Persistent counters and transcripts
//! 8. Advisor - Context-scoped guide chat
//! 9. RealtimeHub - Event distribution to subscribers
//! 10. Auditor - Session wiring the above together
//!
//! ## Design Principles
//!
//! - Inference failures stop at the client boundary as empty/absent results
//! - One in-flight scan per kind; rejected requests are dropped, not queued
//! - Nothing writes into a torn-down session

pub mod advisor;
pub mod ai_client;
pub mod audit_store;
pub mod auditor;
pub mod error;
pub mod models;
pub mod overlay;
pub mod realtime_hub;
pub mod remediation;
pub mod scan_scheduler;
pub mod snapshot_service;
pub mod state;
pub mod stats_store;

pub use error::{Error, Result};
pub use state::AppState;
