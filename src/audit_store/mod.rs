//! AuditStateStore - Current Scan Result
//!
//! Holds the frame and result the overlay is drawn against. Both are
//! replaced together so the overlay never pairs a result with a frame it
//! was not computed from.

use crate::models::{AuditResult, CapturedFrame};
use std::sync::Arc;
use tokio::sync::RwLock;

/// How out-of-order completions are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyPolicy {
    /// Whichever scan completes last wins
    #[default]
    LastCompleted,
    /// Ignore completions older than the one already applied
    DiscardStale,
}

/// Snapshot of the store
#[derive(Debug, Clone, Default)]
pub struct AuditSnapshot {
    pub frame: Option<Arc<CapturedFrame>>,
    pub result: Option<Arc<AuditResult>>,
    pub sequence: u64,
}

#[derive(Default)]
struct StoreInner {
    snapshot: AuditSnapshot,
    closed: bool,
}

/// Current audit result holder
pub struct AuditStateStore {
    inner: RwLock<StoreInner>,
    policy: ApplyPolicy,
}

impl AuditStateStore {
    pub fn new(policy: ApplyPolicy) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            policy,
        }
    }

    pub fn policy(&self) -> ApplyPolicy {
        self.policy
    }

    /// Apply a completed scan
    ///
    /// Returns false when the store is closed or the completion is stale
    /// under `DiscardStale`.
    pub async fn apply(&self, sequence: u64, frame: CapturedFrame, result: AuditResult) -> bool {
        let mut inner = self.inner.write().await;

        if inner.closed {
            tracing::debug!(sequence, "Store closed, dropping completion");
            return false;
        }

        if self.policy == ApplyPolicy::DiscardStale && sequence < inner.snapshot.sequence {
            tracing::debug!(
                sequence,
                applied = inner.snapshot.sequence,
                "Stale completion discarded"
            );
            return false;
        }

        inner.snapshot = AuditSnapshot {
            frame: Some(Arc::new(frame)),
            result: Some(Arc::new(result)),
            sequence,
        };
        true
    }

    pub async fn current_result(&self) -> Option<Arc<AuditResult>> {
        self.inner.read().await.snapshot.result.clone()
    }

    pub async fn current_frame(&self) -> Option<Arc<CapturedFrame>> {
        self.inner.read().await.snapshot.frame.clone()
    }

    pub async fn snapshot(&self) -> AuditSnapshot {
        self.inner.read().await.snapshot.clone()
    }

    /// Seal the store; later completions are ignored
    pub async fn close(&self) {
        self.inner.write().await.closed = true;
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.read().await.closed
    }
}

impl Default for AuditStateStore {
    fn default() -> Self {
        Self::new(ApplyPolicy::default())
    }
}
