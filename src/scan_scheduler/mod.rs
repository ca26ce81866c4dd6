//! ScanScheduler - Scan Admission Control
//!
//! ## Responsibilities
//!
//! - Decide whether a manual or silent scan may start now
//! - At most one scan in flight per kind
//! - Silent scans: cooldown between starts, never while a manual scan is loading
//! - Hand out monotonically increasing sequence numbers
//!
//! Admission returns a `ScanLease`; dropping it releases the in-flight slot.

pub mod live;

pub use live::LiveTimer;

use crate::models::ScanKind;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Minimum interval between silent scan starts
pub const DEFAULT_SILENT_COOLDOWN: Duration = Duration::from_secs(12);

/// Live-mode tick period
pub const DEFAULT_LIVE_PERIOD: Duration = Duration::from_secs(15);

/// Scheduling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerPolicy {
    pub silent_cooldown: Duration,
    pub live_period: Duration,
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        Self {
            silent_cooldown: DEFAULT_SILENT_COOLDOWN,
            live_period: DEFAULT_LIVE_PERIOD,
        }
    }
}

/// Why a scan request was not dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ScanRejection {
    /// A manual scan is already loading
    ManualInFlight,
    /// A silent scan is already processing
    SilentInFlight,
    /// Too soon after the last silent scan start
    Cooldown { remaining_ms: u64 },
    /// Silent attempt while a manual scan is loading
    ManualLoading,
    /// Camera is not active
    SensorOffline,
    /// Session has been torn down
    SessionClosed,
}

impl fmt::Display for ScanRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanRejection::ManualInFlight => f.write_str("manual scan in flight"),
            ScanRejection::SilentInFlight => f.write_str("silent scan in flight"),
            ScanRejection::Cooldown { remaining_ms } => {
                write!(f, "silent cooldown ({}ms remaining)", remaining_ms)
            }
            ScanRejection::ManualLoading => f.write_str("manual scan loading"),
            ScanRejection::SensorOffline => f.write_str("sensor offline"),
            ScanRejection::SessionClosed => f.write_str("session closed"),
        }
    }
}

/// In-flight bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanRequestState {
    pub manual_in_flight: bool,
    pub silent_in_flight: bool,
    /// Start time of the last admitted silent scan
    pub last_silent_started: Option<Instant>,
}

impl ScanRequestState {
    fn admit(&self, kind: ScanKind, now: Instant, cooldown: Duration) -> Result<(), ScanRejection> {
        match kind {
            ScanKind::Manual => {
                if self.manual_in_flight {
                    return Err(ScanRejection::ManualInFlight);
                }
            }
            ScanKind::Silent => {
                if self.silent_in_flight {
                    return Err(ScanRejection::SilentInFlight);
                }
                if let Some(last) = self.last_silent_started {
                    let elapsed = now.saturating_duration_since(last);
                    if elapsed < cooldown {
                        return Err(ScanRejection::Cooldown {
                            remaining_ms: (cooldown - elapsed).as_millis() as u64,
                        });
                    }
                }
                if self.manual_in_flight {
                    return Err(ScanRejection::ManualLoading);
                }
            }
        }
        Ok(())
    }

    fn set_in_flight(&mut self, kind: ScanKind, value: bool) {
        match kind {
            ScanKind::Manual => self.manual_in_flight = value,
            ScanKind::Silent => self.silent_in_flight = value,
        }
    }
}

/// Scan admission controller
pub struct ScanScheduler {
    state: Mutex<ScanRequestState>,
    policy: SchedulerPolicy,
    next_sequence: AtomicU64,
}

impl ScanScheduler {
    /// Create new scheduler
    pub fn new(policy: SchedulerPolicy) -> Self {
        Self {
            state: Mutex::new(ScanRequestState::default()),
            policy,
            next_sequence: AtomicU64::new(1),
        }
    }

    pub fn policy(&self) -> SchedulerPolicy {
        self.policy
    }

    /// Current in-flight state
    pub fn state(&self) -> ScanRequestState {
        *self.state.lock()
    }

    /// Whether a manual scan is loading (foreground indicator)
    pub fn is_loading(&self) -> bool {
        self.state.lock().manual_in_flight
    }

    /// Whether a silent scan is processing (background indicator)
    pub fn is_processing(&self) -> bool {
        self.state.lock().silent_in_flight
    }

    /// Try to start a scan of `kind`
    ///
    /// Rejected requests are dropped, not queued.
    pub fn try_begin(self: &Arc<Self>, kind: ScanKind) -> Result<ScanLease, ScanRejection> {
        let now = Instant::now();
        {
            let mut state = self.state.lock();
            if let Err(rejection) = state.admit(kind, now, self.policy.silent_cooldown) {
                tracing::debug!(kind = kind.as_str(), %rejection, "Scan rejected");
                return Err(rejection);
            }
            state.set_in_flight(kind, true);
            if kind == ScanKind::Silent {
                state.last_silent_started = Some(now);
            }
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(kind = kind.as_str(), sequence, "Scan admitted");

        Ok(ScanLease {
            scheduler: Arc::clone(self),
            kind,
            sequence,
            started_at: now,
        })
    }

    fn release(&self, kind: ScanKind) {
        self.state.lock().set_in_flight(kind, false);
    }
}

impl Default for ScanScheduler {
    fn default() -> Self {
        Self::new(SchedulerPolicy::default())
    }
}

/// Admission ticket for one scan; releases the slot on drop
pub struct ScanLease {
    scheduler: Arc<ScanScheduler>,
    kind: ScanKind,
    sequence: u64,
    started_at: Instant,
}

impl ScanLease {
    pub fn kind(&self) -> ScanKind {
        self.kind
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl fmt::Debug for ScanLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanLease")
            .field("kind", &self.kind)
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl Drop for ScanLease {
    fn drop(&mut self) {
        self.scheduler.release(self.kind);
        tracing::trace!(kind = self.kind.as_str(), sequence = self.sequence, "Scan slot released");
    }
}
