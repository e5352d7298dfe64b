//! Candidate events flowing from the signal sources to the aggregator.
//!
//! Each source watches one attention dimension and publishes onto a single
//! shared channel. Within a source events are strictly ordered (a restore
//! can only follow its own drift); across sources no order is guaranteed.

use chrono::{DateTime, Utc};
use helmsman_services::DriftCause;
use std::time::Duration;
use tokio::sync::mpsc;

/// Which source a candidate came from. Each source has at most one active
/// drift at a time, so the aggregator keys its active table on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Visibility,
    Context,
    Idle,
    Multimodal,
}

/// Whether a candidate raises a distraction or clears one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CandidateKind {
    Drift {
        cause: DriftCause,
        /// When the distraction actually began, which may predate emission
        /// (grace periods, idle windows).
        started_at: DateTime<Utc>,
    },
    FocusRestored,
}

/// Ephemeral value emitted by a signal source; consumed once by the
/// aggregator and never persisted.
#[derive(Debug, Clone)]
pub struct DriftCandidate {
    pub source: SignalKind,
    pub kind: CandidateKind,
    pub detected_at: DateTime<Utc>,
    pub confidence: f32,
    /// Filled in on restore candidates where the source measured the span.
    pub duration: Option<Duration>,
}

impl DriftCandidate {
    #[must_use]
    pub fn drift(
        source: SignalKind,
        cause: DriftCause,
        started_at: DateTime<Utc>,
        confidence: f32,
    ) -> Self {
        Self {
            source,
            kind: CandidateKind::Drift { cause, started_at },
            detected_at: Utc::now(),
            confidence,
            duration: None,
        }
    }

    #[must_use]
    pub fn restored(source: SignalKind, duration: Option<Duration>) -> Self {
        Self {
            source,
            kind: CandidateKind::FocusRestored,
            detected_at: Utc::now(),
            confidence: 1.0,
            duration,
        }
    }
}

/// Sender half shared by every signal source.
pub type CandidateTx = mpsc::Sender<DriftCandidate>;

/// Canonical per-session drift state, published by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DriftState {
    pub is_distracted: bool,
    pub dominant_cause: Option<DriftCause>,
    pub started_at: Option<DateTime<Utc>>,
}
