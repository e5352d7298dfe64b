//! Reduces the candidate stream into one canonical [`DriftState`] per
//! session.
//!
//! Clearing is a conservative union: every active cause must individually
//! clear before the session is reported focused again, regardless of the
//! order candidates arrive in. The persisted [`DistractionEvent`] keeps the
//! first recorded cause; its duration is the clearing candidate's
//! source-measured span when one is carried, otherwise wall-clock time
//! since the recorded start.

use crate::signal::{CandidateKind, DriftCandidate, DriftState, SignalKind};
use chrono::{DateTime, Utc};
use helmsman_services::{DistractionEvent, DriftCause, EventSink};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// The distraction episode being accumulated for persistence. First cause
/// wins; duration is only known once every cause has cleared.
#[derive(Debug, Clone, Copy)]
struct Episode {
    cause: DriftCause,
    started_at: DateTime<Utc>,
    last_check: DateTime<Utc>,
}

pub struct DriftAggregator {
    session_id: Uuid,
    active: HashMap<SignalKind, DriftCause>,
    episode: Option<Episode>,
    state_tx: watch::Sender<DriftState>,
    sink: Arc<dyn EventSink>,
}

impl DriftAggregator {
    /// Returns the aggregator plus the receiver for its published state.
    #[must_use]
    pub fn new(session_id: Uuid, sink: Arc<dyn EventSink>) -> (Self, watch::Receiver<DriftState>) {
        let (state_tx, state_rx) = watch::channel(DriftState::default());
        (
            Self {
                session_id,
                active: HashMap::new(),
                episode: None,
                state_tx,
                sink,
            },
            state_rx,
        )
    }

    /// Consume candidates until the channel closes or the session is
    /// cancelled; an episode still open at that point is finalized so its
    /// record is not lost.
    pub async fn run(
        mut self,
        mut candidates: mpsc::Receiver<DriftCandidate>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                candidate = candidates.recv() => match candidate {
                    None => break,
                    Some(candidate) => self.handle(candidate).await,
                },
            }
        }
        self.flush().await;
        log::debug!("drift aggregator stopped");
    }

    /// Single entry point for one candidate.
    async fn handle(&mut self, candidate: DriftCandidate) {
        match candidate.kind {
            CandidateKind::Drift { cause, started_at } => {
                self.handle_drift(candidate.source, cause, started_at);
            }
            CandidateKind::FocusRestored => {
                self.handle_restore(candidate.source, candidate.duration).await;
            }
        }
        self.publish();
    }

    fn handle_drift(&mut self, source: SignalKind, cause: DriftCause, started_at: DateTime<Utc>) {
        // A kind that is already distracted keeps its original entry.
        self.active.entry(source).or_insert(cause);

        match &mut self.episode {
            // Already distracted: first cause wins, refresh metadata only.
            Some(episode) => {
                episode.last_check = Utc::now();
                log::debug!(
                    "drift ongoing ({:?}), checked at {}",
                    episode.cause,
                    episode.last_check
                );
            }
            None => {
                log::info!("drift started: {cause:?} (since {started_at})");
                self.episode = Some(Episode {
                    cause,
                    started_at,
                    last_check: Utc::now(),
                });
            }
        }
    }

    async fn handle_restore(&mut self, source: SignalKind, measured: Option<std::time::Duration>) {
        if self.active.remove(&source).is_none() {
            // Clearing signal for a cause never recorded: defensive ignore.
            log::warn!("ignoring focus-restored from {source:?} with no active drift");
            return;
        }

        if !self.active.is_empty() {
            // Union clearing: other causes are still holding the state.
            log::debug!(
                "{source:?} cleared, {} cause(s) still active",
                self.active.len()
            );
            return;
        }

        if let Some(episode) = self.episode.take() {
            // Prefer the clearing source's measured span; it is monotonic
            // where the wall-clock difference is not.
            let duration = measured.unwrap_or_else(|| {
                (Utc::now() - episode.started_at).to_std().unwrap_or_default()
            });
            log::info!(
                "drift ended: {:?} after {}s",
                episode.cause,
                duration.as_secs()
            );
            let event = DistractionEvent {
                session_id: self.session_id,
                cause: episode.cause,
                started_at: episode.started_at,
                duration,
            };
            // Fire-and-forget: a dropped write never affects state.
            if let Err(e) = self.sink.record_distraction(&event).await {
                log::warn!("failed to persist distraction event: {e}");
            }
        }
    }

    /// Dominant cause over the active set, by fixed precedence.
    fn dominant_cause(&self) -> Option<DriftCause> {
        self.active.values().copied().min_by_key(|c| c.precedence())
    }

    fn publish(&self) {
        let state = DriftState {
            is_distracted: !self.active.is_empty(),
            dominant_cause: self.dominant_cause(),
            started_at: self.episode.map(|e| e.started_at),
        };
        // Watch send only fails with no receivers, which is fine.
        let _ = self.state_tx.send(state);
    }

    /// Finalize an episode left open at shutdown/session end.
    async fn flush(&mut self) {
        if let Some(episode) = self.episode.take() {
            let duration = (Utc::now() - episode.started_at)
                .to_std()
                .unwrap_or_default();
            let event = DistractionEvent {
                session_id: self.session_id,
                cause: episode.cause,
                started_at: episode.started_at,
                duration,
            };
            if let Err(e) = self.sink.record_distraction(&event).await {
                log::warn!("failed to persist distraction event at shutdown: {e}");
            }
        }
    }
}
