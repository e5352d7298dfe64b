//! Session lifecycle and elapsed-time accounting.
//!
//! The session is owned exclusively by [`SessionLifecycleController`];
//! every mutation flows through [`SessionLifecycleController::apply`], the
//! single state-transition entry point. Events carry timestamps so the
//! accounting is deterministic.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Lifecycle state of one focus period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// On course: focused on the declared goal.
    Sailing,
    /// Off course: one or more drift causes active.
    Drifting,
    /// Finalized; no further transitions.
    Ended,
}

/// One bounded focus period with a single associated goal.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub goal: String,
    pub related_contexts: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub focused_secs: u64,
    pub drifted_secs: u64,
    pub drift_events: u32,
    pub state: SessionState,
}

/// Inputs to the session state machine.
#[derive(Debug, Clone, Copy)]
pub enum SessionEvent {
    DriftStarted { at: DateTime<Utc> },
    DriftEnded { at: DateTime<Utc> },
    End { at: DateTime<Utc> },
}

pub struct SessionLifecycleController {
    session: Session,
    /// When the current focused/drifting interval began.
    interval_start: DateTime<Utc>,
}

impl SessionLifecycleController {
    #[must_use]
    pub fn new(goal: String, related_contexts: Vec<String>) -> Self {
        let now = Utc::now();
        Self::starting_at(goal, related_contexts, now)
    }

    #[must_use]
    pub fn starting_at(
        goal: String,
        related_contexts: Vec<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session: Session {
                id: Uuid::new_v4(),
                goal,
                related_contexts,
                started_at,
                ended_at: None,
                focused_secs: 0,
                drifted_secs: 0,
                drift_events: 0,
                state: SessionState::Sailing,
            },
            interval_start: started_at,
        }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Single entry point for all session mutations. Events after `Ended`
    /// are ignored defensively.
    pub fn apply(&mut self, event: SessionEvent) {
        if self.session.state == SessionState::Ended {
            log::warn!("ignoring {event:?} on an ended session");
            return;
        }

        match event {
            SessionEvent::DriftStarted { at } => {
                if self.session.state == SessionState::Drifting {
                    return;
                }
                self.close_interval(at);
                self.session.state = SessionState::Drifting;
                self.session.drift_events += 1;
                log::info!(
                    "session {}: drifting (event #{})",
                    self.session.id,
                    self.session.drift_events
                );
            }
            SessionEvent::DriftEnded { at } => {
                if self.session.state != SessionState::Drifting {
                    return;
                }
                self.close_interval(at);
                self.session.state = SessionState::Sailing;
                log::info!("session {}: back to sailing", self.session.id);
            }
            SessionEvent::End { at } => {
                self.close_interval(at);
                self.session.state = SessionState::Ended;
                self.session.ended_at = Some(at);
                log::info!(
                    "session {} ended: focused {}s, drifted {}s, {} drift event(s)",
                    self.session.id,
                    self.session.focused_secs,
                    self.session.drifted_secs,
                    self.session.drift_events
                );
            }
        }
    }

    /// Attribute the elapsed interval to the bucket matching the state it
    /// was spent in. Back-dated events (idle starts predate their emission)
    /// are clamped so already-attributed time is never counted twice.
    fn close_interval(&mut self, at: DateTime<Utc>) {
        let at = at.max(self.interval_start);
        let elapsed = (at - self.interval_start).num_seconds().max(0) as u64;
        match self.session.state {
            SessionState::Sailing => self.session.focused_secs += elapsed,
            SessionState::Drifting => self.session.drifted_secs += elapsed,
            SessionState::Ended => {}
        }
        self.interval_start = at;
    }
}
