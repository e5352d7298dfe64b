//! Per-session orchestration.
//!
//! [`FocusDaemon`] owns one focus session end to end: it spawns the signal
//! sources, the aggregator, and the heartbeat under a shared cancellation
//! token, routes host events to the right source, mirrors the aggregated
//! drift state into the session lifecycle, and launches a voice
//! intervention once a drift has been sustained long enough.

use crate::aggregator::DriftAggregator;
use crate::config::HelmsmanConfig;
use crate::heartbeat::HeartbeatScheduler;
use crate::session::{Session, SessionEvent, SessionLifecycleController};
use crate::signal::DriftState;
use crate::sources::{
    ContextChange, ContextRules, ContextWatcher, IdleWatcher, VisibilityEvent, VisibilityWatcher,
};
use chrono::Utc;
use helmsman_dialogue::{DialogueHandle, DialogueServices, InterventionConfig};
use helmsman_services::{
    CaptureDevice, DialogueService, DriftContext, EventSink, MultimodalClassifier, PlaybackSink,
    SpeechSynthesizer, TranscriptionService,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Raw attention events from the host surface (browser extension, desktop
/// shell, test harness). The daemon routes each to its signal source.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    VisibilityChanged { visible: bool },
    ContextChanged { location: String },
    InputActivity,
    EndSession,
}

/// External collaborators for a whole session: the heartbeat's capture and
/// classification plus everything a spawned dialogue needs.
#[derive(Clone)]
pub struct DaemonServices {
    pub capture: Arc<dyn CaptureDevice>,
    pub classifier: Arc<dyn MultimodalClassifier>,
    pub transcriber: Arc<dyn TranscriptionService>,
    pub dialogue: Arc<dyn DialogueService>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub playback: Arc<dyn PlaybackSink>,
    pub sink: Arc<dyn EventSink>,
}

impl DaemonServices {
    fn dialogue_services(&self) -> DialogueServices {
        DialogueServices {
            capture: Arc::clone(&self.capture),
            transcriber: Arc::clone(&self.transcriber),
            dialogue: Arc::clone(&self.dialogue),
            synthesizer: Arc::clone(&self.synthesizer),
            playback: Arc::clone(&self.playback),
            sink: Arc::clone(&self.sink),
        }
    }
}

pub struct FocusDaemon {
    config: HelmsmanConfig,
    services: DaemonServices,
    lifecycle: SessionLifecycleController,
}

impl FocusDaemon {
    #[must_use]
    pub fn new(
        config: HelmsmanConfig,
        services: DaemonServices,
        goal: String,
        related_contexts: Vec<String>,
    ) -> Self {
        Self {
            config,
            services,
            lifecycle: SessionLifecycleController::new(goal, related_contexts),
        }
    }

    /// Run the session until the host ends it or the token is cancelled.
    /// Returns the finalized session with its accounting.
    pub async fn run(
        mut self,
        mut host_events: mpsc::Receiver<HostEvent>,
        cancel: CancellationToken,
    ) -> Session {
        let session = self.lifecycle.session();
        let session_id = session.id;
        let goal = session.goal.clone();
        let related_contexts = session.related_contexts.clone();
        log::info!("session {session_id} started: {goal}");

        let (candidate_tx, candidate_rx) = mpsc::channel(64);
        let (visibility_tx, visibility_rx) = mpsc::channel(16);
        let (context_tx, context_rx) = mpsc::channel(16);
        let (input_tx, input_rx) = mpsc::channel(16);

        let visibility =
            VisibilityWatcher::new(self.config.visibility_grace(), candidate_tx.clone());
        tokio::spawn(visibility.run(visibility_rx, cancel.clone()));

        let rules = ContextRules::new(
            related_contexts.clone(),
            &self.config.rules.blacklist,
            &self.config.rules.productivity,
        );
        let context = ContextWatcher::new(rules, candidate_tx.clone());
        tokio::spawn(context.run(context_rx, cancel.clone()));

        let idle = IdleWatcher::new(self.config.idle_threshold(), candidate_tx.clone());
        tokio::spawn(idle.run(input_rx, cancel.clone()));

        let heartbeat = HeartbeatScheduler::new(
            self.config.heartbeat_interval(),
            Arc::clone(&self.services.capture),
            Arc::clone(&self.services.classifier),
            goal.clone(),
            related_contexts,
            candidate_tx,
        );
        tokio::spawn(heartbeat.run(cancel.clone()));

        let (aggregator, mut drift_rx) =
            DriftAggregator::new(session_id, Arc::clone(&self.services.sink));
        let aggregator_task = tokio::spawn(aggregator.run(candidate_rx, cancel.clone()));

        let mut drift_state = DriftState::default();
        let mut intervene_at: Option<Instant> = None;
        let mut intervention: Option<DialogueHandle> = None;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = host_events.recv() => match event {
                    None | Some(HostEvent::EndSession) => break,
                    Some(HostEvent::VisibilityChanged { visible }) => {
                        let event = if visible {
                            VisibilityEvent::Visible
                        } else {
                            VisibilityEvent::Hidden
                        };
                        let _ = visibility_tx.send(event).await;
                    }
                    Some(HostEvent::ContextChanged { location }) => {
                        let _ = context_tx.send(ContextChange { location }).await;
                    }
                    Some(HostEvent::InputActivity) => {
                        let _ = input_tx.send(()).await;
                    }
                },
                changed = drift_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = *drift_rx.borrow_and_update();
                    intervene_at = self.on_drift_change(drift_state, next, intervene_at);
                    drift_state = next;
                }
                () = sleep_until_armed(intervene_at), if intervene_at.is_some() => {
                    intervene_at = None;
                    if let Some(previous) = intervention.take() {
                        previous.cancel();
                    }
                    intervention = Some(self.intervene(&drift_state, &goal));
                }
            }
        }

        cancel.cancel();
        if let Some(handle) = intervention.take() {
            handle.cancel();
        }
        // The aggregator flushes any open episode on cancellation; wait for
        // that before finalizing, so the record is not lost.
        let _ = aggregator_task.await;

        self.lifecycle.apply(SessionEvent::End { at: Utc::now() });
        self.lifecycle.session().clone()
    }

    /// Mirror an aggregated state change into the session lifecycle and
    /// arm/disarm the sustained-drift timer.
    fn on_drift_change(
        &mut self,
        previous: DriftState,
        next: DriftState,
        armed: Option<Instant>,
    ) -> Option<Instant> {
        if next.is_distracted && !previous.is_distracted {
            let started_at = next.started_at.unwrap_or_else(Utc::now);
            self.lifecycle
                .apply(SessionEvent::DriftStarted { at: started_at });
            // Count the sustain window from the back-dated start.
            let already = (Utc::now() - started_at).to_std().unwrap_or_default();
            let remaining = self.config.sustained_drift().saturating_sub(already);
            return Some(Instant::now() + remaining);
        }
        if !next.is_distracted && previous.is_distracted {
            self.lifecycle
                .apply(SessionEvent::DriftEnded { at: Utc::now() });
            return None;
        }
        armed
    }

    fn intervene(&self, state: &DriftState, goal: &str) -> DialogueHandle {
        let drifted_minutes = state
            .started_at
            .map(|started| (Utc::now() - started).num_minutes().max(0) as u64)
            .unwrap_or_default();
        let context = DriftContext {
            cause: state
                .dominant_cause
                .unwrap_or(helmsman_services::DriftCause::IrrelevantContext),
            drifted_minutes,
            goal: goal.to_string(),
        };
        log::info!(
            "sustained drift ({:?}, {drifted_minutes}min), starting intervention",
            context.cause
        );
        helmsman_dialogue::spawn(
            self.services.dialogue_services(),
            intervention_config(&self.config),
            context,
        )
    }
}

fn intervention_config(config: &HelmsmanConfig) -> InterventionConfig {
    InterventionConfig {
        auto_restart: config.dialogue.auto_restart,
        settle_delay: std::time::Duration::from_millis(config.dialogue.settle_delay_ms),
        inactivity_ceiling: std::time::Duration::from_secs(config.dialogue.inactivity_ceiling_secs),
        retry_delay: std::time::Duration::from_millis(config.dialogue.retry_delay_ms),
    }
}

/// Sleep until the armed deadline; only selected when the caller knows the
/// option is `Some`.
async fn sleep_until_armed(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;
    use async_trait::async_trait;
    use helmsman_services::{
        ClassificationRequest, ClassificationVerdict, ConversationTurn, DialogueReply,
        DisabledCapture, DistractionEvent, DriftCause, Role, ServiceError, Transcript,
    };
    use std::sync::Mutex;
    use std::time::Duration;

    /// No artifacts are ever capturable, so this must never be called.
    struct UnreachableClassifier;

    #[async_trait]
    impl MultimodalClassifier for UnreachableClassifier {
        async fn classify(
            &self,
            _request: &ClassificationRequest,
        ) -> Result<ClassificationVerdict, ServiceError> {
            panic!("classifier called without artifacts");
        }
    }

    struct StubTranscriber;

    #[async_trait]
    impl TranscriptionService for StubTranscriber {
        async fn transcribe(&self, _audio: &[u8]) -> Result<Transcript, ServiceError> {
            Ok(Transcript {
                text: "sorry, got sidetracked".to_string(),
                confidence: 0.9,
            })
        }
    }

    struct StubDialogue;

    #[async_trait]
    impl DialogueService for StubDialogue {
        async fn converse(
            &self,
            _history: &[ConversationTurn],
            _user_text: &str,
            _context: &DriftContext,
        ) -> Result<DialogueReply, ServiceError> {
            Ok(DialogueReply {
                assistant_text: "back to it, then".to_string(),
                conversation_id: "conv-1".to_string(),
            })
        }
    }

    struct StubSynth;

    #[async_trait]
    impl SpeechSynthesizer for StubSynth {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, ServiceError> {
            Ok(vec![0u8; 8])
        }
    }

    struct StubPlayback;

    #[async_trait]
    impl PlaybackSink for StubPlayback {
        async fn play(&self, _audio: &[u8]) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        distractions: Mutex<Vec<DistractionEvent>>,
        turns: Mutex<Vec<ConversationTurn>>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn record_distraction(
            &self,
            event: &DistractionEvent,
        ) -> Result<(), ServiceError> {
            self.distractions.lock().unwrap().push(event.clone());
            Ok(())
        }

        async fn record_turn(&self, turn: &ConversationTurn) -> Result<(), ServiceError> {
            self.turns.lock().unwrap().push(turn.clone());
            Ok(())
        }
    }

    fn services(sink: Arc<RecordingSink>) -> DaemonServices {
        DaemonServices {
            capture: Arc::new(DisabledCapture),
            classifier: Arc::new(UnreachableClassifier),
            transcriber: Arc::new(StubTranscriber),
            dialogue: Arc::new(StubDialogue),
            synthesizer: Arc::new(StubSynth),
            playback: Arc::new(StubPlayback),
            sink,
        }
    }

    fn config() -> HelmsmanConfig {
        HelmsmanConfig {
            timing: TimingConfig {
                visibility_grace_secs: 5,
                idle_threshold_secs: 90,
                heartbeat_interval_secs: 60,
                sustained_drift_secs: 300,
            },
            ..HelmsmanConfig::default()
        }
    }

    fn daemon(sink: Arc<RecordingSink>) -> FocusDaemon {
        FocusDaemon::new(
            config(),
            services(sink),
            "draft the launch announcement".to_string(),
            vec!["docs.google.com".to_string()],
        )
    }

    async fn settle() {
        // Give the watcher tasks a chance to drain channels before the
        // paused clock is advanced past their deadlines.
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_blacklisted_context_drives_one_drift_episode() {
        let sink = Arc::new(RecordingSink::default());
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(daemon(sink.clone()).run(rx, CancellationToken::new()));

        tx.send(HostEvent::ContextChanged {
            location: "https://youtube.com/watch?v=abc".to_string(),
        })
        .await
        .unwrap();
        settle().await;

        tx.send(HostEvent::ContextChanged {
            location: "https://docs.google.com/document/d/1".to_string(),
        })
        .await
        .unwrap();
        settle().await;

        tx.send(HostEvent::EndSession).await.unwrap();
        let session = task.await.unwrap();

        assert_eq!(session.drift_events, 1);
        assert_eq!(session.state, crate::session::SessionState::Ended);
        let distractions = sink.distractions.lock().unwrap();
        assert_eq!(distractions.len(), 1);
        assert_eq!(distractions[0].cause, DriftCause::BlacklistedContent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_surface_drifts_only_after_grace() {
        let sink = Arc::new(RecordingSink::default());
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(daemon(sink.clone()).run(rx, CancellationToken::new()));

        tx.send(HostEvent::VisibilityChanged { visible: false })
            .await
            .unwrap();
        settle().await;
        // Back within the grace period: no drift.
        tokio::time::sleep(Duration::from_secs(3)).await;
        tx.send(HostEvent::VisibilityChanged { visible: true })
            .await
            .unwrap();
        settle().await;

        // Hidden past the grace period: one episode.
        tx.send(HostEvent::VisibilityChanged { visible: false })
            .await
            .unwrap();
        settle().await;
        tokio::time::sleep(Duration::from_secs(20)).await;
        tx.send(HostEvent::VisibilityChanged { visible: true })
            .await
            .unwrap();
        settle().await;

        tx.send(HostEvent::EndSession).await.unwrap();
        let session = task.await.unwrap();

        assert_eq!(session.drift_events, 1);
        let distractions = sink.distractions.lock().unwrap();
        assert_eq!(distractions.len(), 1);
        assert_eq!(distractions[0].cause, DriftCause::TabSwitch);
        assert!(distractions[0].duration >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_without_input_raises_and_flushes_at_end() {
        let sink = Arc::new(RecordingSink::default());
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(daemon(sink.clone()).run(rx, CancellationToken::new()));

        // Keep the idle timer honest for a while.
        tokio::time::sleep(Duration::from_secs(60)).await;
        tx.send(HostEvent::InputActivity).await.unwrap();
        settle().await;

        // Then go quiet past the threshold.
        tokio::time::sleep(Duration::from_secs(100)).await;
        tx.send(HostEvent::EndSession).await.unwrap();
        let session = task.await.unwrap();

        assert_eq!(session.drift_events, 1);
        // Still idle at session end: the open episode is flushed.
        let distractions = sink.distractions.lock().unwrap();
        assert_eq!(distractions.len(), 1);
        assert_eq!(distractions[0].cause, DriftCause::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_drift_starts_an_intervention() {
        let sink = Arc::new(RecordingSink::default());
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(daemon(sink.clone()).run(rx, CancellationToken::new()));

        tx.send(HostEvent::ContextChanged {
            location: "https://netflix.com/browse".to_string(),
        })
        .await
        .unwrap();
        settle().await;

        // Not yet sustained: no dialogue.
        tokio::time::sleep(Duration::from_secs(200)).await;
        assert!(sink.turns.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(120)).await;
        settle().await;
        {
            let turns = sink.turns.lock().unwrap();
            assert!(!turns.is_empty(), "expected an opener turn");
            assert_eq!(turns[0].number, 0);
            assert_eq!(turns[0].role, Role::Assistant);
        }

        tx.send(HostEvent::EndSession).await.unwrap();
        let session = task.await.unwrap();
        assert_eq!(session.drift_events, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refocus_before_sustain_threshold_cancels_intervention() {
        let sink = Arc::new(RecordingSink::default());
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(daemon(sink.clone()).run(rx, CancellationToken::new()));

        tx.send(HostEvent::ContextChanged {
            location: "https://twitch.tv/somestream".to_string(),
        })
        .await
        .unwrap();
        settle().await;
        // The user keeps typing throughout, so only the context source
        // ever raises drift.
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_secs(60)).await;
            tx.send(HostEvent::InputActivity).await.unwrap();
            settle().await;
        }

        tx.send(HostEvent::ContextChanged {
            location: "https://docs.google.com/document/d/1".to_string(),
        })
        .await
        .unwrap();
        settle().await;

        // Well past where the sustain timer would have fired.
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_secs(60)).await;
            tx.send(HostEvent::InputActivity).await.unwrap();
            settle().await;
        }
        assert!(sink.turns.lock().unwrap().is_empty());

        tx.send(HostEvent::EndSession).await.unwrap();
        let session = task.await.unwrap();
        assert_eq!(session.drift_events, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_ends_the_session() {
        let sink = Arc::new(RecordingSink::default());
        let (_tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(daemon(sink).run(rx, cancel.clone()));

        settle().await;
        cancel.cancel();
        let session = task.await.unwrap();
        assert_eq!(session.state, crate::session::SessionState::Ended);
    }

    #[test]
    fn test_host_events_parse_from_json_lines() {
        let event: HostEvent =
            serde_json::from_str(r#"{"type":"visibility_changed","visible":false}"#).unwrap();
        assert!(matches!(
            event,
            HostEvent::VisibilityChanged { visible: false }
        ));

        let event: HostEvent =
            serde_json::from_str(r#"{"type":"context_changed","location":"https://x.com/home"}"#)
                .unwrap();
        assert!(matches!(event, HostEvent::ContextChanged { location } if location == "https://x.com/home"));

        assert!(matches!(
            serde_json::from_str::<HostEvent>(r#"{"type":"input_activity"}"#).unwrap(),
            HostEvent::InputActivity
        ));
        assert!(matches!(
            serde_json::from_str::<HostEvent>(r#"{"type":"end_session"}"#).unwrap(),
            HostEvent::EndSession
        ));
    }
}
