use crate::turn::DialogueSession;
use helmsman_services::{
    CaptureDevice, CaptureKind, DialogueService, DriftContext, EventSink, PlaybackSink, Role,
    SpeechSynthesizer, TranscriptionService,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Position in the dialogue state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueState {
    Idle,
    AwaitingUser,
    Recording,
    Processing,
    Speaking,
    Ended,
}

/// External triggers. Everything that can happen to a dialogue from the
/// outside arrives as one of these messages; no caller mutates controller
/// state directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueCommand {
    /// Manually begin recording (used when auto-restart is off).
    StartRecording,
    /// Finalize the current recording and send it.
    StopAndSend,
    /// Halt capture/playback, abort in-flight requests, end the dialogue.
    EndConversation,
}

/// Tunables for one intervention.
#[derive(Debug, Clone, Copy)]
pub struct InterventionConfig {
    /// Re-open the mic automatically after each assistant reply.
    pub auto_restart: bool,
    /// Pause between playback completion and the next recording.
    pub settle_delay: Duration,
    /// Total time the dialogue may sit in `AwaitingUser` without a
    /// completed user turn before it is force-ended, whatever the
    /// auto-restart setting. Each finished user turn resets the clock.
    pub inactivity_ceiling: Duration,
    /// Delay before re-engaging after a recoverable error.
    pub retry_delay: Duration,
}

impl Default for InterventionConfig {
    fn default() -> Self {
        Self {
            auto_restart: true,
            settle_delay: Duration::from_millis(1500),
            inactivity_ceiling: Duration::from_secs(45),
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// The external collaborators one dialogue needs.
#[derive(Clone)]
pub struct DialogueServices {
    pub capture: Arc<dyn CaptureDevice>,
    pub transcriber: Arc<dyn TranscriptionService>,
    pub dialogue: Arc<dyn DialogueService>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub playback: Arc<dyn PlaybackSink>,
    pub sink: Arc<dyn EventSink>,
}

/// What the driver loop does next.
enum Step {
    /// Wait for a trigger; `engage_in` schedules an automatic transition
    /// into `Recording`.
    Awaiting { engage_in: Option<Duration> },
    Record,
    Process { audio: Vec<u8> },
    Speak { text: String },
    End,
}

pub struct InterventionController {
    services: DialogueServices,
    config: InterventionConfig,
    context: DriftContext,
    session: DialogueSession,
    state_tx: watch::Sender<DialogueState>,
    /// Time spent in `AwaitingUser` since the last completed user turn,
    /// for the inactivity ceiling.
    awaiting_spent: Duration,
}

impl InterventionController {
    #[must_use]
    pub fn new(
        services: DialogueServices,
        config: InterventionConfig,
        context: DriftContext,
    ) -> (Self, watch::Receiver<DialogueState>) {
        let (state_tx, state_rx) = watch::channel(DialogueState::Idle);
        (
            Self {
                services,
                config,
                context,
                session: DialogueSession::new(),
                state_tx,
                awaiting_spent: Duration::ZERO,
            },
            state_rx,
        )
    }

    /// Drive the dialogue to completion. Turn history is discarded when
    /// this returns; the per-turn records have already gone to the sink.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<DialogueCommand>,
        cancel: CancellationToken,
    ) {
        // Seed turn 0 and greet the user before listening.
        let opener = self.opening_line();
        self.append_turn(Role::Assistant, opener.clone()).await;
        tokio::select! {
            () = cancel.cancelled() => {
                self.finish();
                return;
            }
            () = self.speak_best_effort(&opener) => {}
        }

        let mut step = Step::Awaiting {
            engage_in: Some(Duration::ZERO),
        };
        loop {
            step = match step {
                Step::Awaiting { engage_in } => {
                    self.awaiting(&mut commands, &cancel, engage_in).await
                }
                Step::Record => self.record(&mut commands, &cancel).await,
                Step::Process { audio } => self.process(&mut commands, &cancel, audio).await,
                Step::Speak { text } => self.speak(&mut commands, &cancel, text).await,
                Step::End => break,
            };
        }
        self.finish();
    }

    fn opening_line(&self) -> String {
        format!(
            "Hey - you set out to {}, but you've been {} for about {} minute(s). \
             Want to talk through what pulled you off course?",
            self.context.goal,
            self.context.cause.describe(),
            self.context.drifted_minutes.max(1)
        )
    }

    /// `AwaitingUser`: wait for a manual trigger, a scheduled automatic
    /// engagement, or the inactivity ceiling.
    async fn awaiting(
        &mut self,
        commands: &mut mpsc::Receiver<DialogueCommand>,
        cancel: &CancellationToken,
        engage_in: Option<Duration>,
    ) -> Step {
        self.set_state(DialogueState::AwaitingUser);

        let Some(ceiling_left) = self.config.inactivity_ceiling.checked_sub(self.awaiting_spent)
        else {
            log::info!("dialogue inactivity ceiling reached");
            return Step::End;
        };

        let entered = Instant::now();
        let ceiling = sleep(ceiling_left);
        tokio::pin!(ceiling);
        let engage_at = engage_in.map(|d| Instant::now() + d);

        let step = loop {
            tokio::select! {
                () = cancel.cancelled() => break Step::End,
                () = &mut ceiling => {
                    log::info!("dialogue inactivity ceiling reached");
                    break Step::End;
                }
                () = maybe_sleep_until(engage_at), if engage_at.is_some() => break Step::Record,
                command = commands.recv() => match command {
                    None | Some(DialogueCommand::EndConversation) => break Step::End,
                    Some(DialogueCommand::StartRecording) => break Step::Record,
                    Some(DialogueCommand::StopAndSend) => {
                        log::debug!("ignoring stop-and-send outside recording");
                    }
                },
            }
        };
        self.awaiting_spent += entered.elapsed();
        step
    }

    /// `Recording`: exclusive mic ownership, continuous chunk capture with
    /// fire-and-forget interim transcription, until stop-and-send or the
    /// capture signals end of speech. The mic is released on every path.
    async fn record(
        &mut self,
        commands: &mut mpsc::Receiver<DialogueCommand>,
        cancel: &CancellationToken,
    ) -> Step {
        self.set_state(DialogueState::Recording);

        let handle = match self.services.capture.acquire(CaptureKind::Mic).await {
            Ok(handle) => handle,
            Err(e) => {
                // Mic gone is not recoverable for a voice dialogue.
                log::error!("microphone unavailable, ending dialogue: {e}");
                return Step::End;
            }
        };

        let mut audio: Vec<u8> = Vec::new();
        let step = loop {
            tokio::select! {
                () = cancel.cancelled() => break Step::End,
                command = commands.recv() => match command {
                    None | Some(DialogueCommand::EndConversation) => break Step::End,
                    Some(DialogueCommand::StopAndSend) => break Step::Process { audio },
                    Some(DialogueCommand::StartRecording) => {}
                },
                frame = self.services.capture.capture_frame(&handle) => match frame {
                    Ok(Some(chunk)) => {
                        self.stream_interim(&chunk);
                        audio.extend_from_slice(&chunk);
                    }
                    Ok(None) => break Step::Process { audio },
                    Err(e) => {
                        log::warn!("mic capture failed, returning to listening: {e}");
                        break Step::Awaiting {
                            engage_in: self.retry_engagement(),
                        };
                    }
                },
            }
        };
        self.services.capture.release(handle).await;
        step
    }

    /// Interim chunks are acknowledgement-only: results are logged and
    /// discarded, never turn-ending.
    fn stream_interim(&self, chunk: &[u8]) {
        let transcriber = Arc::clone(&self.services.transcriber);
        let chunk = chunk.to_vec();
        tokio::spawn(async move {
            match transcriber.transcribe(&chunk).await {
                Ok(interim) => log::debug!("interim transcript: {}", interim.text),
                Err(e) => log::debug!("interim transcription dropped: {e}"),
            }
        });
    }

    /// `Processing`: finalize the audio into a user turn, then ask the
    /// dialogue service for the coaching reply.
    async fn process(
        &mut self,
        commands: &mut mpsc::Receiver<DialogueCommand>,
        cancel: &CancellationToken,
        audio: Vec<u8>,
    ) -> Step {
        self.set_state(DialogueState::Processing);

        let transcriber = Arc::clone(&self.services.transcriber);
        let transcript = match race_commands(
            commands,
            cancel,
            async move { transcriber.transcribe(&audio).await },
        )
        .await
        {
            Raced::Interrupted => return Step::End,
            Raced::Done(Err(e)) => return self.service_failure("transcription", &e),
            Raced::Done(Ok(transcript)) => transcript,
        };
        log::debug!(
            "user said ({:.2}): {}",
            transcript.confidence,
            transcript.text
        );
        self.append_turn(Role::User, transcript.text.clone()).await;
        // The user spoke; the inactivity clock starts over.
        self.awaiting_spent = Duration::ZERO;

        let dialogue = Arc::clone(&self.services.dialogue);
        let history = self.session.history_before_last().to_vec();
        let context = self.context.clone();
        let text = transcript.text;
        let reply = match race_commands(commands, cancel, async move {
            dialogue.converse(&history, &text, &context).await
        })
        .await
        {
            Raced::Interrupted => return Step::End,
            Raced::Done(Err(e)) => return self.service_failure("dialogue", &e),
            Raced::Done(Ok(reply)) => reply,
        };

        self.session.conversation_id = reply.conversation_id;
        Step::Speak {
            text: reply.assistant_text,
        }
    }

    /// `Speaking`: append the assistant turn, synthesize, and play.
    /// Playback completion - success or audio error - moves the dialogue
    /// back toward listening.
    async fn speak(
        &mut self,
        commands: &mut mpsc::Receiver<DialogueCommand>,
        cancel: &CancellationToken,
        text: String,
    ) -> Step {
        self.set_state(DialogueState::Speaking);
        self.append_turn(Role::Assistant, text.clone()).await;

        let synthesizer = Arc::clone(&self.services.synthesizer);
        let playback = Arc::clone(&self.services.playback);
        let spoken = race_commands(commands, cancel, async move {
            let audio = synthesizer.synthesize(&text).await?;
            playback.play(&audio).await
        })
        .await;
        match spoken {
            Raced::Interrupted => return Step::End,
            Raced::Done(Err(e)) => {
                // Audio trouble is not worth ending the conversation over.
                log::warn!("synthesis/playback failed: {e}");
            }
            Raced::Done(Ok(())) => {}
        }

        if self.config.auto_restart {
            Step::Awaiting {
                engage_in: Some(self.config.settle_delay),
            }
        } else {
            Step::Awaiting { engage_in: None }
        }
    }

    /// Recoverable errors return to listening (optionally re-engaging);
    /// fatal errors end the dialogue.
    fn service_failure(&self, what: &str, error: &helmsman_services::ServiceError) -> Step {
        if error.is_recoverable() {
            log::warn!("{what} failed recoverably: {error}");
            Step::Awaiting {
                engage_in: self.retry_engagement(),
            }
        } else {
            log::error!("{what} failed fatally, ending dialogue: {error}");
            Step::End
        }
    }

    fn retry_engagement(&self) -> Option<Duration> {
        self.config.auto_restart.then_some(self.config.retry_delay)
    }

    async fn append_turn(&mut self, role: Role, content: String) {
        let turn = self.session.append(role, content);
        // Fire-and-forget persistence: a dropped write changes nothing.
        if let Err(e) = self.services.sink.record_turn(&turn).await {
            log::warn!("failed to persist turn {}: {e}", turn.number);
        }
    }

    /// Best-effort synthesis + playback for the opener, before the state
    /// machine starts listening.
    async fn speak_best_effort(&self, text: &str) {
        match self.services.synthesizer.synthesize(text).await {
            Ok(audio) => {
                if let Err(e) = self.services.playback.play(&audio).await {
                    log::warn!("opener playback failed: {e}");
                }
            }
            Err(e) => log::warn!("opener synthesis failed: {e}"),
        }
    }

    fn set_state(&mut self, state: DialogueState) {
        self.session.state = state;
        let _ = self.state_tx.send(state);
    }

    fn finish(&mut self) {
        self.set_state(DialogueState::Ended);
        log::info!(
            "dialogue {} ended after {} turn(s)",
            self.session.conversation_id,
            self.session.turns.len()
        );
    }
}

/// Sleep until the given instant; only selected when the caller knows the
/// option is `Some`.
async fn maybe_sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Outcome of racing a service call against the command channel.
enum Raced<T> {
    Done(T),
    /// Cancelled or told to end; the in-flight call is dropped (aborted).
    Interrupted,
}

/// Poll a service future while still honouring end-of-conversation
/// triggers; irrelevant commands are ignored rather than aborting the call.
async fn race_commands<T>(
    commands: &mut mpsc::Receiver<DialogueCommand>,
    cancel: &CancellationToken,
    fut: impl std::future::Future<Output = T>,
) -> Raced<T> {
    tokio::pin!(fut);
    loop {
        tokio::select! {
            () = cancel.cancelled() => return Raced::Interrupted,
            result = &mut fut => return Raced::Done(result),
            command = commands.recv() => match command {
                None | Some(DialogueCommand::EndConversation) => return Raced::Interrupted,
                Some(other) => log::debug!("ignoring {other:?} while busy"),
            },
        }
    }
}

/// Running dialogue handle. Starting a new intervention for the same
/// session must cancel the previous handle first.
pub struct DialogueHandle {
    pub commands: mpsc::Sender<DialogueCommand>,
    pub state: watch::Receiver<DialogueState>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl DialogueHandle {
    /// Abort capture, playback, and in-flight requests.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        *self.state.borrow() == DialogueState::Ended || self.join.is_finished()
    }

    /// Wait for the dialogue task to finish.
    pub async fn join(self) {
        let _ = self.join.await;
    }
}

/// Spawn an intervention dialogue as its own task.
#[must_use]
pub fn spawn(
    services: DialogueServices,
    config: InterventionConfig,
    context: DriftContext,
) -> DialogueHandle {
    let (controller, state) = InterventionController::new(services, config, context);
    let (command_tx, command_rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let join = tokio::spawn(controller.run(command_rx, cancel.clone()));
    DialogueHandle {
        commands: command_tx,
        state,
        cancel,
        join,
    }
}
