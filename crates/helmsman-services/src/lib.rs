//! Service boundary for the helmsman focus daemon.
//!
//! Everything the core subsystem needs from the outside world lives behind
//! the traits in this crate: media capture, transcription, multimodal
//! classification, dialogue completion, speech synthesis, playback, and the
//! persistence sink. HTTP implementations are provided for the network
//! services; capture and playback default to headless no-op implementations
//! so the daemon degrades instead of crashing when a device is absent.

pub mod capture;
pub mod classify;
pub mod dialogue;
pub mod error;
pub mod persist;
pub mod playback;
pub mod synthesize;
pub mod transcribe;
pub mod types;

pub use capture::{CaptureDevice, CaptureHandle, CaptureKind, DisabledCapture};
pub use classify::{HttpClassifier, MultimodalClassifier};
pub use dialogue::{DialogueService, HttpDialogue};
pub use error::{CaptureError, ServiceError};
pub use persist::{EventSink, JsonlEventSink, NullSink};
pub use playback::{LogPlayback, PlaybackSink};
pub use synthesize::{HttpSynthesizer, SpeechSynthesizer};
pub use transcribe::{HttpTranscriber, TranscriptionService};
pub use types::{
    CameraAnalysis, ClassificationRequest, ClassificationVerdict, ConversationTurn, DialogueReply,
    DistractionEvent, DriftCause, DriftContext, Role, Transcript,
};
