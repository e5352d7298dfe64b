use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Why the user is judged off-task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftCause {
    /// Work surface went to the background and stayed there.
    TabSwitch,
    /// Navigated to known entertainment / social / shopping / news content.
    BlacklistedContent,
    /// Context unrelated to the session goal and not on any allow-list.
    IrrelevantContext,
    /// No input activity for longer than the idle threshold.
    Idle,
    /// The periodic screen/camera classification judged the user off-task.
    Multimodal,
}

impl DriftCause {
    /// Fixed precedence used to pick the dominant cause when several
    /// signals are simultaneously distracted. Lower rank wins.
    #[must_use]
    pub const fn precedence(self) -> u8 {
        match self {
            Self::TabSwitch => 0,
            Self::BlacklistedContent | Self::IrrelevantContext => 1,
            Self::Multimodal => 2,
            Self::Idle => 3,
        }
    }

    /// Human-readable label for logs and dialogue prompts.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::TabSwitch => "away from the work surface",
            Self::BlacklistedContent => "browsing distracting content",
            Self::IrrelevantContext => "in a context unrelated to the goal",
            Self::Idle => "idle",
            Self::Multimodal => "judged off-task by the periodic check",
        }
    }
}

/// A finalized distraction episode, persisted once its duration is known.
/// Append-only; written by the aggregator, read by analytics collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistractionEvent {
    pub session_id: Uuid,
    pub cause: DriftCause,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

/// Speaker role within an intervention dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One exchange in an intervention dialogue. Turn numbers are monotonic
/// starting at 0 (the assistant-authored opener).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub number: u32,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Reference to the captured/synthesized audio, when one exists.
    pub audio_ref: Option<String>,
}

/// Drift context handed to the dialogue service so the coaching reply can
/// reference what the user is doing and what they set out to do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftContext {
    pub cause: DriftCause,
    pub drifted_minutes: u64,
    pub goal: String,
}

/// Transcription result for one finalized audio buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub confidence: f32,
}

/// Artifacts and context for one multimodal classification call.
#[derive(Debug, Clone, Default)]
pub struct ClassificationRequest {
    pub screenshot: Option<Vec<u8>>,
    pub camera_frame: Option<Vec<u8>>,
    pub goal_text: String,
    pub related_contexts: Vec<String>,
}

impl ClassificationRequest {
    /// A request with nothing to classify is not worth sending.
    #[must_use]
    pub const fn has_artifacts(&self) -> bool {
        self.screenshot.is_some() || self.camera_frame.is_some()
    }
}

/// Camera-side analysis, present only when a camera frame was supplied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CameraAnalysis {
    pub person_present: bool,
    pub appears_focused: bool,
}

/// Verdict returned by the multimodal classification service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationVerdict {
    pub content_relevant: bool,
    pub camera: Option<CameraAnalysis>,
    pub confidence_level: f32,
}

impl ClassificationVerdict {
    /// Whether this verdict counts as a distraction: content judged
    /// irrelevant, nobody at the camera, or the person visibly unfocused.
    #[must_use]
    pub fn indicates_drift(&self) -> bool {
        if !self.content_relevant {
            return true;
        }
        match self.camera {
            Some(camera) => !camera.person_present || !camera.appears_focused,
            None => false,
        }
    }
}

/// Reply from the dialogue/LLM service for one user turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueReply {
    pub assistant_text: String,
    pub conversation_id: String,
}
