//! Turn-based voice intervention dialogue.
//!
//! Triggered when the drift aggregator reports sustained distraction, this
//! crate runs the capture → transcribe → respond → synthesize → playback
//! cycle as one owned state machine. All external triggers are messages
//! into the controller's run loop; cancellation aborts in-flight service
//! calls and releases the microphone on every exit path.

pub mod controller;
pub mod turn;

pub use controller::{
    spawn, DialogueCommand, DialogueHandle, DialogueServices, DialogueState, InterventionConfig,
    InterventionController,
};
pub use turn::DialogueSession;
