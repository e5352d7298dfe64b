use crate::error::ServiceError;
use async_trait::async_trait;

/// Audio playback boundary. `play` resolves when playback completes, which
/// is the transition edge the dialogue state machine keys on.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    async fn play(&self, audio: &[u8]) -> Result<(), ServiceError>;
}

/// Headless playback sink: logs and completes immediately. Used by the CLI
/// when no audio output is wired up.
#[derive(Debug, Default)]
pub struct LogPlayback;

#[async_trait]
impl PlaybackSink for LogPlayback {
    async fn play(&self, audio: &[u8]) -> Result<(), ServiceError> {
        log::info!("playback: {} bytes (no audio output configured)", audio.len());
        Ok(())
    }
}
