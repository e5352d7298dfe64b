use crate::error::ServiceError;
use crate::types::{ConversationTurn, DistractionEvent};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Persistence collaborator for finalized records.
///
/// Fire-and-forget from the core's perspective: callers log a failed write
/// and move on; a dropped record never affects in-memory state.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record_distraction(&self, event: &DistractionEvent) -> Result<(), ServiceError>;

    async fn record_turn(&self, turn: &ConversationTurn) -> Result<(), ServiceError>;
}

/// Append-only JSON-lines sink, one file per record kind under the data
/// directory.
pub struct JsonlEventSink {
    distractions_path: PathBuf,
    turns_path: PathBuf,
}

impl JsonlEventSink {
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            distractions_path: data_dir.join("distractions.jsonl"),
            turns_path: data_dir.join("turns.jsonl"),
        }
    }

    async fn append(path: &Path, line: String) -> Result<(), ServiceError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ServiceError::Transient(e.to_string()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| ServiceError::Transient(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| ServiceError::Transient(e.to_string()))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| ServiceError::Transient(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl EventSink for JsonlEventSink {
    async fn record_distraction(&self, event: &DistractionEvent) -> Result<(), ServiceError> {
        let line = serde_json::to_string(event)
            .map_err(|e| ServiceError::Malformed(e.to_string()))?;
        Self::append(&self.distractions_path, line).await
    }

    async fn record_turn(&self, turn: &ConversationTurn) -> Result<(), ServiceError> {
        let line =
            serde_json::to_string(turn).map_err(|e| ServiceError::Malformed(e.to_string()))?;
        Self::append(&self.turns_path, line).await
    }
}

/// Sink that drops every record. Useful in tests and when analytics are
/// switched off.
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn record_distraction(&self, _event: &DistractionEvent) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn record_turn(&self, _turn: &ConversationTurn) -> Result<(), ServiceError> {
        Ok(())
    }
}
