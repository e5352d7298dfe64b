use crate::error::ServiceError;
use crate::types::Transcript;
use async_trait::async_trait;
use reqwest::Client;

/// Speech-to-text boundary.
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    /// Transcribe one finalized audio buffer. `NoSpeech` is the recoverable
    /// "nothing was said" outcome.
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcript, ServiceError>;
}

/// HTTP transcription client.
pub struct HttpTranscriber {
    client: Client,
    api_key: String,
    base_url: String,
}

impl HttpTranscriber {
    #[must_use]
    pub fn new(api_key: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TranscriptionService for HttpTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcript, ServiceError> {
        let url = format!("{}/transcribe", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/octet-stream")
            .body(audio.to_vec())
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            return Err(ServiceError::NoSpeech);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, body));
        }

        let json: serde_json::Value = response.json().await?;
        let text = json["text"]
            .as_str()
            .ok_or_else(|| ServiceError::Malformed("missing 'text' field".to_string()))?
            .to_string();
        if text.trim().is_empty() {
            return Err(ServiceError::NoSpeech);
        }
        let confidence = json["confidence"].as_f64().unwrap_or(0.0) as f32;

        Ok(Transcript { text, confidence })
    }
}
