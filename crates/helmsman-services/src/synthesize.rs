use crate::error::ServiceError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

/// Text-to-speech boundary.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ServiceError>;
}

/// HTTP speech synthesis client.
pub struct HttpSynthesizer {
    client: Client,
    api_key: String,
    base_url: String,
    voice: String,
}

impl HttpSynthesizer {
    #[must_use]
    pub fn new(api_key: &str, base_url: &str, voice: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            voice: voice.to_string(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ServiceError> {
        let url = format!("{}/synthesize", self.base_url);

        let body = json!({
            "text": text,
            "voice": self.voice,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, body));
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(ServiceError::Malformed("empty audio stream".to_string()));
        }
        Ok(audio.to_vec())
    }
}
