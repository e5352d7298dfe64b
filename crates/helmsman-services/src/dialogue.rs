use crate::error::ServiceError;
use crate::types::{ConversationTurn, DialogueReply, DriftContext};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

/// Dialogue/LLM boundary: produces the coaching reply for one user turn.
#[async_trait]
pub trait DialogueService: Send + Sync {
    async fn converse(
        &self,
        history: &[ConversationTurn],
        user_text: &str,
        context: &DriftContext,
    ) -> Result<DialogueReply, ServiceError>;
}

/// HTTP dialogue client.
pub struct HttpDialogue {
    client: Client,
    api_key: String,
    base_url: String,
}

impl HttpDialogue {
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
impl DialogueService for HttpDialogue {
    async fn converse(
        &self,
        history: &[ConversationTurn],
        user_text: &str,
        context: &DriftContext,
    ) -> Result<DialogueReply, ServiceError> {
        let url = format!("{}/converse", self.base_url);

        let body = json!({
            "history": history,
            "message": user_text,
            "drift_context": context,
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

        let json: serde_json::Value = response.json().await?;
        let assistant_text = json["assistant_text"]
            .as_str()
            .ok_or_else(|| ServiceError::Malformed("missing 'assistant_text'".to_string()))?
            .to_string();
        let conversation_id = json["conversation_id"]
            .as_str()
            .ok_or_else(|| ServiceError::Malformed("missing 'conversation_id'".to_string()))?
            .to_string();

        Ok(DialogueReply {
            assistant_text,
            conversation_id,
        })
    }
}
