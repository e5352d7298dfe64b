use crate::error::ServiceError;
use crate::types::{CameraAnalysis, ClassificationRequest, ClassificationVerdict};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use reqwest::Client;
use serde_json::json;

/// Multimodal classification boundary: judges captured screen/camera
/// artifacts against the session goal.
#[async_trait]
pub trait MultimodalClassifier: Send + Sync {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationVerdict, ServiceError>;
}

/// HTTP multimodal classification client. Frames travel as base64 inside a
/// JSON body; the model behind the endpoint is an opaque collaborator.
pub struct HttpClassifier {
    client: Client,
    api_key: String,
    base_url: String,
}

impl HttpClassifier {
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
impl MultimodalClassifier for HttpClassifier {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationVerdict, ServiceError> {
        let url = format!("{}/classify", self.base_url);

        let body = json!({
            "screenshot": request.screenshot.as_deref().map(|b| BASE64_STANDARD.encode(b)),
            "camera_frame": request.camera_frame.as_deref().map(|b| BASE64_STANDARD.encode(b)),
            "goal_text": request.goal_text,
            "related_contexts": request.related_contexts,
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
        let content_relevant = json["content_relevant"]
            .as_bool()
            .ok_or_else(|| ServiceError::Malformed("missing 'content_relevant'".to_string()))?;

        let camera = json.get("camera_analysis").and_then(|c| {
            Some(CameraAnalysis {
                person_present: c["person_present"].as_bool()?,
                appears_focused: c["appears_focused"].as_bool()?,
            })
        });

        Ok(ClassificationVerdict {
            content_relevant,
            camera,
            confidence_level: json["confidence_level"].as_f64().unwrap_or(0.0) as f32,
        })
    }
}
