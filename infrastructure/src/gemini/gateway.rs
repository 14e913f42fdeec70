//! Gemini generation gateway implementation

use super::protocol::{
    ErrorEnvelope, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
};
use crate::config::FileGenerationConfig;
use crate::http::{classify_status, classify_transport, user_agent};
use async_trait::async_trait;
use crew_application::GenerationService;
use crew_domain::ExternalFailure;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while building the gateway
#[derive(Error, Debug)]
pub enum GeminiError {
    #[error("Gemini API key is not configured")]
    MissingApiKey,

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// [`GenerationService`] backed by the Gemini `generateContent` REST API
pub struct GeminiGateway {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    generation: GenerationConfig,
}

impl GeminiGateway {
    pub fn from_config(config: &FileGenerationConfig) -> Result<Self, GeminiError> {
        let api_key = config.resolve_api_key().ok_or(GeminiError::MissingApiKey)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .user_agent(user_agent())
            .build()?;

        info!(model = %config.model, "Gemini gateway initialized");
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            generation: GenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
            },
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => {
            format!("{} {}", envelope.error.status, envelope.error.message)
                .trim()
                .to_string()
        }
        _ => crew_domain::truncate(body.trim(), 200),
    }
}

#[async_trait]
impl GenerationService for GeminiGateway {
    async fn generate(&self, prompt: &str) -> Result<String, ExternalFailure> {
        let body = GenerateContentRequest::single_turn(prompt, self.generation.clone());
        debug!(model = %self.model, bytes = prompt.len(), "Sending generateContent request");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| classify_transport(&e))?;
        if !status.is_success() {
            return Err(classify_status(status, &error_detail(&text)));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|e| ExternalFailure::terminal(format!("Malformed Gemini response: {}", e)))?;

        match parsed.text() {
            Some(output) => {
                debug!(model = %self.model, bytes = output.len(), "Received generation");
                Ok(output)
            }
            None => match parsed.block_reason() {
                Some(reason) => Err(ExternalFailure::terminal(format!(
                    "Prompt blocked by Gemini: {}",
                    reason
                ))),
                // Empty candidates without a block reason are usually transient overload
                None => Err(ExternalFailure::transient("Gemini returned no candidates")),
            },
        }
    }
}
