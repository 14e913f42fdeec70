//! Request and response bodies of the `generateContent` REST call.

use serde::{Deserialize, Serialize};

/// A piece of content (only text parts are used)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f64,
    pub max_output_tokens: u32,
}

/// `POST models/{model}:generateContent` body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    pub fn single_turn(prompt: &str, config: GenerationConfig) -> Self {
        Self {
            contents: vec![Content::user(prompt)],
            generation_config: config,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, if it has any
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().map(|p| p.text.as_str()).collect();
        (!text.trim().is_empty()).then_some(text)
    }

    pub fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback.as_ref()?.block_reason.as_deref()
    }
}

/// Error envelope returned with non-2xx statuses
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serializes_camel_case() {
        let request = GenerateContentRequest::single_turn(
            "hello",
            GenerationConfig {
                temperature: 0.1,
                max_output_tokens: 256,
            },
        );
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn test_response_text_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"a\":"}, {"text": " 1}"}]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(response.text().as_deref(), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_blocked_prompt_has_no_text() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        assert!(response.text().is_none());
        assert_eq!(response.block_reason(), Some("SAFETY"));
    }
}
