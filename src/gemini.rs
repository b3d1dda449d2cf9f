use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument};

use crate::constants;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to reach the model API: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model API request failed with status {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("model returned no text")]
    EmptyResponse,
}

/// Answer text together with the provider's response, for debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub raw: Option<String>,
}

/// A hosted model that turns one prompt into one completion.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, api_key: &str, prompt: &str) -> Result<String, ModelError>;

    /// Like [`generate`](Self::generate), keeping the raw response when the provider exposes one.
    async fn complete(&self, api_key: &str, prompt: &str) -> Result<Completion, ModelError> {
        let text = self.generate(api_key, prompt).await?;
        Ok(Completion { text, raw: None })
    }
}

// Structures matching Gemini's models/{model}:generateContent endpoint
#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    model_version: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().filter_map(|part| part.text.as_deref()).collect();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self, ModelError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    /// Client pointed at the configured Gemini endpoint and model.
    pub fn from_env() -> Result<Self, ModelError> {
        Self::new(
            constants::GEMINI_API_BASE.clone(),
            constants::KALORIN_MODEL.clone(),
            Duration::from_secs(*constants::KALORIN_TIMEOUT_SECS),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, api_key: &str, prompt: &str) -> Result<String, ModelError> {
        self.complete(api_key, prompt).await.map(|completion| completion.text)
    }

    #[instrument(skip(self, api_key, prompt), fields(model = %self.model))]
    async fn complete(&self, api_key: &str, prompt: &str) -> Result<Completion, ModelError> {
        let url = self.endpoint();
        let payload = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![TextPart { text: prompt }],
            }],
        };

        debug!(%url, prompt_chars = prompt.chars().count(), "Sending generateContent request");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %body, "Gemini API request failed");
            return Err(ModelError::Api { status, body });
        }

        let parsed = response.json::<GenerateContentResponse>().await?;
        debug!(
            model_version = ?parsed.model_version,
            finish_reason = ?parsed.candidates.first().and_then(|c| c.finish_reason.as_deref()),
            "Received Gemini response"
        );
        let text = parsed.text().ok_or(ModelError::EmptyResponse)?;
        Ok(Completion {
            text,
            raw: Some(format!("{parsed:#?}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let payload = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![TextPart { text: "こんにちは" }],
            }],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({"contents": [{"parts": [{"text": "こんにちは"}]}]}));
    }

    #[test]
    fn test_response_joins_parts_of_first_candidate() {
        let raw = r#"{
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": " 食べても "}, {"text": "いいよ♪\n"}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.text().as_deref(), Some("食べても いいよ♪"));
    }

    #[test]
    fn test_response_without_text_is_empty() {
        for raw in [
            r#"{}"#,
            r#"{"candidates": []}"#,
            r#"{"candidates": [{"finishReason": "SAFETY"}]}"#,
            r#"{"candidates": [{"content": {"parts": [{"text": "  "}]}}]}"#,
        ] {
            let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
            assert!(parsed.text().is_none(), "{raw}");
        }
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let client = GeminiClient::new("http://localhost:1234/", "gemini-2.0-flash-lite", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.endpoint(),
            "http://localhost:1234/v1beta/models/gemini-2.0-flash-lite:generateContent"
        );
    }
}
