//! Hosted generative-text completion.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait TextCompletion: Send + Sync {
    /// Send a prompt and return the generated text verbatim
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Client for a Gemini-style `generateContent` endpoint
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(endpoint: &str, model: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("guardian-backend/0.1")
            .timeout(timeout)
            .build()
            .context("Failed to build completion HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl TextCompletion for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!("Sending {} character prompt to {}", prompt.len(), self.model);

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .context("Completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("Completion endpoint returned {}: {}", status, detail));
        }

        let parsed: GenerateResponse = response.json().await.context("Invalid completion response")?;
        extract_text(parsed).ok_or_else(|| anyhow!("Completion response contained no text"))
    }
}

fn extract_text(response: GenerateResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_joins_parts_of_first_candidate() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Heart rate "},{"text":"was stable."}]}},
                              {"content":{"parts":[{"text":"ignored"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response).as_deref(), Some("Heart rate was stable."));
    }

    #[test]
    fn test_extract_text_handles_empty_response() {
        let response: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(extract_text(response).is_none());
        let blocked: GenerateResponse = serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert!(extract_text(blocked).is_none());
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let client = GeminiClient::new("https://example.test/v1beta/", "gemini-2.5-flash", "k", Duration::from_secs(5)).unwrap();
        assert_eq!(client.url(), "https://example.test/v1beta/models/gemini-2.5-flash:generateContent");
    }
}
