use async_trait::async_trait;
use reqwest::{Client, Error as ReqwestError};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug)]
pub enum OpenAiError {
    Http(ReqwestError),
    Serialization(serde_json::Error),
    Timeout,
    Status(u16),
    InvalidResponse(String),
}

impl From<ReqwestError> for OpenAiError {
    fn from(error: ReqwestError) -> Self {
        if error.is_timeout() {
            OpenAiError::Timeout
        } else {
            OpenAiError::Http(error)
        }
    }
}

impl From<serde_json::Error> for OpenAiError {
    fn from(error: serde_json::Error) -> Self {
        OpenAiError::Serialization(error)
    }
}

/// Fixed system instruction sent with every summarization request.
pub const ANALYST_PERSONA: &str =
    "You are a stock market analyst. Write a short financial summary based on the provided data.";

/// Text-generation collaborator seam. The production implementation is
/// [`OpenAiClient`]; report pipeline tests substitute fakes.
#[async_trait]
pub trait TextGeneration {
    /// Sends the serialized price series for summarization and returns the
    /// upstream reply as raw JSON for the normalizer.
    async fn summarize(&self, series_text: &str) -> Result<Value, OpenAiError>;
}

pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(
        api_key: String,
        model: String,
        max_tokens: u32,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, OpenAiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(OpenAiClient {
            client,
            base_url: "https://api.openai.com".to_string(),
            api_key,
            model,
            max_tokens,
            temperature,
        })
    }
}

#[async_trait]
impl TextGeneration for OpenAiClient {
    async fn summarize(&self, series_text: &str) -> Result<Value, OpenAiError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let payload = build_payload(&self.model, self.max_tokens, self.temperature, series_text);

        tracing::debug!(model = %self.model, content_bytes = series_text.len(), "Requesting summary");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(OpenAiError::Status(status.as_u16()));
        }

        let body = response.json::<Value>().await?;
        extract_content(&body)
    }
}

pub fn build_payload(model: &str, max_tokens: u32, temperature: f32, series_text: &str) -> Value {
    serde_json::json!({
        "model": model,
        "messages": [
            {"role": "system", "content": ANALYST_PERSONA},
            {"role": "user", "content": series_text}
        ],
        "max_tokens": max_tokens,
        "temperature": temperature
    })
}

/// Pulls the first choice's message content out of the completion envelope.
pub fn extract_content(body: &Value) -> Result<Value, OpenAiError> {
    body.get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .cloned()
        .ok_or_else(|| OpenAiError::InvalidResponse("Missing choices[0].message.content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_openai_client_creation() {
        let client = OpenAiClient::new(
            "test-key".to_string(),
            "gpt-4".to_string(),
            150,
            0.7,
            Duration::from_secs(10),
        );
        assert!(client.is_ok());
    }

    #[test]
    fn test_payload_carries_persona_and_series() {
        let payload = build_payload("gpt-4", 150, 0.7, "[{\"close\":1.0}]");
        assert_eq!(payload["model"], "gpt-4");
        assert_eq!(payload["max_tokens"], 150);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][0]["content"], ANALYST_PERSONA);
        assert_eq!(payload["messages"][1]["role"], "user");
        assert_eq!(payload["messages"][1]["content"], "[{\"close\":1.0}]");
    }

    #[test]
    fn test_extract_content_from_completion() {
        let body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Outlook is positive."}}]
        });
        assert_eq!(extract_content(&body).unwrap(), "Outlook is positive.");
    }

    #[test]
    fn test_extract_content_missing_choices() {
        let body = serde_json::json!({"error": {"message": "bad request"}});
        assert!(matches!(extract_content(&body), Err(OpenAiError::InvalidResponse(_))));
    }
}
