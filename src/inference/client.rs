//! Chat completion over an OpenAI-compatible API (DeepSeek by default).

use super::ChatCompletion;
use crate::config::InferenceConfig;
use crate::error::InferenceError;
use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Inference client wrapping the chat-completion endpoint.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    http: reqwest::Client,
}

// -- OpenAI-compatible request/response types --------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<MessagePayload<'a>>,
    max_tokens: u32,
    temperature: f64,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct MessagePayload<'a> {
    role: ChatRole,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsagePayload {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl InferenceClient {
    /// Create a new inference client. Fails when no API key is configured.
    pub fn new(cfg: &InferenceConfig) -> Result<Self, InferenceError> {
        if cfg.api_key.trim().is_empty() {
            return Err(InferenceError::MissingApiKey);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.trim().to_string(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            http,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatCompletion for InferenceClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<InferenceResponse, InferenceError> {
        let url = format!("{}/chat/completions", self.base_url);
        let start = Instant::now();

        let request = ChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| MessagePayload {
                    role: m.role,
                    content: &m.content,
                })
                .collect(),
            max_tokens,
            temperature: self.temperature,
            stream: false,
        };

        debug!("Inference request to model: {}", self.model);

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Inference api_error status={} body={}", status, body);
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatResponse = resp.json().await?;
        debug!(
            "Inference duration={:?} choices={}",
            start.elapsed(),
            body.choices.len()
        );

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or(InferenceError::EmptyChoices)?;

        let usage = body
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(InferenceResponse {
            content: choice.message.content,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_rejected() {
        let cfg = InferenceConfig::default();
        assert!(matches!(
            InferenceClient::new(&cfg),
            Err(InferenceError::MissingApiKey)
        ));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let cfg = InferenceConfig {
            api_key: "sk-test".into(),
            base_url: "https://api.deepseek.com/".into(),
            ..InferenceConfig::default()
        };
        let client = InferenceClient::new(&cfg).unwrap();
        assert_eq!(client.base_url, "https://api.deepseek.com");
        assert_eq!(client.model(), "deepseek-chat");
    }

    #[test]
    fn request_serializes_roles_lowercase() {
        let messages = [ChatMessage::system("rules"), ChatMessage::user("why slow?")];
        let request = ChatRequest {
            model: "deepseek-chat",
            messages: messages
                .iter()
                .map(|m| MessagePayload {
                    role: m.role,
                    content: &m.content,
                })
                .collect(),
            max_tokens: 16,
            temperature: 0.0,
            stream: false,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "why slow?");
    }
}
