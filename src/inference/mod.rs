//! Language-model access: the completion seam, the HTTP client and reply sanitization.

pub mod client;
pub mod sanitize;

pub use client::InferenceClient;
pub use sanitize::{decode_json_reply, strip_code_fence, truncate};

use crate::error::InferenceError;
use crate::types::{ChatMessage, InferenceResponse};
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

/// A chat-completion backend.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<InferenceResponse, InferenceError>;
}

/// Run one completion under the request deadline and return its non-empty text.
pub async fn complete_text(
    chat: &dyn ChatCompletion,
    messages: &[ChatMessage],
    max_tokens: u32,
    deadline: Instant,
) -> Result<String, InferenceError> {
    let response = tokio::time::timeout_at(deadline, chat.chat(messages, max_tokens))
        .await
        .map_err(|_| InferenceError::Timeout)??;

    debug!("Completion used {} tokens", response.usage.total_tokens);
    match response.content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(InferenceError::EmptyContent),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn blank_content_is_an_error() {
        let chat = ScriptedChat::new(vec![Reply::Text("   ".into())]);
        let deadline = Instant::now() + Duration::from_secs(5);
        let err = complete_text(&chat, &[ChatMessage::user("hi")], 16, deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::EmptyContent));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_hanging_call() {
        let chat = ScriptedChat::new(vec![Reply::Hang]);
        let deadline = Instant::now() + Duration::from_secs(1);
        let err = complete_text(&chat, &[ChatMessage::user("hi")], 16, deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Timeout));
    }
}
