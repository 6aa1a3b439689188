//! Error taxonomy for the diagnostic pipeline.
//!
//! Every per-query error is recovered or recorded somewhere in the response.
//! Only [`InitError`] escapes the service facade.

use thiserror::Error;

/// Failure reported by the database driver.
#[derive(Debug, Clone, Error)]
pub enum DbError {
    /// Error returned by the MySQL server, with its numeric error code.
    #[error("mysql error {code}: {message}")]
    Server { code: u16, message: String },

    /// Connection, protocol or decoding failure.
    #[error("database driver error: {0}")]
    Driver(String),

    /// The pool could not hand out a connection (timed out or closed).
    #[error("no database connection available")]
    Unavailable,
}

impl DbError {
    fn code(&self) -> Option<u16> {
        match self {
            Self::Server { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Result set too large for the full variant of a statement.
    pub fn is_packet_overflow(&self) -> bool {
        if matches!(self.code(), Some(2020 | 2027 | 2028)) {
            return true;
        }
        let msg = self.to_string().to_lowercase();
        ["too much", "too many", "max_allowed_packet", "data too long"]
            .iter()
            .any(|needle| msg.contains(needle))
    }

    /// Statement not understood by this server version.
    pub fn is_syntax_error(&self) -> bool {
        self.code() == Some(1064) || self.to_string().to_lowercase().contains("syntax")
    }
}

/// Failure of a single tool invocation.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("tool not registered: {0}")]
    NotRegistered(String),

    #[error("invalid parameters for {tool}: {message}")]
    InvalidParams { tool: String, message: String },

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("request deadline exceeded before {0} completed")]
    DeadlineExceeded(String),
}

/// Failure talking to the chat-completion endpoint.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference API key is not configured")]
    MissingApiKey,

    #[error("inference request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("inference failed ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("inference returned no choices")]
    EmptyChoices,

    #[error("inference returned empty content")]
    EmptyContent,

    #[error("inference deadline exceeded")]
    Timeout,
}

/// The planner could not produce a plan. Recovered by the default plan.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("planning request failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("failed to encode planning payload: {0}")]
    Encode(serde_json::Error),

    #[error("failed to parse planner reply: {0}")]
    Decode(serde_json::Error),
}

/// The summarizer could not produce a report. Recovered by the raw dump.
#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("summarization request failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("failed to encode summarization payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Fatal, cached failure to build the runtime (tool registry or model client).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("failed to create inference client: {0}")]
    Inference(String),

    #[error("failed to register tools: {0}")]
    Tools(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_overflow_by_code_or_message() {
        let by_code = DbError::Server {
            code: 2020,
            message: "Got packet bigger than 'max_allowed_packet' bytes".into(),
        };
        assert!(by_code.is_packet_overflow());

        let by_message = DbError::Driver("Data too long for column".into());
        assert!(by_message.is_packet_overflow());

        let other = DbError::Server {
            code: 1045,
            message: "Access denied".into(),
        };
        assert!(!other.is_packet_overflow());
    }

    #[test]
    fn syntax_error_detection() {
        let err = DbError::Server {
            code: 1064,
            message: "You have an error in your SQL".into(),
        };
        assert!(err.is_syntax_error());
        assert!(!DbError::Unavailable.is_syntax_error());
    }
}
