//! Grounded report generation and the raw-data fallback.

use super::prompts::{SUMMARY_FAILED_PREFIX, SUMMARY_SYSTEM_PROMPT};
use crate::error::{InferenceError, SummarizeError};
use crate::inference::{complete_text, strip_code_fence, ChatCompletion};
use crate::types::{
    ChatMessage, SignalStatus, SourceStatus, StepOutcome, ToolExecutionResult, ToolPlanStep,
};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

#[derive(Serialize)]
struct SummaryPayload<'a> {
    question: &'a str,
    plan: &'a [ToolPlanStep],
    tool_results: Vec<ToolResultView<'a>>,
    required_signals: &'a [SignalStatus],
}

#[derive(Serialize)]
struct ToolResultView<'a> {
    tool: &'a str,
    params: &'a Value,
    status: SourceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl<'a> From<&'a ToolExecutionResult> for ToolResultView<'a> {
    fn from(r: &'a ToolExecutionResult) -> Self {
        Self {
            tool: &r.step.tool,
            params: &r.step.params,
            status: if r.outcome.is_success() {
                SourceStatus::Success
            } else {
                SourceStatus::Error
            },
            result: r.outcome.output(),
            error: r.outcome.error(),
        }
    }
}

pub struct Summarizer {
    chat: Arc<dyn ChatCompletion>,
    max_tokens: u32,
}

impl Summarizer {
    pub fn new(chat: Arc<dyn ChatCompletion>, max_tokens: u32) -> Self {
        Self { chat, max_tokens }
    }

    /// Ask the model for a report over exactly the collected data.
    pub async fn summarize(
        &self,
        question: &str,
        plan: &[ToolPlanStep],
        results: &[ToolExecutionResult],
        signals: &[SignalStatus],
        deadline: Instant,
    ) -> Result<String, SummarizeError> {
        let payload = serde_json::to_string(&SummaryPayload {
            question,
            plan,
            tool_results: results.iter().map(ToolResultView::from).collect(),
            required_signals: signals,
        })?;
        debug!("Summary payload: {} bytes", payload.len());

        let messages = [
            ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
            ChatMessage::user(payload),
        ];
        let reply = complete_text(self.chat.as_ref(), &messages, self.max_tokens, deadline).await?;
        let report = strip_code_fence(&reply).trim();
        if report.is_empty() {
            return Err(InferenceError::EmptyContent.into());
        }
        Ok(report.to_string())
    }
}

/// Deterministic answer used when summarization fails: every step's params
/// and output or error, pretty-printed, after an explanation line.
pub fn raw_dump(results: &[ToolExecutionResult], reason: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} Reason: {}", SUMMARY_FAILED_PREFIX, reason);

    for (idx, result) in results.iter().enumerate() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## {}. {}", idx + 1, result.step.tool);
        let _ = writeln!(out, "params: {}", result.step.params);
        match &result.outcome {
            StepOutcome::Success { output } => {
                let body = serde_json::to_string_pretty(output).unwrap_or_else(|_| output.to_string());
                let _ = writeln!(out, "status: success");
                let _ = writeln!(out, "output:\n{}", body);
            }
            StepOutcome::Error { error } => {
                let _ = writeln!(out, "status: error");
                let _ = writeln!(out, "error: {}", error);
            }
        }
    }

    out.trim_end().to_string()
}
