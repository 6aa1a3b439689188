//! Question + catalog -> ordered tool plan.

use super::prompts::PLANNER_SYSTEM_PROMPT;
use crate::error::PlanError;
use crate::inference::{complete_text, decode_json_reply, truncate, ChatCompletion};
use crate::tools::ToolDefinition;
use crate::types::{ChatMessage, ToolPlanStep};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

#[derive(Serialize)]
struct PlanRequest<'a> {
    question: &'a str,
    tools: &'a [ToolDefinition],
}

#[derive(Deserialize)]
struct PlanReply {
    #[serde(default)]
    steps: Vec<ToolPlanStep>,
}

/// Model-driven planner. Errors are returned, never papered over; the caller
/// decides on the fallback.
pub struct Planner {
    chat: Arc<dyn ChatCompletion>,
    max_tokens: u32,
}

impl Planner {
    pub fn new(chat: Arc<dyn ChatCompletion>, max_tokens: u32) -> Self {
        Self { chat, max_tokens }
    }

    pub async fn plan(
        &self,
        question: &str,
        catalog: &[ToolDefinition],
        deadline: Instant,
    ) -> Result<Vec<ToolPlanStep>, PlanError> {
        let payload = serde_json::to_string(&PlanRequest {
            question,
            tools: catalog,
        })
        .map_err(PlanError::Encode)?;
        debug!("Planning payload: {} bytes", payload.len());

        let messages = [
            ChatMessage::system(PLANNER_SYSTEM_PROMPT),
            ChatMessage::user(payload),
        ];
        let reply = complete_text(self.chat.as_ref(), &messages, self.max_tokens, deadline).await?;
        debug!("Planner reply: {}", truncate(&reply, 256));

        let parsed: PlanReply = decode_json_reply(&reply).map_err(PlanError::Decode)?;
        Ok(normalize_plan(parsed.steps))
    }
}

/// Drop nameless steps, collapse duplicate tools onto their first occurrence
/// and trim the advisory text. Order is preserved.
pub fn normalize_plan(steps: Vec<ToolPlanStep>) -> Vec<ToolPlanStep> {
    let mut seen = HashSet::new();
    steps
        .into_iter()
        .filter_map(|mut step| {
            step.tool = step.tool.trim().to_string();
            if step.tool.is_empty() || !seen.insert(step.tool.clone()) {
                return None;
            }
            step.reason = step.reason.trim().to_string();
            if step.params.is_null() {
                step.params = json!({});
            }
            Some(step)
        })
        .collect()
}

/// The fixed fallback sequence, restricted to tools present in the catalog.
pub fn default_plan(catalog: &[ToolDefinition]) -> Vec<ToolPlanStep> {
    let fallback = [
        ("show_status", json!({}), "Baseline server status counters"),
        ("show_connections", json!({}), "Connection usage snapshot"),
        ("show_processlist", json!({"full": true}), "Currently running sessions"),
        ("slow_query_analysis", json!({"limit": 10}), "Top statements by total latency"),
    ];

    fallback
        .into_iter()
        .filter(|(tool, _, _)| catalog.iter().any(|def| def.name == *tool))
        .map(|(tool, params, reason)| ToolPlanStep::new(tool, params).with_reason(reason))
        .collect()
}
