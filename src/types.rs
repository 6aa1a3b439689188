//! Shared types used across the diagnostic agent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// One planned tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPlanStep {
    /// Catalog name of the tool to run.
    #[serde(default, alias = "name")]
    pub tool: String,
    /// Why the planner picked this tool. Advisory only.
    #[serde(default)]
    pub reason: String,
    /// Raw tool parameters; decoded by the tool itself before it runs.
    #[serde(default = "empty_params", alias = "args")]
    pub params: serde_json::Value,
}

fn empty_params() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl ToolPlanStep {
    pub fn new(tool: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            reason: String::new(),
            params,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}

/// Where the plan that was executed came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanOrigin {
    /// Supplied by the caller in the request.
    Caller,
    /// Produced by the language-model planner.
    Model,
    /// The fixed fallback sequence.
    Default,
}

impl fmt::Display for PlanOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caller => write!(f, "caller"),
            Self::Model => write!(f, "model"),
            Self::Default => write!(f, "default"),
        }
    }
}

// ---------------------------------------------------------------------------
// Execution results
// ---------------------------------------------------------------------------

/// Outcome of a single step: exactly one of output or error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Success { output: serde_json::Value },
    Error { error: String },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn output(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Success { output } => Some(output),
            Self::Error { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Error { error } => Some(error),
        }
    }
}

/// Record of one executed plan step. Created once by the executor, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    pub step: ToolPlanStep,
    /// Catalog description of the tool, empty when the tool is not registered.
    pub description: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// Signal completeness
// ---------------------------------------------------------------------------

/// An operationally required diagnostic signal and the tool that provides it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredSignal {
    pub key: String,
    pub name: String,
    pub tool: String,
}

impl RequiredSignal {
    pub fn new(key: &str, name: &str, tool: &str) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            tool: tool.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalState {
    Collected,
    Error,
    NotCollected,
    Unsupported,
}

impl fmt::Display for SignalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collected => write!(f, "collected"),
            Self::Error => write!(f, "error"),
            Self::NotCollected => write!(f, "not_collected"),
            Self::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Derived completeness status of one required signal for one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalStatus {
    pub key: String,
    pub name: String,
    pub tool: String,
    pub status: SignalState,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

// ---------------------------------------------------------------------------
// Remote boundary
// ---------------------------------------------------------------------------

/// Request accepted by `Agent.Query`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Optional pre-built plan that bypasses the planner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolPlanStep>>,
    /// Optional per-request deadline override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Success,
    Error,
}

/// Per-step status summary returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub tool: String,
    pub description: String,
    pub status: SourceStatus,
    pub params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// One raw execution entry under `raw[tool]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntry {
    pub params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response of `Agent.Query`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<SourceSummary>,
    #[serde(default)]
    pub raw: BTreeMap<String, Vec<RawEntry>>,
}

// ---------------------------------------------------------------------------
// Inference types
// ---------------------------------------------------------------------------

/// A chat message sent to the completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// Completion returned by the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub content: Option<String>,
    pub usage: TokenUsage,
}

/// Token usage from an inference call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
