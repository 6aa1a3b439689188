//! Tool traits.
//!
//! [`Tool`] is the object-safe surface the registry and executor use.
//! [`Probe`] is what concrete diagnostics implement: it declares a typed
//! parameter struct, and the blanket [`Tool`] impl decodes raw JSON into it
//! before the probe ever runs.

use crate::error::ToolError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Definition of a tool exposed to the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A registered, executable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Catalog metadata.
    fn definition(&self) -> ToolDefinition;

    /// Decode `params` and run.
    async fn execute(&self, params: &Value) -> Result<Value, ToolError>;
}

/// A read-only diagnostic with typed parameters.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    /// Parameter struct. Should reject unknown fields.
    type Params: DeserializeOwned + Send;

    /// Tool name (catalog key).
    fn name(&self) -> &str;

    /// Human-readable description shown to the planner.
    fn description(&self) -> &str;

    /// JSON Schema for [`Self::Params`].
    fn parameters_schema(&self) -> Value;

    async fn run(&self, params: Self::Params) -> Result<Value, ToolError>;
}

#[async_trait]
impl<P: Probe> Tool for P {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }

    async fn execute(&self, params: &Value) -> Result<Value, ToolError> {
        let typed = decode_params::<P::Params>(self.name(), params)?;
        self.run(typed).await
    }
}

/// Parameters for probes that take none.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoParams {}

/// Decode raw parameters; `null` counts as an empty object.
pub fn decode_params<T: DeserializeOwned>(tool: &str, params: &Value) -> Result<T, ToolError> {
    let value = match params {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(value).map_err(|e| ToolError::InvalidParams {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// Schema for a parameterless tool.
pub fn empty_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    })
}
