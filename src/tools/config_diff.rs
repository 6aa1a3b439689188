//! Compare runtime variables and pool settings with the configured values.

use super::Probe;
use crate::config::MysqlConfig;
use crate::database::{column_str, value_text, PoolStats, RowSource};
use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

const DEFAULT_VARIABLES: &[&str] = &["character_set_server", "port"];

/// Configured values the diff is measured against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBaseline {
    pub host: String,
    pub port: u16,
    pub charset: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime_secs: u64,
}

impl From<&MysqlConfig> for ConfigBaseline {
    fn from(cfg: &MysqlConfig) -> Self {
        Self {
            host: cfg.host.clone(),
            port: cfg.port,
            charset: cfg.charset.clone(),
            max_connections: cfg.max_connections,
            min_connections: cfg.min_connections,
            max_lifetime_secs: cfg.max_lifetime_secs,
        }
    }
}

impl ConfigBaseline {
    fn value_for(&self, variable: &str) -> Option<String> {
        match variable {
            "character_set_server" | "character_set_database" => Some(self.charset.clone()),
            "port" => Some(self.port.to_string()),
            "host" | "hostname" => Some(self.host.clone()),
            _ => None,
        }
    }

    fn pool_items(&self, stats: &PoolStats) -> Vec<DiffItem> {
        let mut items = vec![
            DiffItem::compare(
                "connection_pool.max_connections",
                Some(self.max_connections.max(1).to_string()),
                Some(stats.max_connections.to_string()),
            ),
            DiffItem::compare(
                "connection_pool.min_connections",
                Some(self.min_connections.to_string()),
                Some(stats.min_connections.to_string()),
            ),
        ];
        if self.max_lifetime_secs > 0 {
            items.push(DiffItem::compare(
                "connection_pool.max_lifetime_secs",
                Some(self.max_lifetime_secs.to_string()),
                stats.max_lifetime_secs.map(|s| s.to_string()),
            ));
        }
        items
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffItem {
    pub parameter: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_value: Option<String>,
    #[serde(rename = "match")]
    pub matches: bool,
}

impl DiffItem {
    fn compare(parameter: &str, config: Option<String>, runtime: Option<String>) -> Self {
        let matches = match (&config, &runtime) {
            (Some(c), Some(r)) => c.eq_ignore_ascii_case(r),
            _ => false,
        };
        Self {
            parameter: parameter.to_string(),
            config_value: config,
            runtime_value: runtime,
            matches,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDiffParams {
    pub variables: Option<Vec<String>>,
}

pub struct ConfigDiff {
    source: Arc<dyn RowSource>,
    baseline: ConfigBaseline,
}

impl ConfigDiff {
    pub fn new(source: Arc<dyn RowSource>, baseline: ConfigBaseline) -> Self {
        Self { source, baseline }
    }
}

#[async_trait]
impl Probe for ConfigDiff {
    type Params = ConfigDiffParams;

    fn name(&self) -> &str {
        "config_diff"
    }

    fn description(&self) -> &str {
        "Read SHOW VARIABLES and compare with the configured charset, port and host, plus \
         connection pool settings (max/min connections, max lifetime) against the live pool."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "variables": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Runtime variables to compare, default character_set_server and port"
                }
            },
            "additionalProperties": false
        })
    }

    async fn run(&self, params: ConfigDiffParams) -> Result<Value, ToolError> {
        let rows = self.source.fetch("SHOW VARIABLES", &[]).await?;
        let runtime: HashMap<String, String> = rows
            .iter()
            .filter_map(|row| {
                let name = column_str(row, "variable_name")?.to_lowercase();
                let value = row.get("value").map(value_text).unwrap_or_default();
                Some((name, value))
            })
            .collect();

        let mut items = Vec::new();
        let mut missing = Vec::new();
        for name in requested_variables(params.variables.unwrap_or_default()) {
            let key = name.to_lowercase();
            let runtime_value = runtime.get(&key).filter(|v| !v.is_empty()).cloned();
            if runtime_value.is_none() {
                missing.push(name.clone());
            }
            items.push(DiffItem::compare(
                &name,
                self.baseline.value_for(&key),
                runtime_value,
            ));
        }

        if let Some(stats) = self.source.pool_stats() {
            items.extend(self.baseline.pool_items(&stats));
        }

        Ok(json!({ "items": items, "missing": missing }))
    }
}

/// Trimmed, case-insensitively de-duplicated names; the defaults when none remain.
fn requested_variables(raw: Vec<String>) -> Vec<String> {
    let mut seen = Vec::new();
    let mut cleaned = Vec::new();
    for name in raw {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let lower = name.to_lowercase();
        if seen.contains(&lower) {
            continue;
        }
        seen.push(lower);
        cleaned.push(name.to_string());
    }
    if cleaned.is_empty() {
        DEFAULT_VARIABLES.iter().map(|s| s.to_string()).collect()
    } else {
        cleaned
    }
}
