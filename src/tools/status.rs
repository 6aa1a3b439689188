//! Server status counters and connection snapshot.

use super::{empty_schema, table_output, NoParams, Probe};
use crate::database::{column_str, value_text, Row, RowSource};
use crate::error::ToolError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Counters returned when no pattern or keys are given.
const KEY_COUNTERS: &[&str] = &[
    "Connections",
    "Max_used_connections",
    "Threads_connected",
    "Threads_running",
    "Queries",
    "Questions",
    "Com_select",
    "Com_insert",
    "Com_update",
    "Com_delete",
    "Bytes_received",
    "Bytes_sent",
    "Uptime",
    "Slow_queries",
];

const CONNECTION_COUNTERS: &[&str] = &[
    "Threads_connected",
    "Threads_running",
    "Max_used_connections",
    "Connections",
    "Connection_errors_max_connections",
];

fn status_in(names: &[&str]) -> String {
    let list = names
        .iter()
        .map(|n| format!("'{}'", n))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SHOW GLOBAL STATUS WHERE Variable_name IN ({})", list)
}

/// Quote a LIKE pattern for inline use; `%` and `_` stay wildcards.
fn quote_like(pattern: &str) -> String {
    format!("'{}'", pattern.replace('\\', "\\\\").replace('\'', "''"))
}

// ---------------------------------------------------------------------------
// show_status
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusParams {
    pub pattern: Option<String>,
    pub keys: Option<Vec<String>>,
}

pub struct ShowStatus {
    source: Arc<dyn RowSource>,
}

impl ShowStatus {
    pub fn new(source: Arc<dyn RowSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Probe for ShowStatus {
    type Params = StatusParams;

    fn name(&self) -> &str {
        "show_status"
    }

    fn description(&self) -> &str {
        "Run SHOW GLOBAL STATUS and return key server counters (Threads_running, \
         Connections, Queries, Slow_queries, Uptime...). Optional LIKE pattern or explicit key list."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "LIKE pattern for variable names, e.g. 'Innodb_row_lock%'"
                },
                "keys": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Exact variable names to return, in this order"
                }
            },
            "additionalProperties": false
        })
    }

    async fn run(&self, params: StatusParams) -> Result<Value, ToolError> {
        let pattern = params
            .pattern
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());
        let keys = normalize_keys(params.keys.as_deref().unwrap_or_default());

        let sql = match pattern {
            Some(p) => format!("SHOW GLOBAL STATUS LIKE {}", quote_like(p)),
            None if !keys.is_empty() => "SHOW GLOBAL STATUS".to_string(),
            None => status_in(KEY_COUNTERS),
        };

        let rows = self.source.fetch(&sql, &[]).await?;
        let rows = if keys.is_empty() {
            sorted_by_name(rows)
        } else {
            filter_keys(rows, &keys)
        };

        Ok(table_output("status_variables", rows))
    }
}

/// Lowercase, trimmed, de-duplicated keys in caller order.
fn normalize_keys(keys: &[String]) -> Vec<String> {
    let mut ordered: Vec<String> = Vec::with_capacity(keys.len());
    for key in keys {
        let k = key.trim().to_lowercase();
        if !k.is_empty() && !ordered.contains(&k) {
            ordered.push(k);
        }
    }
    ordered
}

fn variable_name(row: &Row) -> String {
    column_str(row, "variable_name")
        .unwrap_or_default()
        .to_lowercase()
}

fn filter_keys(rows: Vec<Row>, keys: &[String]) -> Vec<Row> {
    let mut picked: Vec<(usize, Row)> = rows
        .into_iter()
        .filter_map(|row| {
            let name = variable_name(&row);
            keys.iter().position(|k| *k == name).map(|idx| (idx, row))
        })
        .collect();
    picked.sort_by_key(|(idx, _)| *idx);
    picked.into_iter().map(|(_, row)| row).collect()
}

fn sorted_by_name(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort_by_key(variable_name);
    rows
}

// ---------------------------------------------------------------------------
// show_connections
// ---------------------------------------------------------------------------

pub struct ShowConnections {
    source: Arc<dyn RowSource>,
}

impl ShowConnections {
    pub fn new(source: Arc<dyn RowSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Probe for ShowConnections {
    type Params = NoParams;

    fn name(&self) -> &str {
        "show_connections"
    }

    fn description(&self) -> &str {
        "Snapshot of current connections: the process list plus connection counters \
         (Threads_connected, Threads_running, Max_used_connections, Connection_errors_max_connections)."
    }

    fn parameters_schema(&self) -> Value {
        empty_schema()
    }

    async fn run(&self, _params: NoParams) -> Result<Value, ToolError> {
        let processes = self.source.fetch("SHOW PROCESSLIST", &[]).await?;
        let counters = self
            .source
            .fetch(&status_in(CONNECTION_COUNTERS), &[])
            .await?;

        let mut stats = Map::new();
        for row in &counters {
            if let Some(name) = column_str(row, "variable_name") {
                let value = row.get("value").map(value_text).unwrap_or_default();
                stats.insert(name.to_string(), Value::String(value));
            }
        }

        Ok(json!({
            "total_active_processes": processes.len(),
            "active_connections": processes,
            "connection_statistics": stats,
        }))
    }
}
