//! `schema_stats`: table sizes for one schema from `information_schema.tables`.

use super::Probe;
use crate::database::{RowSource, SqlArg};
use crate::error::ToolError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::Arc;

const TABLES_SQL: &str = "SELECT TABLE_SCHEMA AS table_schema, TABLE_NAME AS table_name, \
ENGINE AS engine, TABLE_ROWS AS table_rows, DATA_LENGTH AS data_length, \
INDEX_LENGTH AS index_length, DATA_LENGTH + INDEX_LENGTH AS total_length, \
AUTO_INCREMENT AS auto_increment, CAST(UPDATE_TIME AS CHAR) AS update_time \
FROM information_schema.tables \
WHERE TABLE_SCHEMA = ? \
ORDER BY total_length DESC";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaStatsParams {
    pub schema: Option<String>,
    pub limit: Option<NonZeroU32>,
}

pub struct SchemaStats {
    source: Arc<dyn RowSource>,
    default_schema: String,
}

impl SchemaStats {
    pub fn new(source: Arc<dyn RowSource>, default_schema: impl Into<String>) -> Self {
        Self {
            source,
            default_schema: default_schema.into(),
        }
    }
}

#[async_trait]
impl Probe for SchemaStats {
    type Params = SchemaStatsParams;

    fn name(&self) -> &str {
        "schema_stats"
    }

    fn description(&self) -> &str {
        "Table sizes from information_schema.tables (rows, data, index and total length), largest first. \
         Defaults to the configured database."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "schema": {
                    "type": "string",
                    "description": "Database name, defaults to the configured one"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum tables to return"
                }
            },
            "additionalProperties": false
        })
    }

    async fn run(&self, params: SchemaStatsParams) -> Result<Value, ToolError> {
        let schema = params
            .schema
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.default_schema)
            .to_string();
        if schema.is_empty() {
            return Err(ToolError::InvalidParams {
                tool: self.name().to_string(),
                message: "no schema given and no default database configured".into(),
            });
        }

        let mut sql = TABLES_SQL.to_string();
        if let Some(limit) = params.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let tables = self
            .source
            .fetch(&sql, &[SqlArg::Text(schema.clone())])
            .await?;

        Ok(json!({
            "schema": schema,
            "total_count": tables.len(),
            "tables": tables,
        }))
    }
}
