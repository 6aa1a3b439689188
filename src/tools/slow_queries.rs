//! Statement digest analysis from performance_schema.

use super::{table_output, Probe};
use crate::database::{Row, RowSource, SqlArg};
use crate::error::ToolError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::Arc;

const DEFAULT_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 100;

/// Timers in performance_schema are picoseconds.
const DIGEST_SQL: &str = "SELECT DIGEST_TEXT AS query_text, SCHEMA_NAME AS schema_name, \
COUNT_STAR AS exec_count, \
SUM_TIMER_WAIT / 1000000000000 AS total_time_seconds, \
AVG_TIMER_WAIT / 1000000000000 AS avg_time_seconds, \
MAX_TIMER_WAIT / 1000000000000 AS max_time_seconds, \
SUM_LOCK_TIME / 1000000000000 AS total_lock_time_seconds, \
SUM_ROWS_EXAMINED AS rows_examined, SUM_ROWS_SENT AS rows_sent, \
SUM_ERRORS AS errors, SUM_WARNINGS AS warnings, \
CAST(FIRST_SEEN AS CHAR) AS first_seen, CAST(LAST_SEEN AS CHAR) AS last_seen \
FROM performance_schema.events_statements_summary_by_digest \
WHERE DIGEST_TEXT IS NOT NULL";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlowQueryParams {
    pub limit: Option<NonZeroU32>,
    pub schema: Option<String>,
}

pub struct SlowQueryAnalysis {
    source: Arc<dyn RowSource>,
}

impl SlowQueryAnalysis {
    pub fn new(source: Arc<dyn RowSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Probe for SlowQueryAnalysis {
    type Params = SlowQueryParams;

    fn name(&self) -> &str {
        "slow_query_analysis"
    }

    fn description(&self) -> &str {
        "Top statements from performance_schema.events_statements_summary_by_digest ordered by \
         total latency (SUM_TIMER_WAIT), with execution counts, latencies in seconds, lock time and rows examined."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_LIMIT,
                    "description": "Number of digests to return, default 10"
                },
                "schema": {
                    "type": "string",
                    "description": "Only digests executed in this schema"
                }
            },
            "additionalProperties": false
        })
    }

    async fn run(&self, params: SlowQueryParams) -> Result<Value, ToolError> {
        let limit = params
            .limit
            .map_or(DEFAULT_LIMIT, NonZeroU32::get)
            .min(MAX_LIMIT);

        let mut sql = DIGEST_SQL.to_string();
        let mut args = Vec::new();
        if let Some(schema) = params.schema.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            sql.push_str(" AND LOWER(SCHEMA_NAME) = LOWER(?)");
            args.push(SqlArg::Text(schema.to_string()));
        }
        sql.push_str(" ORDER BY SUM_TIMER_WAIT DESC LIMIT ?");
        args.push(SqlArg::Int(i64::from(limit)));

        let rows = self.source.fetch(&sql, &args).await?;
        let rows = rows.into_iter().map(numeric_seconds).collect();
        Ok(table_output("slow_queries", rows))
    }
}

/// DECIMAL results arrive as strings; turn the `*_seconds` columns into numbers.
fn numeric_seconds(mut row: Row) -> Row {
    for (column, value) in row.iter_mut() {
        if !column.ends_with("_seconds") {
            continue;
        }
        if let Some(n) = value
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .and_then(serde_json::Number::from_f64)
        {
            *value = Value::Number(n);
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::testing::{row, FakeSource};
    use crate::tools::Tool;

    #[tokio::test]
    async fn default_limit_and_numeric_latencies() {
        let source = Arc::new(FakeSource::new(|_, _| {
            Ok(vec![row(&[
                ("query_text", json!("SELECT * FROM orders WHERE id = ?")),
                ("avg_time_seconds", json!("1.250000")),
                ("exec_count", json!(40)),
            ])])
        }));
        let tool = SlowQueryAnalysis::new(source.clone());

        let out = tool.execute(&json!({})).await.unwrap();
        assert_eq!(out["total_count"], 1);
        assert_eq!(out["slow_queries"][0]["avg_time_seconds"], json!(1.25));
        assert_eq!(out["slow_queries"][0]["exec_count"], 40);

        let calls = source.calls.lock().unwrap();
        assert_eq!(calls[0].1, vec![SqlArg::Int(10)]);
        assert!(calls[0].0.ends_with("ORDER BY SUM_TIMER_WAIT DESC LIMIT ?"));
    }

    #[tokio::test]
    async fn schema_filter_is_bound_and_limit_capped() {
        let source = Arc::new(FakeSource::new(|_, _| Ok(Vec::new())));
        let tool = SlowQueryAnalysis::new(source.clone());

        tool.execute(&json!({"limit": 500, "schema": " Shop "}))
            .await
            .unwrap();

        let calls = source.calls.lock().unwrap();
        assert!(calls[0].0.contains("LOWER(SCHEMA_NAME) = LOWER(?)"));
        assert_eq!(
            calls[0].1,
            vec![SqlArg::Text("Shop".into()), SqlArg::Int(100)]
        );
    }
}
