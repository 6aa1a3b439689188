//! `show_processlist`: current sessions, FULL when the packet size allows.

use super::{table_output, Probe};
use crate::database::{fetch_with_fallback, RowSource};
use crate::error::{DbError, ToolError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessListParams {
    #[serde(default)]
    pub full: bool,
    pub limit: Option<NonZeroU32>,
}

pub struct ShowProcessList {
    source: Arc<dyn RowSource>,
}

impl ShowProcessList {
    pub fn new(source: Arc<dyn RowSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Probe for ShowProcessList {
    type Params = ProcessListParams;

    fn name(&self) -> &str {
        "show_processlist"
    }

    fn description(&self) -> &str {
        "Run SHOW [FULL] PROCESSLIST to list running sessions, their state, time and statement."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "full": {
                    "type": "boolean",
                    "description": "Return full statement text (SHOW FULL PROCESSLIST). Default false"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum rows to return"
                }
            },
            "additionalProperties": false
        })
    }

    async fn run(&self, params: ProcessListParams) -> Result<Value, ToolError> {
        let mut rows = if params.full {
            fetch_with_fallback(
                self.source.as_ref(),
                "SHOW FULL PROCESSLIST",
                "SHOW PROCESSLIST",
                DbError::is_packet_overflow,
            )
            .await?
        } else {
            self.source.fetch("SHOW PROCESSLIST", &[]).await?
        };

        if let Some(limit) = params.limit {
            rows.truncate(limit.get() as usize);
        }

        Ok(table_output("processes", rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::testing::{row, FakeSource};
    use crate::tools::Tool;

    #[tokio::test]
    async fn full_list_falls_back_on_oversized_packets() {
        let source = Arc::new(FakeSource::new(|sql, _| {
            if sql.contains("FULL") {
                Err(DbError::Driver("Got a packet bigger than 'max_allowed_packet' bytes".into()))
            } else {
                Ok((1..=5).map(|id| row(&[("id", json!(id))])).collect())
            }
        }));
        let tool = ShowProcessList::new(source.clone());

        let out = tool.execute(&json!({"full": true, "limit": 2})).await.unwrap();
        assert_eq!(out["total_count"], 2);
        assert_eq!(out["processes"][1]["id"], 2);
        assert_eq!(source.statements().len(), 2);
    }

    #[tokio::test]
    async fn plain_list_does_not_retry() {
        let source = Arc::new(FakeSource::new(|_, _| {
            Err(DbError::Server {
                code: 1227,
                message: "Access denied".into(),
            })
        }));
        let tool = ShowProcessList::new(source.clone());

        let err = tool.execute(&json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Database(_)));
        assert_eq!(source.statements(), vec!["SHOW PROCESSLIST"]);
    }
}
