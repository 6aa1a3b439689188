//! InnoDB engine, transaction and mutex introspection.

use super::{empty_schema, table_output, NoParams, Probe};
use crate::database::{fetch_with_fallback, RowSource};
use crate::error::{DbError, ToolError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::Arc;

pub struct InnodbStatus {
    source: Arc<dyn RowSource>,
}

impl InnodbStatus {
    pub fn new(source: Arc<dyn RowSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Probe for InnodbStatus {
    type Params = NoParams;

    fn name(&self) -> &str {
        "innodb_status"
    }

    fn description(&self) -> &str {
        "Run SHOW ENGINE INNODB STATUS: latest deadlock, lock waits, transactions, buffer pool and I/O sections."
    }

    fn parameters_schema(&self) -> Value {
        empty_schema()
    }

    async fn run(&self, _params: NoParams) -> Result<Value, ToolError> {
        let rows = fetch_with_fallback(
            self.source.as_ref(),
            "SHOW ENGINE INNODB STATUS",
            "SHOW INNODB STATUS",
            DbError::is_syntax_error,
        )
        .await?;
        Ok(json!({ "sections": rows }))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrxParams {
    pub limit: Option<NonZeroU32>,
}

pub struct InnodbTrx {
    source: Arc<dyn RowSource>,
}

impl InnodbTrx {
    pub fn new(source: Arc<dyn RowSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Probe for InnodbTrx {
    type Params = TrxParams;

    fn name(&self) -> &str {
        "innodb_trx"
    }

    fn description(&self) -> &str {
        "Query information_schema.innodb_trx (oldest first) to find long-running transactions and lock waits."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum transactions to return"
                }
            },
            "additionalProperties": false
        })
    }

    async fn run(&self, params: TrxParams) -> Result<Value, ToolError> {
        // The limit is a validated integer, so it is inlined and the statement
        // stays on the text protocol (timestamps decode as text there).
        let mut sql = String::from("SELECT * FROM information_schema.innodb_trx ORDER BY trx_started");
        if let Some(limit) = params.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let rows = self.source.fetch(&sql, &[]).await?;
        Ok(table_output("transactions", rows))
    }
}

pub struct InnodbMutex {
    source: Arc<dyn RowSource>,
}

impl InnodbMutex {
    pub fn new(source: Arc<dyn RowSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Probe for InnodbMutex {
    type Params = NoParams;

    fn name(&self) -> &str {
        "innodb_mutex"
    }

    fn description(&self) -> &str {
        "Run SHOW ENGINE INNODB MUTEX to identify contended mutexes and rw-locks."
    }

    fn parameters_schema(&self) -> Value {
        empty_schema()
    }

    async fn run(&self, _params: NoParams) -> Result<Value, ToolError> {
        let rows = self.source.fetch("SHOW ENGINE INNODB MUTEX", &[]).await?;
        Ok(table_output("mutexes", rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::testing::{row, FakeSource};
    use crate::tools::Tool;

    #[tokio::test]
    async fn engine_status_retries_legacy_syntax() {
        let source = Arc::new(FakeSource::new(|sql, _| {
            if sql == "SHOW ENGINE INNODB STATUS" {
                Err(DbError::Server {
                    code: 1064,
                    message: "You have an error in your SQL syntax".into(),
                })
            } else {
                Ok(vec![row(&[("status", json!("=== INNODB MONITOR OUTPUT ==="))])])
            }
        }));
        let tool = InnodbStatus::new(source.clone());

        let out = tool.execute(&json!({})).await.unwrap();
        assert_eq!(out["sections"][0]["status"], "=== INNODB MONITOR OUTPUT ===");
        assert_eq!(source.statements()[1], "SHOW INNODB STATUS");
    }

    #[tokio::test]
    async fn trx_limit_is_inlined() {
        let source = Arc::new(FakeSource::new(|_, _| Ok(Vec::new())));
        let tool = InnodbTrx::new(source.clone());

        let out = tool.execute(&json!({"limit": 3})).await.unwrap();
        assert_eq!(out["total_count"], 0);
        assert_eq!(
            source.statements()[0],
            "SELECT * FROM information_schema.innodb_trx ORDER BY trx_started LIMIT 3"
        );
    }

    #[tokio::test]
    async fn mutex_rejects_parameters() {
        let source = Arc::new(FakeSource::new(|_, _| Ok(Vec::new())));
        let tool = InnodbMutex::new(source.clone());

        let err = tool.execute(&json!({"limit": 3})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams { .. }));
        assert!(source.statements().is_empty());
    }
}
