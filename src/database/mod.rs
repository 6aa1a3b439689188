//! Read-only database access used by the diagnostic probes.
//!
//! Probes talk to a [`RowSource`] so they can be exercised without a live
//! server. Rows come back normalized: lowercase column names, JSON values.

pub mod mysql;

pub use mysql::{connect, connect_lazy, MysqlSource};

use crate::error::DbError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

/// A normalized result row.
pub type Row = BTreeMap<String, serde_json::Value>;

/// Bind argument for a parameterized statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlArg {
    Int(i64),
    Text(String),
}

/// Live connection-pool statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub size: u32,
    pub idle: u32,
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime_secs: Option<u64>,
}

/// Parameterized, read-only query execution.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Run a statement and return all rows.
    async fn fetch(&self, sql: &str, args: &[SqlArg]) -> Result<Vec<Row>, DbError>;

    /// Pool statistics, if the source is backed by a pool.
    fn pool_stats(&self) -> Option<PoolStats> {
        None
    }
}

/// Run `primary`; when it fails and `retry_on` accepts the error, run `fallback`.
pub async fn fetch_with_fallback(
    source: &dyn RowSource,
    primary: &str,
    fallback: &str,
    retry_on: fn(&DbError) -> bool,
) -> Result<Vec<Row>, DbError> {
    match source.fetch(primary, &[]).await {
        Ok(rows) => Ok(rows),
        Err(e) if retry_on(&e) => {
            tracing::debug!("'{}' failed ({}), retrying with '{}'", primary, e, fallback);
            source.fetch(fallback, &[]).await
        }
        Err(e) => Err(e),
    }
}

/// Look up a column as a string, tolerating non-string JSON values.
pub fn column_str<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column).and_then(|v| v.as_str())
}

/// Render a value the way the server would print it.
pub fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
