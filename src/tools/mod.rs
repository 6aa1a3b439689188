//! Diagnostic tools: the tool traits, the registry and the MySQL probe catalog.

pub mod config_diff;
pub mod innodb;
pub mod processlist;
pub mod registry;
pub mod schema_stats;
pub mod slow_queries;
pub mod status;
pub mod traits;

pub use config_diff::{ConfigBaseline, ConfigDiff};
pub use innodb::{InnodbMutex, InnodbStatus, InnodbTrx};
pub use processlist::ShowProcessList;
pub use registry::ToolRegistry;
pub use schema_stats::SchemaStats;
pub use slow_queries::SlowQueryAnalysis;
pub use status::{ShowConnections, ShowStatus};
pub use traits::{decode_params, empty_schema, NoParams, Probe, Tool, ToolDefinition};

use crate::config::MysqlConfig;
use crate::database::{Row, RowSource};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Standard row-list output: `{<key>: rows, "total_count": n}`.
pub(crate) fn table_output(key: &str, rows: Vec<Row>) -> Value {
    let mut out = Map::new();
    out.insert("total_count".into(), Value::from(rows.len()));
    out.insert(
        key.to_string(),
        Value::Array(
            rows.into_iter()
                .map(|row| Value::Object(row.into_iter().collect()))
                .collect(),
        ),
    );
    Value::Object(out)
}

/// Build the MySQL diagnostic catalog over a shared row source.
pub fn mysql_registry(source: Arc<dyn RowSource>, mysql: &MysqlConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ShowStatus::new(source.clone()));
    registry.register(ShowConnections::new(source.clone()));
    registry.register(ShowProcessList::new(source.clone()));
    registry.register(SlowQueryAnalysis::new(source.clone()));
    registry.register(InnodbStatus::new(source.clone()));
    registry.register(InnodbTrx::new(source.clone()));
    registry.register(InnodbMutex::new(source.clone()));
    registry.register(SchemaStats::new(source.clone(), mysql.database.clone()));
    registry.register(ConfigDiff::new(source, ConfigBaseline::from(mysql)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::testing::FakeSource;

    #[test]
    fn catalog_has_every_probe() {
        let source = Arc::new(FakeSource::new(|_, _| Ok(Vec::new())));
        let registry = mysql_registry(source, &MysqlConfig::default());

        assert_eq!(
            registry.names(),
            vec![
                "config_diff",
                "innodb_mutex",
                "innodb_status",
                "innodb_trx",
                "schema_stats",
                "show_connections",
                "show_processlist",
                "show_status",
                "slow_query_analysis",
            ]
        );
        for def in registry.definitions() {
            assert!(!def.description.is_empty(), "{} has no description", def.name);
            assert_eq!(def.parameters["type"], "object");
        }
    }

    #[test]
    fn table_output_counts_rows() {
        let rows = vec![Row::new(), Row::new()];
        let out = table_output("mutexes", rows);
        assert_eq!(out["total_count"], 2);
        assert_eq!(out["mutexes"].as_array().map(Vec::len), Some(2));
    }
}
