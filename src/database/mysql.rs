//! sqlx-backed MySQL row source.

use super::{PoolStats, Row, RowSource, SqlArg};
use crate::config::MysqlConfig;
use crate::error::DbError;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::error::DatabaseError;
use sqlx::mysql::{MySqlConnectOptions, MySqlDatabaseError, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Executor, Row as _, ValueRef};
use std::time::Duration;
use tracing::{debug, info};

/// Open the shared connection pool and verify it with one connection.
pub async fn connect(cfg: &MysqlConfig) -> Result<MySqlPool, DbError> {
    let (options, pool) = pool_options(cfg);
    let pool = pool.connect_with(options).await?;
    info!("Connected to {}", cfg.redacted_dsn());
    Ok(pool)
}

/// Pool that connects on first use; building it never touches the network.
pub fn connect_lazy(cfg: &MysqlConfig) -> MySqlPool {
    let (options, pool) = pool_options(cfg);
    pool.connect_lazy_with(options)
}

fn pool_options(cfg: &MysqlConfig) -> (MySqlConnectOptions, MySqlPoolOptions) {
    let mut options = MySqlConnectOptions::new()
        .host(&cfg.host)
        .port(cfg.port)
        .username(&cfg.username)
        .password(&cfg.password)
        .charset(&cfg.charset);
    if !cfg.database.is_empty() {
        options = options.database(&cfg.database);
    }

    let mut pool = MySqlPoolOptions::new()
        .max_connections(cfg.max_connections.max(1))
        .min_connections(cfg.min_connections)
        .acquire_timeout(Duration::from_secs(cfg.acquire_timeout_secs.max(1)));
    if cfg.max_lifetime_secs > 0 {
        pool = pool.max_lifetime(Duration::from_secs(cfg.max_lifetime_secs));
    }
    (options, pool)
}

/// Row source over a shared MySQL pool.
#[derive(Debug, Clone)]
pub struct MysqlSource {
    pool: MySqlPool,
}

impl MysqlSource {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RowSource for MysqlSource {
    async fn fetch(&self, sql: &str, args: &[SqlArg]) -> Result<Vec<Row>, DbError> {
        debug!("mysql fetch: {}", sql.split_whitespace().collect::<Vec<_>>().join(" "));

        // SHOW statements are not all preparable, so unbound statements use
        // the text protocol.
        let rows: Vec<MySqlRow> = if args.is_empty() {
            self.pool.fetch_all(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for arg in args {
                query = match arg {
                    SqlArg::Int(v) => query.bind(*v),
                    SqlArg::Text(s) => query.bind(s.clone()),
                };
            }
            query.fetch_all(&self.pool).await?
        };

        Ok(rows.iter().map(decode_row).collect())
    }

    fn pool_stats(&self) -> Option<PoolStats> {
        let options = self.pool.options();
        Some(PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle() as u32,
            max_connections: options.get_max_connections(),
            min_connections: options.get_min_connections(),
            max_lifetime_secs: options.get_max_lifetime().map(|d| d.as_secs()),
        })
    }
}

impl From<sqlx::Error> for DbError {
    fn from(e: sqlx::Error) -> Self {
        if matches!(e, sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed) {
            return DbError::Unavailable;
        }
        if let sqlx::Error::Database(db) = &e {
            if let Some(mysql) = db.try_downcast_ref::<MySqlDatabaseError>() {
                return DbError::Server {
                    code: mysql.number(),
                    message: mysql.message().to_string(),
                };
            }
        }
        DbError::Driver(e.to_string())
    }
}

fn decode_row(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| (column.name().to_lowercase(), decode_value(row, idx)))
        .collect()
}

/// Best-effort conversion of one column to JSON: integer, float, string, then raw bytes.
fn decode_value(row: &MySqlRow, idx: usize) -> Value {
    match row.try_get_raw(idx) {
        Ok(raw) if !raw.is_null() => {}
        _ => return Value::Null,
    }

    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<u64, _>(idx) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return Value::String(v);
    }
    if let Ok(v) = row.try_get_unchecked::<String, _>(idx) {
        return Value::String(v);
    }
    match row.try_get_unchecked::<Vec<u8>, _>(idx) {
        Ok(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        Err(_) => Value::Null,
    }
}
