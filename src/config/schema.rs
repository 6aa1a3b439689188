//! Configuration schema for agent.toml.

use crate::types::RequiredSignal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Log level (debug, info, warn, error).
    pub log_level: String,

    pub server: ServerConfig,

    pub inference: InferenceConfig,

    pub mysql: MysqlConfig,

    pub query: QueryConfig,

    /// Diagnostic signals every report must account for.
    pub signals: Vec<RequiredSignal>,
}

/// JSON-RPC listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Chat-completion endpoint (OpenAI-compatible).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub base_url: String,

    /// Bearer credential. `DEEPSEEK_API_KEY` takes precedence.
    pub api_key: String,

    pub model: String,

    /// HTTP-level timeout for a single completion call.
    pub request_timeout_secs: u64,

    /// Maximum tokens for the planning reply.
    pub plan_max_tokens: u32,

    /// Maximum tokens for the report.
    pub summary_max_tokens: u32,

    pub temperature: f64,
}

/// Target database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MysqlConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Default schema, also used by `schema_stats`.
    pub database: String,
    pub charset: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

/// Upper bound on any query deadline, whether configured or requested.
pub const MAX_QUERY_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Per-query behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Deadline applied when the request carries no override.
    pub default_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            server: ServerConfig::default(),
            inference: InferenceConfig::default(),
            mysql: MysqlConfig::default(),
            query: QueryConfig::default(),
            signals: default_signals(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8081,
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".into(),
            api_key: String::new(),
            model: "deepseek-chat".into(),
            request_timeout_secs: 120,
            plan_max_tokens: 1024,
            summary_max_tokens: 2048,
            temperature: 0.2,
        }
    }
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 3306,
            username: "root".into(),
            password: String::new(),
            database: String::new(),
            charset: "utf8mb4".into(),
            max_connections: 10,
            min_connections: 0,
            acquire_timeout_secs: 10,
            max_lifetime_secs: 3600,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 60,
        }
    }
}

/// Signals tracked when the config file does not list its own.
pub fn default_signals() -> Vec<RequiredSignal> {
    vec![
        RequiredSignal::new("server_status", "Server status counters", "show_status"),
        RequiredSignal::new("connection_usage", "Connection usage", "show_connections"),
        RequiredSignal::new("active_sessions", "Active sessions", "show_processlist"),
        RequiredSignal::new("slow_queries", "Slow query digest", "slow_query_analysis"),
        RequiredSignal::new(
            "lock_waits",
            "InnoDB lock waits / long transactions",
            "innodb_trx",
        ),
        RequiredSignal::new(
            "engine_status",
            "InnoDB engine status (deadlocks, buffer pool)",
            "innodb_status",
        ),
    ]
}

impl AgentConfig {
    /// Listener address for the RPC server.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn default_query_timeout(&self) -> Duration {
        Duration::from_secs(self.query.default_timeout_secs.clamp(1, MAX_QUERY_TIMEOUT_SECS))
    }

    /// Apply environment overrides. The API key from the environment wins over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(key) = non_empty("DEEPSEEK_API_KEY") {
            self.inference.api_key = key;
        }
        if let Some(model) = non_empty("DEEPSEEK_MODEL") {
            self.inference.model = model;
        }
        if let Some(base) = non_empty("DEEPSEEK_BASE_URL") {
            self.inference.base_url = base;
        }
    }
}

impl MysqlConfig {
    /// DSN with the password masked, for logs.
    pub fn redacted_dsn(&self) -> String {
        format!(
            "mysql://{}:***@{}:{}/{}?charset={}",
            self.username, self.host, self.port, self.database, self.charset
        )
    }
}
