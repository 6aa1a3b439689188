//! Agent configuration stored as TOML in the agent home directory.

pub mod schema;

pub use schema::{
    AgentConfig, InferenceConfig, MysqlConfig, QueryConfig, ServerConfig, MAX_QUERY_TIMEOUT_SECS,
};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// File name of the config inside the agent home directory.
pub const CONFIG_FILE: &str = "agent.toml";

/// Default agent home directory (~/.mysql-agent).
pub fn default_home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".mysql-agent"))
        .unwrap_or_else(|| PathBuf::from(".mysql-agent"))
}

/// Load config from the given path, or return defaults.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if path.exists() {
        let contents =
            std::fs::read_to_string(path).context("Failed to read agent config file")?;
        let config: AgentConfig =
            toml::from_str(&contents).context("Failed to parse agent config (TOML)")?;
        Ok(config)
    } else {
        Ok(AgentConfig::default())
    }
}

/// Save config to the given path (TOML format).
pub fn save_config(config: &AgentConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).context("Failed to write config file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.server.port, 8081);
        assert_eq!(cfg.inference.model, "deepseek-chat");
        assert_eq!(cfg.query.default_timeout_secs, 60);
        assert_eq!(cfg.signals.len(), 6);
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut cfg = AgentConfig::default();
        cfg.mysql.database = "shop".into();
        cfg.query.default_timeout_secs = 15;
        save_config(&cfg, &path).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.mysql.database, "shop");
        assert_eq!(loaded.query.default_timeout_secs, 15);
        assert_eq!(loaded.signals, cfg.signals);
    }

    #[test]
    fn partial_file_fills_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            r#"
[mysql]
database = "orders"

[[signals]]
key = "lock_waits"
name = "Lock waits"
tool = "innodb_trx"
"#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.mysql.database, "orders");
        assert_eq!(cfg.mysql.port, 3306);
        assert_eq!(cfg.signals.len(), 1);
        assert_eq!(cfg.signals[0].tool, "innodb_trx");
    }

    #[test]
    fn configured_timeout_is_bounded() {
        let mut cfg = AgentConfig::default();
        cfg.query.default_timeout_secs = u64::MAX;
        assert_eq!(
            cfg.default_query_timeout(),
            std::time::Duration::from_secs(MAX_QUERY_TIMEOUT_SECS)
        );
        cfg.query.default_timeout_secs = 0;
        assert_eq!(cfg.default_query_timeout(), std::time::Duration::from_secs(1));
    }

    #[test]
    fn env_api_key_takes_precedence_over_file() {
        let mut cfg = AgentConfig::default();
        cfg.inference.api_key = "from-file".into();

        cfg.apply_overrides_from(|key| match key {
            "DEEPSEEK_API_KEY" => Some(" from-env ".into()),
            "DEEPSEEK_MODEL" => Some("   ".into()),
            _ => None,
        });

        assert_eq!(cfg.inference.api_key, "from-env");
        assert_eq!(cfg.inference.model, "deepseek-chat");
    }

    #[test]
    fn file_key_kept_when_env_missing() {
        let mut cfg = AgentConfig::default();
        cfg.inference.api_key = "from-file".into();
        cfg.apply_overrides_from(|_| None);
        assert_eq!(cfg.inference.api_key, "from-file");
    }
}
