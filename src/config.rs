use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ProjectHubError, Result};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 7979;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub sqlite_path: Option<String>,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Shared token expected as `Authorization: Bearer` or `x-api-key`.
    /// Requests are not token-checked when unset.
    pub api_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeadlineConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: u64,
    #[serde(default = "default_warn_days")]
    pub warn_days: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub deadlines: DeadlineConfig,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true() -> bool {
    true
}

fn default_poll_seconds() -> u64 {
    3600
}

fn default_warn_days() -> i64 {
    3
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_seconds: default_poll_seconds(),
            warn_days: default_warn_days(),
        }
    }
}

impl Config {
    pub fn convention_defaults(db_path: &str) -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                sqlite_path: Some(db_path.to_string()),
                max_connections: Some(8),
            },
            auth: AuthConfig::default(),
            deadlines: DeadlineConfig::default(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            ProjectHubError::Config(format!("failed to read {}: {e}", path.to_string_lossy()))
        })?;
        let config: Config =
            serde_json::from_str(&raw).map_err(|e| ProjectHubError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path` when given, otherwise starts from convention defaults,
    /// then applies `PROJECTHUB_DB` / `PROJECTHUB_API_TOKEN`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::convention_defaults(&crate::runtime_paths::default_db_path()),
        };
        Ok(config.apply_env_overrides())
    }

    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(db) = std::env::var("PROJECTHUB_DB") {
            if !db.trim().is_empty() {
                self.database.sqlite_path = Some(db.trim().to_string());
            }
        }
        if let Ok(token) = std::env::var("PROJECTHUB_API_TOKEN") {
            if !token.trim().is_empty() {
                self.auth.api_token = Some(token.trim().to_string());
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(ProjectHubError::Config("server.host must not be empty".to_string()));
        }
        if self.deadlines.poll_seconds == 0 {
            return Err(ProjectHubError::Config(
                "deadlines.poll_seconds must be positive".to_string(),
            ));
        }
        if self.deadlines.warn_days < 0 {
            return Err(ProjectHubError::Config(
                "deadlines.warn_days must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sqlite_path(&self) -> String {
        self.database
            .sqlite_path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(str::to_string)
            .unwrap_or_else(crate::runtime_paths::default_db_path)
    }

    pub fn api_token(&self) -> Option<&str> {
        self.auth
            .api_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"server": {"port": 8080}}"#).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert!(config.deadlines.enabled);
        assert_eq!(config.deadlines.warn_days, 3);
        assert!(config.api_token().is_none());
    }

    #[test]
    fn blank_token_is_treated_as_unset() {
        let mut config = Config::convention_defaults("/tmp/x.db");
        config.auth.api_token = Some("   ".to_string());
        assert!(config.api_token().is_none());
        assert_eq!(config.sqlite_path(), "/tmp/x.db");
    }

    #[test]
    fn from_file_rejects_zero_poll_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"deadlines": {"poll_seconds": 0}}"#).unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ProjectHubError::Config(_)));
    }
}
