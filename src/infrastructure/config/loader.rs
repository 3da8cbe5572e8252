use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use super::Config;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid scheduler tick_seconds: {0}, must be at least 1")]
    InvalidTickSeconds(u64),

    #[error("invalid scheduler candidate_limit: {0}, must be at least 1")]
    InvalidCandidateLimit(u32),

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("database path cannot be empty")]
    EmptyDatabasePath,

    #[error("invalid max_connections: {0}, must be at least 1")]
    InvalidMaxConnections(u32),
}

/// Hierarchical configuration loader. Precedence (lowest to highest):
/// 1. Programmatic defaults
/// 2. `.conclave/config.yaml` (project config)
/// 3. `.conclave/local.yaml` (optional project-local overrides)
/// 4. Environment variables (`CONCLAVE_` prefix, highest priority)
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load() -> Result<Config> {
        let mut config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".conclave/config.yaml"))
            .merge(Yaml::file(".conclave/local.yaml"))
            .merge(Env::prefixed("CONCLAVE_").split("__"))
            .extract()
            .context("failed to extract configuration from figment")?;

        Self::apply_legacy_env_names(&mut config);
        Self::validate(&config)?;
        Ok(config)
    }

    /// The spec's external-interfaces section names these exact env vars
    /// (no `CONCLAVE_` prefix) as what the CLI/process surface recognizes;
    /// applied after the figment merge so an explicit `CONCLAVE_MIRROR__*`
    /// override still wins if both are set.
    fn apply_legacy_env_names(config: &mut Config) {
        if config.mirror.api_key.is_none() {
            config.mirror.api_key = std::env::var("LINEAR_API_KEY").ok();
        }
        if config.mirror.team_id.is_none() {
            config.mirror.team_id = std::env::var("LINEAR_TEAM_ID").ok();
        }
        if config.mirror.api_user_id.is_none() {
            config.mirror.api_user_id = std::env::var("LINEAR_API_USER_ID").ok();
        }
        if config.mirror.webhook_secret.is_none() {
            config.mirror.webhook_secret = std::env::var("LINEAR_WEBHOOK_SECRET").ok();
        }
        if config.web.brave_api_key.is_none() {
            config.web.brave_api_key = std::env::var("BRAVE_API_KEY").ok();
        }
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.scheduler.tick_seconds == 0 {
            return Err(ConfigError::InvalidTickSeconds(config.scheduler.tick_seconds));
        }
        if config.scheduler.candidate_limit == 0 {
            return Err(ConfigError::InvalidCandidateLimit(config.scheduler.candidate_limit));
        }
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = Config::default();
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn zero_tick_seconds_rejected() {
        let mut config = Config::default();
        config.scheduler.tick_seconds = 0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidTickSeconds(0))));
    }

    #[test]
    fn bad_log_level_rejected() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(ConfigLoader::validate(&config).is_err());
    }
}
