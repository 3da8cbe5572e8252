//! Process configuration: hierarchical merge of defaults, project YAML, and
//! environment variables, grounded on the teacher's `ConfigLoader`.

mod loader;

pub use loader::{ConfigError, ConfigLoader};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: ".conclave/conclave.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Scheduler poll tick, in seconds (§4.3: "fixed tick (10s)").
    pub tick_seconds: u64,
    /// Up to K candidate steps examined per tick.
    pub candidate_limit: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 10,
            candidate_limit: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub api_key: Option<String>,
    pub team_id: Option<String>,
    pub api_user_id: Option<String>,
    pub webhook_secret: Option<String>,
    /// The label id Conclave itself applies to mirror issues it created.
    /// Used by the inbound poller's second loop-prevention layer (§4.6):
    /// items already carrying this label are Conclave's own echo, not a new
    /// external request.
    pub system_label_id: Option<String>,
    /// Heartbeat poll tick, in seconds.
    pub poll_tick_seconds: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            team_id: None,
            api_user_id: None,
            webhook_secret: None,
            system_label_id: None,
            poll_tick_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub brave_api_key: Option<String>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self { brave_api_key: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<String>,
    pub rate_limit_rps: f64,
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            rate_limit_rps: 4.0,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub scheduler: SchedulerConfig,
    pub mirror: MirrorConfig,
    pub web: WebConfig,
    pub llm: LlmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            scheduler: SchedulerConfig::default(),
            mirror: MirrorConfig::default(),
            web: WebConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}
