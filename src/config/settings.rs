use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

use crate::connection_manager::{BackoffConfig, ConnectionConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// WebSocket endpoint of the chat channel
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Base URL of the REST API
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for any reconnect delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub jitter_factor: f64,
    /// Reconnect attempts before staying disconnected
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Messages requested when a room is opened
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

/// Room and token for the terminal client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    pub room_id: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_ws_url() -> String {
    "ws://localhost:3000/ws".to_string()
}

fn default_api_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_base_delay_ms() -> u64 {
    1_000 // 1 second
}

fn default_max_delay_ms() -> u64 {
    30_000 // 30 seconds
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    5
}

fn default_history_limit() -> usize {
    50
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.ws_url", default_ws_url())?
            .set_default("server.api_url", default_api_url())?
            .set_default("reconnect.base_delay_ms", default_base_delay_ms())?
            .set_default("reconnect.max_delay_ms", default_max_delay_ms())?
            .set_default("reconnect.max_attempts", default_max_attempts() as u64)?
            .set_default("history.limit", default_history_limit() as u64)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // CHAT_SERVER__WS_URL, CHAT_RECONNECT__MAX_ATTEMPTS, CHAT_SESSION__TOKEN, etc.
            .add_source(
                Environment::with_prefix("CHAT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new(self.server.ws_url.clone())
            .with_backoff(BackoffConfig::from(&self.reconnect))
    }
}

impl From<&ReconnectConfig> for BackoffConfig {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            multiplier: config.multiplier,
            jitter_factor: config.jitter_factor.clamp(0.0, 1.0),
            max_attempts: config.max_attempts,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            api_url: default_api_url(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter_factor: 0.0,
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            limit: default_history_limit(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: LogFormat::default(),
        }
    }
}
