//! Layered configuration: TOML file defaults overridden by environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration (§6 "Environment configuration").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub smtp: SmtpConfig,
    pub sms: SmsConfig,
    pub push: PushConfig,
    pub slack: SlackConfig,
    pub telegram: TelegramConfig,
    pub dispatcher: DispatcherConfig,
    pub dev_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            database: DatabaseConfig::default(),
            smtp: SmtpConfig::default(),
            sms: SmsConfig::default(),
            push: PushConfig::default(),
            slack: SlackConfig::default(),
            telegram: TelegramConfig::default(),
            dispatcher: DispatcherConfig::default(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
    pub cors_origin: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: 3001, host: "0.0.0.0".to_string(), cors_origin: "http://localhost:4200".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/notifyd".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub user: String,
    pub pass: String,
    pub from: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            secure: false,
            user: String::new(),
            pass: String::new(),
            from: "notifications@example.com".to_string(),
        }
    }
}

/// SMS gateway configuration (Twilio-shaped: account sid / auth token / sender number).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub phone_number: String,
    pub api_base_url: String,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            phone_number: String::new(),
            api_base_url: "https://api.twilio.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub project_id: String,
    pub service_account_key: String,
    pub api_base_url: String,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            service_account_key: String::new(),
            api_base_url: "https://fcm.googleapis.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub bot_token: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self { bot_token: String::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_base_url: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self { bot_token: String::new(), api_base_url: "https://api.telegram.org".to_string() }
    }
}

/// Dispatcher-internal tuning, not part of the original spec's env key table but
/// required to make §4.4's defaults operator-adjustable (ambient concern).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub worker_concurrency: u32,
    pub rate_limit_per_minute: u32,
    pub stall_sweep_interval_secs: u64,
    pub stall_threshold_minutes: i64,
    pub log_format: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 10,
            rate_limit_per_minute: 100,
            stall_sweep_interval_secs: 30,
            stall_threshold_minutes: 30,
            log_format: "text".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    pub fn example_toml() -> String {
        r#"# notifyd configuration
# Environment variables (see README / §6) override these settings.

[http]
port = 3001
host = "0.0.0.0"
cors_origin = "http://localhost:4200"

[database]
url = "postgres://localhost:5432/notifyd"
max_connections = 10

[smtp]
host = ""
port = 587
secure = false
user = ""
pass = ""
from = "notifications@example.com"

[sms]
account_sid = ""
auth_token = ""
phone_number = ""
api_base_url = "https://api.twilio.com"

[push]
project_id = ""
service_account_key = ""
api_base_url = "https://fcm.googleapis.com"

[slack]
bot_token = ""

[telegram]
bot_token = ""
api_base_url = "https://api.telegram.org"

[dispatcher]
worker_concurrency = 10
rate_limit_per_minute = 100
stall_sweep_interval_secs = 30
stall_threshold_minutes = 30
log_format = "text"

dev_mode = false
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_toml_parses_back_to_defaults() {
        let parsed: AppConfig = toml::from_str(&AppConfig::example_toml()).unwrap();
        assert_eq!(parsed.http.port, AppConfig::default().http.port);
        assert_eq!(parsed.dispatcher.worker_concurrency, 10);
    }
}
