//! Configuration loader with file and environment variable support.

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths, checked in order.
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "notifyd.toml",
    "./config/config.toml",
    "/etc/notifyd/config.toml",
];

pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        self.apply_env_overrides(&mut config);

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("NOTIFYD_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        for path in CONFIG_PATHS {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    fn apply_env_overrides(&self, config: &mut AppConfig) {
        // HTTP
        if let Ok(val) = env::var("PORT") {
            if let Ok(port) = val.parse() {
                config.http.port = port;
            }
        }
        if let Ok(val) = env::var("HOST") {
            config.http.host = val;
        }
        if let Ok(val) = env::var("FRONTEND_URL") {
            config.http.cors_origin = val;
        }

        // Database
        if let Ok(val) = env::var("DATABASE_URL") {
            config.database.url = val;
        }
        if let Ok(val) = env::var("DATABASE_MAX_CONNECTIONS") {
            if let Ok(n) = val.parse() {
                config.database.max_connections = n;
            }
        }

        // SMTP
        if let Ok(val) = env::var("SMTP_HOST") {
            config.smtp.host = val;
        }
        if let Ok(val) = env::var("SMTP_PORT") {
            if let Ok(port) = val.parse() {
                config.smtp.port = port;
            }
        }
        if let Ok(val) = env::var("SMTP_SECURE") {
            config.smtp.secure = val.parse().unwrap_or(false);
        }
        if let Ok(val) = env::var("SMTP_USER") {
            config.smtp.user = val;
        }
        if let Ok(val) = env::var("SMTP_PASS") {
            config.smtp.pass = val;
        }
        if let Ok(val) = env::var("SMTP_FROM") {
            config.smtp.from = val;
        }

        // SMS
        if let Ok(val) = env::var("ACCOUNT_SID") {
            config.sms.account_sid = val;
        }
        if let Ok(val) = env::var("AUTH_TOKEN") {
            config.sms.auth_token = val;
        }
        if let Ok(val) = env::var("PHONE_NUMBER") {
            config.sms.phone_number = val;
        }

        // Push
        if let Ok(val) = env::var("PROJECT_ID") {
            config.push.project_id = val;
        }
        if let Ok(val) = env::var("SERVICE_ACCOUNT_KEY") {
            config.push.service_account_key = val;
        }

        // Slack
        if let Ok(val) = env::var("SLACK_BOT_TOKEN") {
            config.slack.bot_token = val;
        }

        // Telegram
        if let Ok(val) = env::var("TELEGRAM_BOT_TOKEN") {
            config.telegram.bot_token = val;
        }

        // Dispatcher tuning
        if let Ok(val) = env::var("NOTIFYD_WORKER_CONCURRENCY") {
            if let Ok(n) = val.parse() {
                config.dispatcher.worker_concurrency = n;
            }
        }
        if let Ok(val) = env::var("NOTIFYD_RATE_LIMIT_PER_MINUTE") {
            if let Ok(n) = val.parse() {
                config.dispatcher.rate_limit_per_minute = n;
            }
        }
        if let Ok(val) = env::var("NOTIFYD_STALL_SWEEP_INTERVAL_SECS") {
            if let Ok(n) = val.parse() {
                config.dispatcher.stall_sweep_interval_secs = n;
            }
        }
        if let Ok(val) = env::var("NOTIFYD_STALL_THRESHOLD_MINUTES") {
            if let Ok(n) = val.parse() {
                config.dispatcher.stall_threshold_minutes = n;
            }
        }
        if let Ok(val) = env::var("NOTIFYD_LOG_FORMAT") {
            config.dispatcher.log_format = val;
        }

        if let Ok(val) = env::var("NOTIFYD_DEV_MODE") {
            config.dev_mode = val.parse().unwrap_or(false);
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn finds_explicit_path_over_search_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(f, "{}", AppConfig::example_toml()).unwrap();

        let loader = ConfigLoader::with_path(&path);
        let found = loader.find_config_file();
        assert_eq!(found, Some(path));
    }

    #[test]
    fn env_override_wins_over_file_default() {
        std::env::set_var("SMTP_HOST", "smtp.example.test");
        let mut config = AppConfig::default();
        ConfigLoader::new().apply_env_overrides(&mut config);
        assert_eq!(config.smtp.host, "smtp.example.test");
        std::env::remove_var("SMTP_HOST");
    }
}
