use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::email::SmtpConfig;
use crate::store::{DatabaseConfig, DatabaseType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub smtp: SmtpConfig,
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Endpoint of the platform notification service.
    pub endpoint: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Abort runs after this many seconds. Unset means no engine deadline.
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

impl Config {
    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Config {
            database: DatabaseConfig {
                db_type: match std::env::var("DATABASE_TYPE")
                    .unwrap_or_else(|_| "sqlite".to_string())
                    .to_lowercase()
                    .as_str()
                {
                    "postgres" => DatabaseType::Postgres,
                    _ => DatabaseType::Sqlite,
                },
                sqlite_path: std::env::var("SQLITE_PATH")
                    .map(PathBuf::from)
                    .ok()
                    .or_else(|| Some(PathBuf::from("data/opsflow.db"))),
                connection_string: std::env::var("DATABASE_URL").ok(),
            },
            smtp: SmtpConfig {
                host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: std::env::var("SMTP_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(587),
                secure: std::env::var("SMTP_SECURE")
                    .map(|s| s.to_lowercase() == "true")
                    .unwrap_or(false),
                username: std::env::var("SMTP_USERNAME").ok(),
                password: std::env::var("SMTP_PASSWORD").ok(),
                from: std::env::var("SMTP_FROM")
                    .unwrap_or_else(|_| "no-reply@opsflow.local".to_string()),
            },
            notifications: NotificationConfig {
                endpoint: std::env::var("NOTIFY_ENDPOINT")
                    .unwrap_or_else(|_| "http://localhost:8090/api/notifications".to_string()),
            },
            engine: EngineConfig {
                run_timeout_secs: std::env::var("RUN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok()),
            },
        };

        config.database.validate().map_err(crate::Error::Config)?;

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            smtp: SmtpConfig::default(),
            notifications: NotificationConfig {
                endpoint: "http://localhost:8090/api/notifications".to_string(),
            },
            engine: EngineConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.database.validate().is_ok());
        assert_eq!(config.smtp.port, 587);
        assert!(config.engine.run_timeout_secs.is_none());
    }
}
