//! Layered configuration.
//!
//! Sources, highest priority first:
//! 1. `DASHBOARD_*` environment variables
//! 2. `DATABASE_URL` (only for `database_url`)
//! 3. `dashboard.toml` in the working directory
//! 4. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILE: &str = "dashboard.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Figment(#[from] figment::Error),

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database_url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Email looked up in the roles table to decide what this operator may do.
    #[serde(default)]
    pub operator_email: Option<String>,

    /// Base of the links printed for sessions and public views.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_dashboard_refresh_secs")]
    pub dashboard_refresh_secs: u64,

    #[serde(default = "default_public_refresh_secs")]
    pub public_refresh_secs: u64,
}

const fn default_max_connections() -> u32 {
    5
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

const fn default_dashboard_refresh_secs() -> u64 {
    30
}

const fn default_public_refresh_secs() -> u64 {
    60
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: default_max_connections(),
            operator_email: None,
            public_base_url: default_public_base_url(),
            bind_addr: default_bind_addr(),
            dashboard_refresh_secs: default_dashboard_refresh_secs(),
            public_refresh_secs: default_public_refresh_secs(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `.env` from the working directory first, if present.
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load()
    }

    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            figment = figment.merge(Toml::file(local));
        }

        figment
            .merge(Env::raw().only(&["database_url"]))
            .merge(Env::prefixed("DASHBOARD_"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_connections",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.dashboard_refresh_secs == 0 || self.public_refresh_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "refresh_secs",
                reason: "refresh intervals must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "database_url",
                reason: "set DATABASE_URL or DASHBOARD_DATABASE_URL to a Postgres instance"
                    .to_string(),
            });
        }
        Ok(&self.database_url)
    }

    pub fn dashboard_refresh(&self) -> Duration {
        Duration::from_secs(self.dashboard_refresh_secs)
    }

    pub fn public_refresh(&self) -> Duration {
        Duration::from_secs(self.public_refresh_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        let config = AppConfig::default();
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.dashboard_refresh(), Duration::from_secs(30));
        assert_eq!(config.public_refresh(), Duration::from_secs(60));
        assert!(config.operator_email.is_none());
        assert!(config.require_database_url().is_err());
    }

    #[test]
    fn file_then_env_layering() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                public_refresh_secs = 90
                bind_addr = "0.0.0.0:9000"
                "#,
            )?;
            jail.set_env("DASHBOARD_BIND_ADDR", "0.0.0.0:8080");
            jail.set_env("DASHBOARD_OPERATOR_EMAIL", "ops@example.com");

            let config: AppConfig = AppConfig::figment().extract()?;
            assert_eq!(config.public_refresh_secs, 90);
            assert_eq!(config.bind_addr, "0.0.0.0:8080");
            assert_eq!(config.operator_email.as_deref(), Some("ops@example.com"));
            Ok(())
        });
    }

    #[test]
    fn prefixed_database_url_beats_plain() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("DATABASE_URL", "postgres://plain/db");
            let config: AppConfig = AppConfig::figment().extract()?;
            assert_eq!(config.database_url, "postgres://plain/db");

            jail.set_env("DASHBOARD_DATABASE_URL", "postgres://prefixed/db");
            let config: AppConfig = AppConfig::figment().extract()?;
            assert_eq!(config.database_url, "postgres://prefixed/db");
            Ok(())
        });
    }

    #[test]
    fn rejects_zero_refresh() {
        let config = AppConfig {
            dashboard_refresh_secs: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
