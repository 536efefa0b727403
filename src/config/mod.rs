use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsConfig {
    pub environment: Environment,
    pub patch: PatchConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchConfig {
    /// Install the global queryset interceptors from `crate::init()`
    pub auto_install: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Batch size used by bulk_create when the caller passes none
    pub default_batch_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default EnvFilter directive when RUST_LOG is unset
    pub filter: String,
    /// Log every receiver invocation at debug level
    pub log_receivers: bool,
}

impl SignalsConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("QUERYSET_SIGNALS_AUTO_PATCH") {
            self.patch.auto_install = v.parse().unwrap_or(self.patch.auto_install);
        }
        if let Ok(v) = env::var("QUERYSET_SIGNALS_LOG_RECEIVERS") {
            self.logging.log_receivers = v.parse().unwrap_or(self.logging.log_receivers);
        }
        if let Ok(v) = env::var("DATABASE_DEFAULT_BATCH_SIZE") {
            // 0 and garbage both mean "no default"
            self.database.default_batch_size = v.parse().ok().filter(|n: &usize| *n > 0);
        }
        if let Ok(v) = env::var("LOG_FILTER") {
            if !v.trim().is_empty() {
                self.logging.filter = v;
            }
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            patch: PatchConfig { auto_install: false },
            database: DatabaseConfig { default_batch_size: None },
            logging: LoggingConfig {
                filter: "queryset_signals=debug".to_string(),
                log_receivers: true,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            patch: PatchConfig { auto_install: true },
            database: DatabaseConfig { default_batch_size: Some(500) },
            logging: LoggingConfig {
                filter: "queryset_signals=info".to_string(),
                log_receivers: false,
            },
        }
    }
}

// Global singleton config - initialized on first access
pub static CONFIG: Lazy<SignalsConfig> = Lazy::new(SignalsConfig::from_env);

pub fn config() -> &'static SignalsConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}
