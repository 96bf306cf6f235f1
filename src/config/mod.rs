use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub api: ApiConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    /// Upper bound for a single request, in seconds. Requests are never retried.
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_refresh: bool,
    pub refresh_interval_ms: u64,
    /// Floor applied to any interval handed to the sync engine.
    pub min_refresh_interval_ms: u64,
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SyncConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(self.min_refresh_interval_ms))
    }

    pub fn clamp_interval(&self, interval: Duration) -> Duration {
        interval.max(Duration::from_millis(self.min_refresh_interval_ms))
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    /// Configuration pointing at an explicit backend, used by tests and embedders.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        let mut config = Self::development();
        config.api.base_url = base_url.into();
        config
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("BACKOFFICE_API_URL") {
            self.api.base_url = v;
        }
        if let Ok(v) = env::var("BACKOFFICE_REQUEST_TIMEOUT_SECS") {
            self.api.request_timeout_secs = v.parse().unwrap_or(self.api.request_timeout_secs);
        }

        if let Ok(v) = env::var("BACKOFFICE_AUTO_REFRESH") {
            self.sync.auto_refresh = v.parse().unwrap_or(self.sync.auto_refresh);
        }
        if let Ok(v) = env::var("BACKOFFICE_REFRESH_INTERVAL_MS") {
            self.sync.refresh_interval_ms = v.parse().unwrap_or(self.sync.refresh_interval_ms);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            api: ApiConfig {
                base_url: "http://localhost:5000".to_string(),
                request_timeout_secs: 30,
                user_agent: default_user_agent(),
            },
            sync: SyncConfig {
                auto_refresh: true,
                refresh_interval_ms: 30_000,
                min_refresh_interval_ms: 1_000,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            api: ApiConfig {
                base_url: "https://staging-api.example.com".to_string(),
                request_timeout_secs: 15,
                user_agent: default_user_agent(),
            },
            sync: SyncConfig {
                auto_refresh: true,
                refresh_interval_ms: 30_000,
                min_refresh_interval_ms: 5_000,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            api: ApiConfig {
                base_url: "https://api.example.com".to_string(),
                request_timeout_secs: 10,
                user_agent: default_user_agent(),
            },
            sync: SyncConfig {
                auto_refresh: true,
                refresh_interval_ms: 60_000,
                min_refresh_interval_ms: 10_000,
            },
        }
    }
}

fn default_user_agent() -> String {
    format!("backoffice-client/{}", env!("CARGO_PKG_VERSION"))
}

// Process-wide config for the CLI; library types take `&AppConfig` explicitly
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}
