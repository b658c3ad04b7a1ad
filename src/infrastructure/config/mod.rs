use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::domain::error::{AppError, Result};

pub const DEFAULT_ADDOK_SERVICE_URL: &str = "https://api-adresse.data.gouv.fr";
pub const CONFIG_FILE: &str = "geocode.toml";

/// Service configuration, resolved once at startup and injected downward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the geocoding backend (`ADDOK_SERVICE_URL`)
    pub addok_service_url: String,

    pub host: String,
    pub port: u16,

    /// `production` turns off per-request access logs
    pub app_env: String,

    /// Per-attempt timeout for backend calls
    pub request_timeout_ms: u64,

    /// Automatic retries on transient failures
    pub max_retries: u32,

    /// Rows allowed in flight against the backend per CSV job
    pub csv_concurrency: usize,

    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            addok_service_url: DEFAULT_ADDOK_SERVICE_URL.to_string(),
            host: "0.0.0.0".to_string(),
            port: 5000,
            app_env: "development".to_string(),
            request_timeout_ms: 5000,
            max_retries: 2,
            csv_concurrency: 4,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    /// Defaults, overridden by an optional `geocode.toml` in the working
    /// directory, then by `ADDOK_SERVICE_URL`, `HOST`, `PORT`, `APP_ENV` and
    /// `GEOCODE_*` environment variables.
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw().only(&["addok_service_url", "host", "port", "app_env"]))
            .merge(Env::prefixed("GEOCODE_"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: AppConfig = figment
            .extract()
            .map_err(|e| AppError::Internal(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.addok_service_url).map_err(|e| {
            AppError::Internal(format!(
                "addok_service_url is not a valid URL ({}): {}",
                self.addok_service_url, e
            ))
        })?;
        if self.request_timeout_ms == 0 {
            return Err(AppError::Internal(
                "request_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.csv_concurrency == 0 {
            return Err(AppError::Internal("csv_concurrency must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// Base URL without its trailing slash
    pub fn service_url(&self) -> &str {
        self.addok_service_url.trim_end_matches('/')
    }
}
