// plan-pdf-service/src/config.rs

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// V4 signed URLs are valid for at most seven days.
pub const MAX_SIGNED_URL_EXPIRY_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub renderer: RendererConfig,
    pub templates: TemplateConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub log_level: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub bucket: Option<String>,
    pub signed_url_expiry_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RendererConfig {
    pub chrome_path: PathBuf,
    pub network_idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateConfig {
    pub path: PathBuf,
}

impl StorageConfig {
    /// The configured bucket, with blank values treated as unset.
    pub fn bucket(&self) -> Option<&str> {
        self.bucket
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }

    pub fn signed_url_expiry(&self) -> Duration {
        Duration::from_secs(self.signed_url_expiry_minutes.saturating_mul(60))
    }
}

impl RendererConfig {
    pub fn network_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.network_idle_timeout_secs)
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            // Start with default values
            .set_default("service.name", "plan-pdf-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.port", 8080)?
            .set_default("storage.signed_url_expiry_minutes", 10080)?
            .set_default("renderer.chrome_path", "/usr/bin/chromium")?
            .set_default("renderer.network_idle_timeout_secs", 30)?
            .set_default("templates.path", "./templates")?
            // Load from config file if it exists
            .add_source(File::with_name("config").required(false))
            // Override with environment variables (e.g., SERVICE__STORAGE__BUCKET)
            .add_source(Environment::with_prefix("SERVICE").separator("__"))
            // Flat deployment variables win over everything else
            .set_override_option("service.port", flat_env("PORT"))?
            .set_override_option("storage.bucket", flat_env("GCS_BUCKET"))?
            .set_override_option(
                "storage.signed_url_expiry_minutes",
                flat_env("SIGNED_URL_EXP_MINUTES"),
            )?
            .set_override_option("renderer.chrome_path", flat_env("CHROME_PATH"))?
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let minutes = self.storage.signed_url_expiry_minutes;
        if !(1..=MAX_SIGNED_URL_EXPIRY_MINUTES).contains(&minutes) {
            return Err(ConfigError::Message(format!(
                "storage.signed_url_expiry_minutes must be between 1 and \
                 {MAX_SIGNED_URL_EXPIRY_MINUTES}, got {minutes}"
            )));
        }
        Ok(())
    }
}

fn flat_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
