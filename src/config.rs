use serde::Deserialize;
use crate::error::{Result, AppError};
use std::time::Duration;
use config::builder::{ConfigBuilder, DefaultState};
use config::{Config as ConfigLoader, ConfigError, File, Environment};

pub const DEFAULT_API_URL: &str = "https://ismp.crpt.ru/api/v3/lk/documents/create";

/// Length of one rate-limit window.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn duration(self) -> Duration {
        match self {
            TimeUnit::Milliseconds => Duration::from_millis(1),
            TimeUnit::Seconds => Duration::from_secs(1),
            TimeUnit::Minutes => Duration::from_secs(60),
            TimeUnit::Hours => Duration::from_secs(60 * 60),
            TimeUnit::Days => Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Logging
    pub log_level: String,
    pub log_json: bool,

    // API
    pub api_url: String,
    pub token: Option<String>,

    // Rate limit: `request_limit` calls per one `time_unit`
    pub request_limit: usize,
    pub time_unit: TimeUnit,
    pub acquire_timeout_ms: Option<u64>,

    // HTTP client
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub https_only: bool,

    // Demo binary input
    pub document_path: Option<String>,
}

impl Config {
    /// Defaults, then an optional `crpt.{toml,yaml,json}` file, then `CRPT_*`
    /// environment variables (a `.env` file is loaded first if present).
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let loader = Self::defaults()?
            .add_source(File::with_name("crpt").required(false))
            .add_source(Environment::with_prefix("CRPT").try_parsing(true))
            .build()?;

        Self::from_loader(loader)
    }

    fn defaults() -> std::result::Result<ConfigBuilder<DefaultState>, ConfigError> {
        ConfigLoader::builder()
            .set_default("log_level", "info")?
            .set_default("log_json", false)?
            .set_default("api_url", DEFAULT_API_URL)?
            .set_default("request_limit", 10)?
            .set_default("time_unit", "seconds")?
            .set_default("request_timeout_ms", 10_000)?
            .set_default("connect_timeout_ms", 5_000)?
            .set_default("https_only", true)
    }

    fn from_loader(loader: ConfigLoader) -> Result<Self> {
        let config: Config = loader.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_limit == 0 {
            return Err(AppError::Config(ConfigError::Message(
                "request_limit must be greater than zero".into(),
            )));
        }
        if self.request_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err(AppError::Config(ConfigError::Message(
                "HTTP timeouts must be greater than zero".into(),
            )));
        }
        if self.acquire_timeout_ms == Some(0) {
            return Err(AppError::Config(ConfigError::Message(
                "acquire_timeout_ms must be greater than zero when set".into(),
            )));
        }
        url::Url::parse(&self.api_url)?;
        Ok(())
    }

    pub fn window(&self) -> Duration {
        self.time_unit.duration()
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
