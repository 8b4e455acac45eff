use crate::{Error, Result};
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateBackend {
    Memory,
    Sqlite,
    Redis,
}

impl StateBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Some(Self::Memory),
            "sqlite" => Some(Self::Sqlite),
            "redis" => Some(Self::Redis),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
            Self::Redis => "redis",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub url: String,
    pub api_key: Option<SecretString>,
}

/// Process configuration for the connector.
#[derive(Debug, Clone)]
pub struct RangerConfig {
    pub state_backend: StateBackend,
    pub sqlite_path: PathBuf,
    pub redis_url: Option<String>,
    pub redis_key_prefix: Option<String>,
    pub hub: HubConfig,
    pub site_connect_timeout: Duration,
    pub batch_size: usize,
    pub integrations_file: Option<PathBuf>,
}

impl Default for RangerConfig {
    fn default() -> Self {
        Self {
            state_backend: StateBackend::Memory,
            sqlite_path: PathBuf::from("./data/ranger_state.db"),
            redis_url: None,
            redis_key_prefix: None,
            hub: HubConfig {
                url: "http://localhost:8000".to_string(),
                api_key: None,
            },
            site_connect_timeout: crate::actions::credentials::DEFAULT_CONNECT_TIMEOUT,
            batch_size: crate::actions::pull::DEFAULT_BATCH_SIZE,
            integrations_file: None,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl RangerConfig {
    #[tracing::instrument(level = "debug")]
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(v) = non_empty_var("RANGER_STATE_BACKEND") {
            cfg.state_backend = StateBackend::parse(&v)
                .ok_or_else(|| Error::InvalidInput(format!("invalid RANGER_STATE_BACKEND: {v}")))?;
        }
        if let Some(v) = non_empty_var("RANGER_STATE_SQLITE_PATH") {
            cfg.sqlite_path = PathBuf::from(v);
        }
        cfg.redis_url = non_empty_var("RANGER_REDIS_URL");
        cfg.redis_key_prefix = non_empty_var("RANGER_REDIS_KEY_PREFIX");

        if let Some(v) = non_empty_var("RANGER_HUB_URL") {
            cfg.hub.url = v;
        }
        cfg.hub.api_key = non_empty_var("RANGER_HUB_API_KEY").map(SecretString::new);

        if let Some(v) = non_empty_var("RANGER_SITE_CONNECT_TIMEOUT_MS") {
            let ms = v.trim().parse::<u64>().map_err(|_| {
                Error::InvalidInput(format!("invalid RANGER_SITE_CONNECT_TIMEOUT_MS: {v}"))
            })?;
            cfg.site_connect_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = non_empty_var("RANGER_BATCH_SIZE") {
            cfg.batch_size = v
                .trim()
                .parse::<usize>()
                .map_err(|_| Error::InvalidInput(format!("invalid RANGER_BATCH_SIZE: {v}")))?;
        }
        cfg.integrations_file = non_empty_var("RANGER_INTEGRATIONS_FILE").map(PathBuf::from);

        cfg.validate()?;
        Ok(cfg)
    }

    #[tracing::instrument(level = "debug")]
    pub fn validate(&self) -> Result<()> {
        if self.hub.url.trim().is_empty() {
            return Err(Error::InvalidInput("hub.url is empty".to_string()));
        }
        if url::Url::parse(&self.hub.url).is_err() {
            return Err(Error::InvalidInput(format!(
                "hub.url is not a valid url: {}",
                self.hub.url
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidInput("batch_size must be > 0".to_string()));
        }
        if self.site_connect_timeout.is_zero() {
            return Err(Error::InvalidInput(
                "site_connect_timeout must be > 0".to_string(),
            ));
        }
        match self.state_backend {
            StateBackend::Redis if self.redis_url.is_none() => {
                return Err(Error::InvalidInput(
                    "RANGER_REDIS_URL is required for the redis state backend".to_string(),
                ));
            }
            StateBackend::Sqlite if self.sqlite_path.as_os_str().is_empty() => {
                return Err(Error::InvalidInput("sqlite_path is empty".to_string()));
            }
            _ => {}
        }
        Ok(())
    }
}
