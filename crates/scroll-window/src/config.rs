use crate::record::Offset;
use crate::retry::RetryPolicy;
use crate::viewport::{DEFAULT_BOTTOM_BUFFER, DEFAULT_TOP_BUFFER, ViewportMonitor};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "SCROLL_WINDOW_";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value:?}")]
    Env { key: String, value: String },
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Tuning for one window. Defaults match the classic three-record chunks with four
/// chunks kept on screen.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Records requested per fetch.
    pub chunk_size: usize,
    /// Chunks kept before the far end is evicted.
    pub max_chunks: usize,
    pub top_buffer: f64,
    pub bottom_buffer: f64,
    /// Lowest offset ever requested.
    pub first_offset: Offset,
    pub fetch_timeout_ms: u64,
    /// Fetches one `settle` call may issue before it gives up on converging.
    pub max_settle_steps: usize,
    pub retry: RetryPolicy,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            chunk_size: 3,
            max_chunks: 4,
            top_buffer: DEFAULT_TOP_BUFFER,
            bottom_buffer: DEFAULT_BOTTOM_BUFFER,
            first_offset: 1,
            fetch_timeout_ms: 5_000,
            max_settle_steps: 256,
            retry: RetryPolicy::default(),
        }
    }
}

impl WindowConfig {
    /// Defaults overridden by `SCROLL_WINDOW_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// File first, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                toml::from_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_parse("CHUNK_SIZE")? {
            self.chunk_size = v;
        }
        if let Some(v) = env_parse("MAX_CHUNKS")? {
            self.max_chunks = v;
        }
        if let Some(v) = env_parse("TOP_BUFFER")? {
            self.top_buffer = v;
        }
        if let Some(v) = env_parse("BOTTOM_BUFFER")? {
            self.bottom_buffer = v;
        }
        if let Some(v) = env_parse("FIRST_OFFSET")? {
            self.first_offset = v;
        }
        if let Some(v) = env_parse("FETCH_TIMEOUT_MS")? {
            self.fetch_timeout_ms = v;
        }
        if let Some(v) = env_parse("MAX_SETTLE_STEPS")? {
            self.max_settle_steps = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be at least 1"));
        }
        if self.max_chunks == 0 {
            return Err(ConfigError::Invalid("max_chunks must be at least 1"));
        }
        if !(self.top_buffer.is_finite() && self.top_buffer >= 0.0)
            || !(self.bottom_buffer.is_finite() && self.bottom_buffer >= 0.0)
        {
            return Err(ConfigError::Invalid("scroll buffers must be finite and non-negative"));
        }
        if self.first_offset < 0 {
            return Err(ConfigError::Invalid("first_offset must not be negative"));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::Invalid("fetch_timeout_ms must be at least 1"));
        }
        if self.retry.base_ms > self.retry.max_ms {
            return Err(ConfigError::Invalid("retry.base_ms must not exceed retry.max_ms"));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn monitor(&self) -> ViewportMonitor {
        ViewportMonitor::new(self.top_buffer, self.bottom_buffer)
    }
}

fn env_parse<T: std::str::FromStr>(suffix: &str) -> Result<Option<T>, ConfigError> {
    let key = format!("{ENV_PREFIX}{suffix}");
    match env::var(&key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { key, value }),
        Err(_) => Ok(None),
    }
}
