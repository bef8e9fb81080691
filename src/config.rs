//! Client configuration: backend location, retry policy and build mode.

use anyhow::{Context, Result, bail};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Base URL used in development when `AGENDA_API_URL` is unset.
pub const DEV_BASE_URL: &str = "http://localhost:3002";

/// Default path of the contacts resource.
pub const DEFAULT_CONTACTOS_PATH: &str = "/contactos";

/// Default number of automatic retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: usize = 2;

/// Default waits between attempts, indexed by attempt number.
pub const DEFAULT_RETRY_DELAYS_MS: [u64; 2] = [500, 1000];

pub const ENV_API_URL: &str = "AGENDA_API_URL";
pub const ENV_MODE: &str = "AGENDA_MODE";
pub const ENV_MAX_RETRIES: &str = "AGENDA_MAX_RETRIES";
pub const ENV_RETRY_DELAYS_MS: &str = "AGENDA_RETRY_DELAYS_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "AGENDA_REQUEST_TIMEOUT_MS";

/// Build mode gating where diagnostics go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Development,
    Production,
    Test,
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMode::Development => write!(f, "development"),
            BuildMode::Production => write!(f, "production"),
            BuildMode::Test => write!(f, "test"),
        }
    }
}

impl FromStr for BuildMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(BuildMode::Development),
            "production" | "prod" => Ok(BuildMode::Production),
            "test" => Ok(BuildMode::Test),
            _ => bail!(
                "Unknown build mode: {}. Expected development, production, or test.",
                s
            ),
        }
    }
}

/// Bounded retry schedule. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: usize,
    delays_ms: Vec<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delays_ms: DEFAULT_RETRY_DELAYS_MS.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Builds a policy, rejecting delay tables that decrease by position.
    pub fn new(max_retries: usize, delays_ms: Vec<u64>) -> Result<Self> {
        if delays_ms.windows(2).any(|w| w[1] < w[0]) {
            bail!("Retry delays must be non-decreasing, got {:?}", delays_ms);
        }
        Ok(Self {
            max_retries,
            delays_ms,
        })
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Upper bound on requests issued for one logical operation.
    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Wait before the retry that follows `attempt` (zero-based).
    /// Attempts past the table reuse its last entry; an empty table means no wait.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let ms = self
            .delays_ms
            .get(attempt)
            .or_else(|| self.delays_ms.last())
            .copied()
            .unwrap_or(0);
        Duration::from_millis(ms)
    }
}

/// Everything the client needs to reach the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub contactos_path: String,
    pub max_retries: usize,
    pub retry_delays_ms: Vec<u64>,
    /// Per-request transport timeout. None leaves it to the transport.
    pub request_timeout_ms: Option<u64>,
    pub mode: BuildMode,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEV_BASE_URL.to_string(),
            contactos_path: DEFAULT_CONTACTOS_PATH.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delays_ms: DEFAULT_RETRY_DELAYS_MS.to_vec(),
            request_timeout_ms: None,
            mode: BuildMode::default(),
        }
    }
}

impl ApiConfig {
    /// Creates a config pointing at `base_url` with default policy.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Reads the config from environment-like lookups.
    ///
    /// `lookup` returns the value of a variable, if set. Taking a closure
    /// instead of reading `std::env` directly keeps this testable.
    #[tracing::instrument(skip(lookup))]
    pub fn from_env<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let url_set = config.apply_env(&lookup)?;
        config.finish(url_set)
    }

    /// Parses a JSON config document. Missing fields take their defaults and
    /// variables from `lookup` override what the document says.
    pub fn from_json_str<F>(json: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value: serde_json::Value =
            serde_json::from_str(json).context("Failed to parse config JSON")?;
        let file_url = value
            .get("base_url")
            .and_then(serde_json::Value::as_str)
            .is_some_and(|url| !url.trim().is_empty());
        let mut config: Self =
            serde_json::from_value(value).context("Failed to parse config JSON")?;
        let env_url = config.apply_env(&lookup)?;
        config.finish(file_url || env_url)
    }

    /// Reads a JSON config file. See [`ApiConfig::from_json_str`].
    #[tracing::instrument(skip(lookup))]
    pub fn from_file<F>(path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        debug!("Loading config from {}", path.display());
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json_str(&json, lookup)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Applies every variable `lookup` knows about. Returns whether it
    /// supplied the base URL.
    fn apply_env<F>(&mut self, lookup: &F) -> Result<bool>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MODE) {
            self.mode = value.parse()?;
        }

        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            self.max_retries = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", ENV_MAX_RETRIES, value))?;
        }

        if let Some(value) = lookup(ENV_RETRY_DELAYS_MS) {
            self.retry_delays_ms = parse_delays(&value)?;
        }

        if let Some(value) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            let ms = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", ENV_REQUEST_TIMEOUT_MS, value))?;
            self.request_timeout_ms = Some(ms);
        }

        match lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            Some(url) => {
                self.base_url = url;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn finish(self, url_set: bool) -> Result<Self> {
        if !url_set && self.mode == BuildMode::Production {
            bail!("{} must be set in production mode", ENV_API_URL);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(self.base_url())
            .with_context(|| format!("Invalid API base URL: {}", self.base_url))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            bail!("API base URL must use http or https: {}", self.base_url);
        }
        self.retry_policy()?;
        Ok(())
    }

    /// Base URL without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Resource path without leading slashes.
    pub fn resource_path(&self) -> &str {
        self.contactos_path.trim_start_matches('/')
    }

    /// Absolute URL of the contacts collection.
    pub fn contactos_url(&self) -> String {
        let base = self.base_url();
        let path = self.resource_path();
        if base.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", base, path)
        }
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::new(self.max_retries, self.retry_delays_ms.clone())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_delays(value: &str) -> Result<Vec<u64>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .with_context(|| format!("Invalid {} entry: {}", ENV_RETRY_DELAYS_MS, s))
        })
        .collect()
}
