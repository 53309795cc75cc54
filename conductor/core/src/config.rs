//! Conductor Configuration
//!
//! Defaults, overlaid by an optional TOML file, overlaid by `PURESOUL_*`
//! environment variables.
//!
//! ```toml
//! # ~/.config/puresoul/conductor.toml
//! api_base_url = "https://api.puresoul.example"
//! window_size = 10
//! tick_interval_ms = 1000
//! credit_consumption = "client_consume"
//! detector = "expression"
//! model_sources = ["https://cdn.example/weights"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detector::{BackendKind, ExpressionBackend, ModelSource};

/// Configuration load failure
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: toml::de::Error,
    },

    /// Values are out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Who deducts a credit for a successful turn
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditConsumption {
    /// The client calls the consume endpoint after each successful reply
    #[default]
    ClientConsume,
    /// The chat endpoint deducts; the client only refreshes
    ServerSide,
}

/// Runtime settings for the conductor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    /// Remote service base URL
    pub api_base_url: String,
    /// Bearer token for the remote service
    pub auth_token: Option<String>,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
    /// Samples per verdict
    pub window_size: usize,
    /// Samples kept for "recent detections"
    pub recent_capacity: usize,
    /// Detection period in milliseconds
    pub tick_interval_ms: u64,
    /// Detector setup bound in seconds
    pub init_timeout_secs: u64,
    /// Per-item playback bound in seconds
    pub playback_timeout_secs: u64,
    /// Turns sent as history with ephemeral sessions
    pub history_limit: usize,
    /// Credit deduction policy
    pub credit_consumption: CreditConsumption,
    /// Which detector backend to run
    pub detector: BackendKind,
    /// Model source base URLs, in preference order (empty: backend default)
    pub model_sources: Vec<String>,
    /// Assistant line shown when the server refuses a turn for credits
    pub denial_apology: String,
    /// Assistant line shown when the turn request fails
    pub connection_apology: String,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000".to_string(),
            auth_token: None,
            request_timeout_secs: 60,
            window_size: crate::aggregator::DEFAULT_WINDOW_SIZE,
            recent_capacity: crate::emotion::DEFAULT_RECENT_CAPACITY,
            tick_interval_ms: 1000,
            init_timeout_secs: 15,
            playback_timeout_secs: 60,
            history_limit: 6,
            credit_consumption: CreditConsumption::default(),
            detector: BackendKind::Blendshape,
            model_sources: Vec::new(),
            denial_apology:
                "Your free credits are used up. Please recharge to continue our session."
                    .to_string(),
            connection_apology:
                "Main thoda connection error face kar raha hoon, but main sun raha hoon. Please continue."
                    .to_string(),
        }
    }
}

impl ConductorConfig {
    /// Defaults overlaid with environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// `$XDG_CONFIG_HOME/puresoul/conductor.toml`
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("puresoul").join("conductor.toml"))
    }

    /// Parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Full load: defaults, then file, then environment
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };
        let config = base.with_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `PURESOUL_*` overrides read through `lookup`
    #[must_use]
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }

        if let Some(url) = lookup("PURESOUL_API_URL") {
            self.api_base_url = url;
        }
        if let Some(token) = lookup("PURESOUL_AUTH_TOKEN") {
            self.auth_token = Some(token);
        }
        self.request_timeout_secs =
            parsed(&lookup, "PURESOUL_REQUEST_TIMEOUT_SECS").unwrap_or(self.request_timeout_secs);
        self.window_size = parsed(&lookup, "PURESOUL_WINDOW_SIZE").unwrap_or(self.window_size);
        self.tick_interval_ms = parsed(&lookup, "PURESOUL_TICK_MS").unwrap_or(self.tick_interval_ms);
        self.init_timeout_secs =
            parsed(&lookup, "PURESOUL_INIT_TIMEOUT_SECS").unwrap_or(self.init_timeout_secs);
        self.playback_timeout_secs =
            parsed(&lookup, "PURESOUL_PLAYBACK_TIMEOUT_SECS").unwrap_or(self.playback_timeout_secs);
        self.history_limit = parsed(&lookup, "PURESOUL_HISTORY_LIMIT").unwrap_or(self.history_limit);

        match lookup("PURESOUL_CREDIT_CONSUMPTION").as_deref().map(str::trim) {
            Some("client" | "client_consume") => {
                self.credit_consumption = CreditConsumption::ClientConsume;
            }
            Some("server" | "server_side") => self.credit_consumption = CreditConsumption::ServerSide,
            _ => {}
        }
        match lookup("PURESOUL_DETECTOR").as_deref().map(str::trim) {
            Some("blendshape") => self.detector = BackendKind::Blendshape,
            Some("expression") => self.detector = BackendKind::Expression,
            Some("cnn") => self.detector = BackendKind::Cnn,
            _ => {}
        }
        if let Some(sources) = lookup("PURESOUL_MODEL_SOURCES") {
            self.model_sources = sources
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        self
    }

    /// Reject values the conductor cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::Invalid("window_size must be at least 1".to_string()));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be positive".to_string()));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api_base_url is empty".to_string()));
        }
        Ok(())
    }

    /// Detection period
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Detector setup bound
    #[must_use]
    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    /// Per-item playback bound
    #[must_use]
    pub fn playback_timeout(&self) -> Duration {
        Duration::from_secs(self.playback_timeout_secs)
    }

    /// HTTP request timeout
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Model sources for the configured detector
    ///
    /// With none configured the expression detector falls back to its public
    /// mirrors; the other backends load bundled assets.
    #[must_use]
    pub fn sources(&self) -> Vec<ModelSource> {
        if self.model_sources.is_empty() && self.detector == BackendKind::Expression {
            return ExpressionBackend::default_sources();
        }
        self.model_sources.iter().map(ModelSource::remote).collect()
    }
}
