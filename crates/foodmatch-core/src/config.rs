//! Configuration.
//!
//! Loaded from `config.toml` in the FoodMatch directory:
//!
//! ```text
//! ~/.foodmatch/            # or $FOODMATCH_DIR
//! └── config.toml
//! ```
//!
//! `FOODMATCH_PLACES_API_KEY` overrides `places.api_key`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Google Places Nearby Search endpoint
pub const DEFAULT_PLACES_URL: &str =
    "https://maps.googleapis.com/maps/api/place/nearbysearch/json";

/// Environment variable naming the FoodMatch directory
pub const DIR_ENV: &str = "FOODMATCH_DIR";

/// Environment variable carrying the places API key
pub const API_KEY_ENV: &str = "FOODMATCH_PLACES_API_KEY";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Places provider configuration
    pub places: PlacesConfig,

    /// Session engine configuration
    pub engine: EngineConfig,
}

/// Places provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacesConfig {
    /// API key sent with every search
    pub api_key: String,

    /// Nearby search endpoint (default: Google Places)
    pub base_url: String,

    /// Place type filter (default: "restaurant")
    pub place_type: String,

    /// HTTP request timeout in seconds (default: 10)
    pub request_timeout_secs: u64,

    /// Lifetime of cached search results in seconds, 0 disables
    /// (default: 600 = 10 minutes)
    pub cache_ttl_secs: u64,
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_PLACES_URL.to_string(),
            place_type: "restaurant".to_string(),
            request_timeout_secs: 10,
            cache_ttl_secs: 600,
        }
    }
}

impl PlacesConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Session engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on a single places search in seconds (default: 10)
    pub provider_timeout_secs: u64,

    /// Drop recorded likes when the parameters change (default: true)
    pub clear_agreements_on_update: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider_timeout_secs: 10,
            clear_agreements_on_update: true,
        }
    }
}

impl EngineConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// A zero timeout would fail every search immediately.
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if self.provider_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "engine.provider_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Config {
    /// FoodMatch directory: `$FOODMATCH_DIR`, else `~/.foodmatch`
    pub fn default_dir() -> PathBuf {
        std::env::var(DIR_ENV).map(PathBuf::from).unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".foodmatch")
        })
    }

    /// Default configuration file path
    pub fn default_path() -> PathBuf {
        Self::default_dir().join("config.toml")
    }

    /// Load from the default path, falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::from_path(&path)?
        } else {
            tracing::debug!("No config at {:?}, using defaults", path);
            Self::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&raw)
    }

    /// Parse TOML text.
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Apply environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.places.api_key = key.trim().to_string();
            }
        }
    }

    /// Set the places API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.places.api_key = api_key.into();
        self
    }

    /// Set the places endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.places.base_url = base_url.into();
        self
    }

    /// Set engine configuration
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if self.places.base_url.trim().is_empty() {
            return Err(ConfigValidationError::InvalidValue {
                field: "places.base_url".into(),
                message: "must not be empty".into(),
            });
        }

        if self.places.place_type.trim().is_empty() {
            return Err(ConfigValidationError::InvalidValue {
                field: "places.place_type".into(),
                message: "must not be empty".into(),
            });
        }

        if self.places.request_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "places.request_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        self.engine.validate()
    }

    /// Validate, additionally requiring an API key for the HTTP provider.
    pub fn validate_for_http(&self) -> std::result::Result<(), ConfigValidationError> {
        self.validate()?;
        if self.places.api_key.trim().is_empty() {
            return Err(ConfigValidationError::MissingApiKey);
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("places.api_key is required (set FOODMATCH_PLACES_API_KEY)")]
    MissingApiKey,

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
