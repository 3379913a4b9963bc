//! TOML-based settings
//!
//! # Example Configuration
//!
//! ```toml
//! default_search_level = "LEVEL_3"
//! protocol = "events"
//!
//! [endpoint]
//! model = "gemini-2.5-pro"
//!
//! [generation]
//! temperature = 0.3
//! language = "English"
//!
//! [retry]
//! max_retries = 3
//!
//! [[knowledge_base.sources]]
//! url = "https://github.com/XTLS/Xray-core"
//! ```

mod types;


pub use types::{
    EndpointConfig, FeaturesConfig, GenerationConfig, KnowledgeBaseConfig, RetryConfig,
    WireProtocol, DEFAULT_BASE_URL, DEFAULT_SYSTEM_INSTRUCTION,
};

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::protocol::SearchLevel;

pub const CONFIG_FILE_NAME: &str = "rahyab.toml";

/// Root settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Settings {
    /// Search level used when the caller does not pick one
    #[serde(default)]
    pub default_search_level: SearchLevel,

    /// Output format requested from the model
    #[serde(default)]
    pub protocol: WireProtocol,

    #[serde(default)]
    pub endpoint: EndpointConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub features: FeaturesConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub knowledge_base: KnowledgeBaseConfig,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error occurred while reading/writing config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    /// TOML serialization error
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    /// No home directory to place user files in
    #[error("Could not determine home directory")]
    NoHomeDir,
}

impl Settings {
    /// Load settings from file.
    ///
    /// Searches `./rahyab.toml`, then `~/.config/rahyab/rahyab.toml`, and
    /// falls back to defaults when neither exists. Environment overrides are
    /// not applied here; see [`Settings::load_with_env`].
    pub fn load() -> Result<Self, ConfigError> {
        let current_dir_path = Path::new(CONFIG_FILE_NAME);
        if current_dir_path.exists() {
            return Self::load_from(current_dir_path);
        }

        let user_config_path = Self::user_config_path()?;
        if user_config_path.exists() {
            return Self::load_from(&user_config_path);
        }

        Ok(Settings::default())
    }

    /// Load settings and apply environment overrides.
    pub fn load_with_env() -> Result<Self, ConfigError> {
        let mut settings = Self::load()?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save settings as TOML.
    ///
    /// Writes to the user config location when no path is given. Parent
    /// directories are created as needed. The API key is never written.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let target_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::user_config_path()?,
        };

        if let Some(parent) = target_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut persisted = self.clone();
        persisted.endpoint.api_key = None;
        let toml_string = toml::to_string_pretty(&persisted)?;
        fs::write(&target_path, toml_string)?;

        Ok(target_path)
    }

    /// `~/.config/rahyab/rahyab.toml`
    pub fn user_config_path() -> Result<PathBuf, ConfigError> {
        let home_dir = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home_dir.join(".config").join("rahyab").join(CONFIG_FILE_NAME))
    }

    /// Apply environment variable overrides
    ///
    /// - `RAHYAB_API_KEY`, then `GEMINI_API_KEY`, then `API_KEY` → `endpoint.api_key`
    /// - `RAHYAB_MODEL` → `endpoint.model`
    /// - `RAHYAB_BASE_URL` → `endpoint.base_url`
    /// - `RAHYAB_MAX_RETRIES` → `retry.max_retries`
    /// - `RAHYAB_PROTOCOL` → `protocol`
    ///
    /// Invalid values are reported as warnings and ignored.
    pub fn apply_env_overrides(&mut self) {
        let api_key = ["RAHYAB_API_KEY", "GEMINI_API_KEY", "API_KEY"]
            .iter()
            .filter_map(|name| env::var(name).ok())
            .find(|value| !value.trim().is_empty());
        if let Some(api_key) = api_key {
            self.endpoint.api_key = Some(api_key);
        }

        if let Ok(model) = env::var("RAHYAB_MODEL") {
            if !model.is_empty() {
                self.endpoint.model = model;
            }
        }

        if let Ok(base_url) = env::var("RAHYAB_BASE_URL") {
            if !base_url.is_empty() {
                self.endpoint.base_url = base_url;
            }
        }

        if let Ok(retries) = env::var("RAHYAB_MAX_RETRIES") {
            match retries.trim().parse::<u32>() {
                Ok(max_retries) => self.retry.max_retries = max_retries,
                Err(_) => tracing::warn!("Invalid RAHYAB_MAX_RETRIES value: {}", retries),
            }
        }

        if let Ok(protocol) = env::var("RAHYAB_PROTOCOL") {
            match protocol.parse::<WireProtocol>() {
                Ok(protocol) => self.protocol = protocol,
                Err(_) => tracing::warn!("Invalid RAHYAB_PROTOCOL value: {}", protocol),
            }
        }
    }

    /// System instruction with the response-language suffix.
    pub fn system_instruction(&self) -> String {
        let base = self.generation.system_instruction.trim();
        let base = if base.is_empty() {
            "You are RAH-YAB, an AI strategic intelligence analyst."
        } else {
            base
        };
        format!(
            "{} You will always respond in {}.",
            base, self.generation.language
        )
    }

    /// Whether an API key is available after overrides.
    pub fn has_api_key(&self) -> bool {
        self.endpoint
            .api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }
}
