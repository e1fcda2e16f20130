use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::ai::catalog::{ModelPreference, default_preferences};
use crate::ai::chat::ModelSwitch;

pub const DEFAULT_SECRETS_PATH: &str = ".gemini-chat/secrets.toml";
pub const DEFAULT_API_HOSTNAME: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read secrets file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid secrets file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("GEMINI_API_KEY not found in {0}")]
    MissingCredential(PathBuf),
}

#[derive(Deserialize, Default)]
struct ChatSection {
    #[serde(default)]
    on_model_switch: ModelSwitch,
}

// Keys follow the secrets file convention of upper case credentials
#[derive(Deserialize)]
struct SecretsFile {
    #[serde(rename = "GEMINI_API_KEY")]
    api_key: Option<String>,
    #[serde(rename = "GEMINI_API_HOST")]
    api_hostname: Option<String>,
    system_instruction: Option<String>,
    models: Option<Vec<ModelPreference>>,
    #[serde(default)]
    chat: ChatSection,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_key: String,
    pub api_hostname: String,
    pub preferences: Vec<ModelPreference>,
    pub system_instruction: Option<String>,
    pub model_switch: ModelSwitch,
}

impl AppConfig {
    /// Where to find the secrets file: the path given on the command
    /// line, then `GEMINI_CHAT_SECRETS`, then the default location.
    pub fn secrets_path(cli_path: Option<PathBuf>) -> PathBuf {
        cli_path
            .or_else(|| env::var("GEMINI_CHAT_SECRETS").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SECRETS_PATH))
    }

    /// Read and validate the secrets file at `path`.
    /// `GEMINI_CHAT_API_HOST` overrides the API host from the file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&contents, path)?;
        if let Ok(host) = env::var("GEMINI_CHAT_API_HOST") {
            config.api_hostname = host;
        }
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let secrets: SecretsFile = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let api_key = secrets
            .api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingCredential(path.to_path_buf()))?;

        let api_hostname = secrets
            .api_hostname
            .unwrap_or_else(|| DEFAULT_API_HOSTNAME.to_string())
            .trim_end_matches('/')
            .to_string();

        let preferences = secrets
            .models
            .filter(|m| !m.is_empty())
            .unwrap_or_else(default_preferences);

        Ok(Self {
            api_key,
            api_hostname,
            preferences,
            system_instruction: secrets.system_instruction.filter(|s| !s.trim().is_empty()),
            model_switch: secrets.chat.on_model_switch,
        })
    }
}
