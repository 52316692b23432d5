use std::fmt;
use std::path::{Path, PathBuf};

use crate::store::DEFAULT_STORE_PATH;

pub const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:8090";

/// Dotenv file, relative to the working directory.
pub const DOTENV_PATH: &str = "../.env";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// A required variable is unset or blank.
    MissingVar(&'static str),
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingVar(name) => write!(f, "{} environment variable is required", name),
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

pub struct Config {
    pub openai_api_key: String,
    /// Base URL of the WhatsApp bridge.
    pub bridge_url: String,
    /// Device store owned by the bridge.
    pub store_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let openai_api_key = lookup("OPENAI_API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingVar("OPENAI_API_KEY"))?;

        let bridge_url = lookup("WHATSAPP_BRIDGE_URL")
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BRIDGE_URL.to_string());
        if !(bridge_url.starts_with("http://") || bridge_url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "WHATSAPP_BRIDGE_URL must start with http:// or https:// (got '{}')",
                bridge_url
            )));
        }

        Ok(Self {
            openai_api_key,
            bridge_url,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
        })
    }
}

/// Log files live next to the device store.
pub fn log_dir() -> PathBuf {
    Path::new(DEFAULT_STORE_PATH)
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("logs")
}

/// Load variables from a dotenv file without overriding ones already set.
pub fn load_dotenv<P: AsRef<Path>>(path: P) -> Result<(), dotenvy::Error> {
    dotenvy::from_path(path.as_ref())
}
