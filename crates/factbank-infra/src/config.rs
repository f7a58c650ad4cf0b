//! Configuration loading for factbank.
//!
//! Reads `config.toml` from the data directory (`~/.factbank/` in production)
//! and deserializes it into [`FactbankConfig`]. Falls back to defaults when
//! the file is missing or malformed.

use std::path::{Path, PathBuf};

use secrecy::SecretString;

use factbank_types::config::{FactbankConfig, StoreConfig};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "FACTBANK_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `FACTBANK_DATA_DIR` environment variable
/// 2. `~/.factbank`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".factbank");
    }

    // Last resort: current directory
    PathBuf::from(".factbank")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`FactbankConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
pub async fn load_config(data_dir: &Path) -> FactbankConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return FactbankConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return FactbankConfig::default();
        }
    };

    match toml::from_str::<FactbankConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            FactbankConfig::default()
        }
    }
}

/// Where the LanceDB store lives: the configured path, else `{data_dir}/vector_store`.
pub fn store_path(store: &StoreConfig, data_dir: &Path) -> PathBuf {
    store
        .path
        .clone()
        .unwrap_or_else(|| data_dir.join("vector_store"))
}

/// Read an API key from the environment variable named in config.
///
/// Returns `None` when the name is empty, the variable is unset, or its value
/// is blank or not valid Unicode.
pub fn resolve_api_key(env_name: &str) -> Option<SecretString> {
    if env_name.trim().is_empty() {
        return None;
    }
    match std::env::var(env_name) {
        Ok(value) if !value.trim().is_empty() => Some(SecretString::from(value)),
        Ok(_) => None,
        Err(std::env::VarError::NotPresent) => None,
        Err(std::env::VarError::NotUnicode(_)) => {
            tracing::warn!(env = env_name, "API key variable is not valid Unicode, ignoring");
            None
        }
    }
}
