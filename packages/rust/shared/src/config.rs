//! Application configuration for Tiki.
//!
//! User config lives at `~/.tiki/tiki.toml`.
//! Environment variables override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, TikiError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tiki.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".tiki";

/// Overrides the extraction server URL.
pub const TIKA_SERVER_URL_ENV: &str = "TIKA_SERVER_URL";

/// Overrides the enrichment model identifier.
pub const CLAUDE_MODEL_ENV: &str = "CLAUDE_MODEL";

// ---------------------------------------------------------------------------
// Config structs (matching tiki.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Document extraction service.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Language-model enrichment service.
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the HTTP API binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".into()
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// libSQL database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Root directory for uploaded files.
    #[serde(default = "default_media_dir")]
    pub media_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            media_dir: default_media_dir(),
        }
    }
}

fn default_database_path() -> String {
    "var/tiki.db".into()
}
fn default_media_dir() -> String {
    "var/media".into()
}

/// `[extraction]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Base URL of the Apache Tika server.
    #[serde(default = "default_tika_url")]
    pub server_url: String,

    #[serde(default = "default_extraction_timeout")]
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            server_url: default_tika_url(),
            timeout_secs: default_extraction_timeout(),
        }
    }
}

fn default_tika_url() -> String {
    "http://localhost:9998".into()
}
fn default_extraction_timeout() -> u64 {
    120
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the Anthropic API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_enrichment_timeout")]
    pub timeout_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            api_url: default_api_url(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_enrichment_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_api_url() -> String {
    "https://api.anthropic.com".into()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_enrichment_timeout() -> u64 {
    60
}

impl EnrichmentConfig {
    /// The API key, if its env var is set and non-empty.
    ///
    /// Enrichment runs only when this returns `Some`.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }
}

impl AppConfig {
    /// Apply the environment overrides used by existing deployments.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(TIKA_SERVER_URL_ENV) {
            if !url.is_empty() {
                self.extraction.server_url = url;
            }
        }
        if let Ok(model) = std::env::var(CLAUDE_MODEL_ENV) {
            if !model.is_empty() {
                self.enrichment.model = model;
            }
        }
    }

    /// Check that service URLs parse and limits are sane.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("extraction.server_url", &self.extraction.server_url),
            ("enrichment.api_url", &self.enrichment.api_url),
        ] {
            Url::parse(value)
                .map_err(|e| TikiError::config(format!("{name} '{value}' is not a valid URL: {e}")))?;
        }

        if self.enrichment.max_tokens == 0 {
            return Err(TikiError::config("enrichment.max_tokens must be positive"));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.tiki/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| TikiError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.tiki/tiki.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk, with env overrides applied.
/// Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    let mut config = if path.exists() {
        load_config_from(&path)?
    } else {
        tracing::debug!(?path, "config file not found, using defaults");
        AppConfig::default()
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TikiError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| TikiError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TikiError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| TikiError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TikiError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("database_path"));
        assert!(toml_str.contains("ANTHROPIC_API_KEY"));
        assert!(toml_str.contains("http://localhost:9998"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[extraction]
server_url = "http://tika.internal:9998"

[enrichment]
model = "claude-3-5-haiku-latest"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.extraction.server_url, "http://tika.internal:9998");
        assert_eq!(config.extraction.timeout_secs, 120);
        assert_eq!(config.enrichment.model, "claude-3-5-haiku-latest");
        assert_eq!(config.enrichment.max_tokens, 1024);
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn default_config_validates() {
        AppConfig::default().validate().expect("defaults are valid");
    }

    #[test]
    fn invalid_url_is_rejected() {
        let mut config = AppConfig::default();
        config.extraction.server_url = "not a url".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("extraction.server_url"));
    }

    #[test]
    fn missing_api_key_disables_enrichment() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.enrichment.api_key_env = "TIKI_TEST_NONEXISTENT_KEY_12345".into();
        assert!(config.enrichment.api_key().is_none());
    }
}
