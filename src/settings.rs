use crate::utils::crypto::generate_secret;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading [`ClientSettings`]
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        source: basic_toml::Error,
    },
    #[error("invalid API base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("logger initialization failed: {0}")]
    Logger(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClientSettings {
    pub api: ApiSettings,
    pub session: SessionSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Tokens expiring within this many seconds are refreshed before use
    pub refresh_margin_seconds: u64,
}

/// Where the credential vault keeps its entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub path: String,
    /// Encrypts the file backend; generated at load time when empty
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            timeout_seconds: 30,
            user_agent: format!("stokvel-session/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            refresh_margin_seconds: 300,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: ".stokvel/session.json".to_string(),
            secret: String::new(), // Will be generated if empty
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ClientSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// Also loads `.env` and initializes the logger.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A settings file cannot be read or parsed
    /// - The API base URL is not a valid absolute URL
    /// - The logger cannot be initialized
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_env_file();

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        Self::initialize_logging(&settings.logging)?;

        settings.validate()?;
        Self::ensure_storage_secret(&mut settings.storage);
        Ok(settings)
    }

    fn initialize_logging(logging: &LoggingSettings) -> Result<(), SettingsError> {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&logging.level))
            .try_init()
            .map_err(|e| SettingsError::Logger(e.to_string()))
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `STOKVEL_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    fn load_base_settings() -> Result<Self, SettingsError> {
        let mut settings = Self::default();

        let default_config_path = PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_file(&default_config_path)?;
            log::debug!("Loaded base settings from {}", default_config_path.display());
        }

        if let Ok(secrets_dir) = std::env::var("STOKVEL_SECRETS_DIR") {
            let secrets_path = Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::from_file(&secrets_path)?;
                log::debug!("Overriding settings from {}", secrets_path.display());
            } else {
                log::debug!(
                    "STOKVEL_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Parse one settings file
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Io`] or [`SettingsError::Toml`].
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| SettingsError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse settings from TOML text; missing tables and keys take defaults
    ///
    /// # Errors
    ///
    /// Returns the parser error for malformed TOML.
    pub fn from_toml(content: &str) -> Result<Self, basic_toml::Error> {
        basic_toml::from_str(content)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_api_env_overrides(&mut settings.api);
        Self::apply_numeric_env_override(
            "REFRESH_MARGIN_SECONDS",
            &mut settings.session.refresh_margin_seconds,
        );
        Self::apply_storage_env_overrides(&mut settings.storage);
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            settings.logging.level = log_level;
        }
    }

    fn apply_api_env_overrides(api: &mut ApiSettings) {
        if let Ok(base_url) = std::env::var("API_BASE_URL") {
            api.base_url = base_url;
        }
        Self::apply_numeric_env_override("API_TIMEOUT_SECONDS", &mut api.timeout_seconds);
        if let Ok(user_agent) = std::env::var("API_USER_AGENT") {
            api.user_agent = user_agent;
        }
    }

    fn apply_storage_env_overrides(storage: &mut StorageSettings) {
        if let Ok(backend) = std::env::var("VAULT_BACKEND") {
            match backend.to_ascii_lowercase().as_str() {
                "memory" => storage.backend = StorageBackend::Memory,
                "file" => storage.backend = StorageBackend::File,
                other => log::warn!("Ignoring unknown VAULT_BACKEND '{other}'"),
            }
        }
        if let Ok(path) = std::env::var("VAULT_PATH") {
            storage.path = path;
        }
        if let Ok(secret) = std::env::var("VAULT_SECRET") {
            if !secret.is_empty() {
                storage.secret = secret;
            }
        }
    }

    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            match value_str.parse::<u64>() {
                Ok(value) => *target = value,
                Err(_) => log::warn!("Ignoring non-numeric {env_var}='{value_str}'"),
            }
        }
    }

    /// Generate a random vault secret when none is configured
    pub fn ensure_storage_secret(storage: &mut StorageSettings) {
        if storage.secret.is_empty() {
            storage.secret = generate_secret();
            if storage.backend == StorageBackend::File {
                log::warn!("Using an auto-generated vault secret");
                log::warn!("Persisted sessions will not survive a restart; set VAULT_SECRET or [storage] secret");
            }
        }
    }

    /// Check that the settings can build a client
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidBaseUrl`] unless the base URL is an
    /// absolute `http`/`https` URL.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |reason: String| SettingsError::InvalidBaseUrl {
            url: self.api.base_url.clone(),
            reason,
        };
        let url = url::Url::parse(&self.api.base_url).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(invalid(format!("unsupported scheme '{scheme}'"))),
        }
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_seconds)
    }

    #[must_use]
    pub fn refresh_margin(&self) -> chrono::Duration {
        i64::try_from(self.session.refresh_margin_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }
}
