use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf, time::Duration};

/// Public Nominatim reverse endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org/reverse";

/// Contact address sent as `email`, as Nominatim's usage policy asks for.
pub const DEFAULT_CONTACT_EMAIL: &str = "geocode-cli@example.org";

/// Overrides the cache directory from the config file.
pub const CACHE_DIR_ENV: &str = "GEOCODE_CACHE_DIR";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// endpoint = "https://nominatim.openstreetmap.org/reverse"
/// contact_email = "me@example.org"
/// language = "en-gb"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoint: String,
    pub contact_email: String,

    /// Explicit `accept-language`; the system locale is used when unset.
    pub language: Option<String>,

    pub cache_dir: Option<PathBuf>,
    pub cache_enabled: bool,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            contact_email: DEFAULT_CONTACT_EMAIL.to_string(),
            language: None,
            cache_dir: None,
            cache_enabled: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load config from disk, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(contents)?;
        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("org", "geocode", "geocode")
            .ok_or_else(|| anyhow!("Could not determine platform directories"))
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Cache directory: `GEOCODE_CACHE_DIR`, then `cache_dir`, then the platform cache dir.
    pub fn resolved_cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = env::var_os(CACHE_DIR_ENV).filter(|dir| !dir.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }

        Ok(Self::project_dirs()?.cache_dir().to_path_buf())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Set or clear the explicit language. Empty input clears it.
    pub fn set_language(&mut self, language: Option<String>) {
        self.language = language.filter(|tag| !tag.trim().is_empty());
    }
}
