//! CLI configuration file.
//!
//! A flat TOML table read from `$FILEMAIL_CONFIG_PATH`, else
//! `~/.config/filemail/config.toml`:
//!
//! ```toml
//! apikey = "..."
//! username = "me@example.com"
//! password = "..."
//! days = 7
//! notify = true
//! ```
//!
//! `FILEMAIL_API_KEY` overrides `apikey`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use filemail_client::{ClientConfig, ConfigSource};

pub const CONFIG_PATH_ENV: &str = "FILEMAIL_CONFIG_PATH";
pub const API_KEY_ENV: &str = "FILEMAIL_API_KEY";

/// Parsed config file plus environment overrides.
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    table: toml::Table,
    api_key_override: Option<String>,
}

impl FileConfig {
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let table = content.parse::<toml::Table>()?;
        Ok(Self {
            table,
            api_key_override: None,
        })
    }

    /// Reads `path`. A missing file yields an empty config so the
    /// environment alone can supply the key.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn with_api_key_override(mut self, api_key: Option<String>) -> Self {
        self.api_key_override = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    /// Builds the validated client config.
    pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
        Ok(ClientConfig::from_source(self)?)
    }
}

impl ConfigSource for FileConfig {
    fn get(&self, key: &str) -> Option<String> {
        if key == "apikey"
            && let Some(key) = &self.api_key_override
        {
            return Some(key.clone());
        }
        match self.table.get(key)? {
            toml::Value::String(s) => Some(s.clone()),
            toml::Value::Integer(n) => Some(n.to_string()),
            toml::Value::Float(f) => Some(f.to_string()),
            toml::Value::Boolean(b) => Some(b.to_string()),
            other => {
                tracing::warn!(key, value = %other, "ignoring non-scalar config value");
                None
            }
        }
    }
}

/// Config file location: explicit path, then the environment, then the
/// default under the user's config directory.
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(|| config_base_dir().join("filemail").join("config.toml"))
}

fn config_base_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata)
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config")
    }
}
