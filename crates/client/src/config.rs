//! Client configuration.
//!
//! The host application owns persistence; the client only reads keys
//! through [`ConfigSource`] and validates them once, in
//! [`ClientConfig::from_source`].

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;
use std::time::Duration;

use filemail_protocol::DEFAULT_BASE_URL;
use filemail_protocol::constants::API_KEY_PLACEHOLDER_PREFIX;
use filemail_transfer::{DEFAULT_CHUNK_SIZE, MIN_CHUNK_SIZE};

use crate::error::Error;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Narrow read-only view of wherever settings are stored.
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;
}

impl<S: BuildHasher> ConfigSource for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl ConfigSource for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }
}

/// Client identification sent with `login` and `initialize`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Source {
    #[default]
    Desktop,
    Web,
}

impl Source {
    pub const fn as_str(self) -> &'static str {
        match self {
            Source::Desktop => "Desktop",
            Source::Web => "web",
        }
    }
}

impl std::str::FromStr for Source {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "desktop" => Ok(Source::Desktop),
            "web" => Ok(Source::Web),
            other => Err(Error::Config(format!("unknown source: {other}"))),
        }
    }
}

/// Optional provider settings, keyed by a closed set of names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Extension {
    /// Days a new transfer stays available (1–90).
    DefaultDays,
    /// Download limit for new transfers.
    DefaultDownloads,
    /// Notify the sender when recipients download.
    Notify,
    /// Confirm to the sender once the upload finishes.
    Confirmation,
    /// Text appended to transfer messages.
    Signature,
}

impl Extension {
    pub const ALL: [Extension; 5] = [
        Extension::DefaultDays,
        Extension::DefaultDownloads,
        Extension::Notify,
        Extension::Confirmation,
        Extension::Signature,
    ];

    /// Key under which the setting is stored.
    pub const fn key(self) -> &'static str {
        match self {
            Extension::DefaultDays => "days",
            Extension::DefaultDownloads => "downloads",
            Extension::Notify => "notify",
            Extension::Confirmation => "confirmation",
            Extension::Signature => "signature",
        }
    }

    fn validate(self, value: &str) -> Result<(), Error> {
        let bad = |what: &str| Error::Config(format!("{}: {what}, got {value:?}", self.key()));
        match self {
            Extension::DefaultDays => match value.trim().parse::<u32>() {
                Ok(d) if (1..=90).contains(&d) => Ok(()),
                _ => Err(bad("expected 1-90")),
            },
            Extension::DefaultDownloads => match value.trim().parse::<u32>() {
                Ok(n) if n > 0 => Ok(()),
                _ => Err(bad("expected a positive integer")),
            },
            Extension::Notify | Extension::Confirmation => {
                parse_bool(value).map(|_| ()).ok_or_else(|| bad("expected a boolean"))
            }
            Extension::Signature => Ok(()),
        }
    }
}

/// Validated client settings.
#[derive(Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub username: String,
    pub password: Option<String>,
    pub source: Source,
    pub base_url: String,
    pub chunk_size: usize,
    pub timeout: Duration,
    /// Compute md5 checksums for uploaded files.
    pub checksum: bool,
    extensions: BTreeMap<Extension, String>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("source", &self.source)
            .field("base_url", &self.base_url)
            .field("chunk_size", &self.chunk_size)
            .field("timeout", &self.timeout)
            .field("checksum", &self.checksum)
            .field("extensions", &self.extensions)
            .finish()
    }
}

impl ClientConfig {
    /// Builds a config with defaults for everything but the required keys.
    pub fn new(api_key: impl Into<String>, username: impl Into<String>) -> Result<Self, Error> {
        let config = Self {
            api_key: api_key.into(),
            username: username.into(),
            password: None,
            source: Source::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: DEFAULT_TIMEOUT,
            checksum: true,
            extensions: BTreeMap::new(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates every known key from `source`.
    ///
    /// Keys: `apikey`, `username` (required); `password`, `source`,
    /// `base_url`, `chunk_size`, `timeout` (seconds), `checksum`, plus the
    /// [`Extension`] keys. Unknown keys are ignored.
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self, Error> {
        let get = |key: &str| source.get(key).filter(|v| !v.trim().is_empty());

        let api_key = get("apikey").ok_or_else(|| Error::Config("missing apikey".into()))?;
        let username = get("username").ok_or_else(|| Error::Config("missing username".into()))?;
        let mut config = Self::new(api_key, username)?;

        config.password = get("password");
        if let Some(s) = get("source") {
            config.source = s.parse()?;
        }
        if let Some(url) = get("base_url") {
            config.base_url = url;
        }
        if let Some(size) = get("chunk_size") {
            config.chunk_size = size
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("chunk_size: not a number: {size}")))?;
        }
        if let Some(secs) = get("timeout") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("timeout: not a number: {secs}")))?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(flag) = get("checksum") {
            config.checksum = parse_bool(&flag)
                .ok_or_else(|| Error::Config(format!("checksum: expected a boolean, got {flag:?}")))?;
        }
        for ext in Extension::ALL {
            if let Some(value) = get(ext.key()) {
                config.set_extension(ext, value)?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the rest of the client relies on.
    pub fn validate(&self) -> Result<(), Error> {
        let key = self.api_key.trim();
        if key.is_empty() {
            return Err(Error::Config("missing apikey".into()));
        }
        if key.starts_with(API_KEY_PLACEHOLDER_PREFIX) {
            return Err(Error::Config(
                "apikey is still the placeholder; get a key from filemail.com".into(),
            ));
        }
        if self.username.trim().is_empty() {
            return Err(Error::Config("missing username".into()));
        }
        if self.chunk_size < MIN_CHUNK_SIZE {
            return Err(Error::Config(format!(
                "chunk_size must be at least {MIN_CHUNK_SIZE}, got {}",
                self.chunk_size
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be positive".into()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "base_url must be an http(s) URL: {}",
                self.base_url
            )));
        }
        Ok(())
    }

    pub fn extension(&self, ext: Extension) -> Option<&str> {
        self.extensions.get(&ext).map(String::as_str)
    }

    pub fn set_extension(&mut self, ext: Extension, value: impl Into<String>) -> Result<(), Error> {
        let value = value.into();
        ext.validate(&value)?;
        self.extensions.insert(ext, value);
        Ok(())
    }

    pub fn extensions(&self) -> &BTreeMap<Extension, String> {
        &self.extensions
    }

    pub fn default_days(&self) -> Option<u32> {
        self.extension(Extension::DefaultDays)?.trim().parse().ok()
    }

    pub fn default_downloads(&self) -> Option<u32> {
        self.extension(Extension::DefaultDownloads)?.trim().parse().ok()
    }

    pub fn notify(&self) -> Option<bool> {
        parse_bool(self.extension(Extension::Notify)?)
    }

    pub fn confirmation(&self) -> Option<bool> {
        parse_bool(self.extension(Extension::Confirmation)?)
    }

    pub fn signature(&self) -> Option<&str> {
        self.extension(Extension::Signature)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
