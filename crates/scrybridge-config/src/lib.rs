//! Configuration for the scrybridge binary.
//!
//! Layers built-in defaults, an optional TOML file, `SCRYBRIDGE_*`
//! environment variables and command-line overrides with `figment`, then
//! validates the result into a `scrybridge_core::BridgeConfig`. No config
//! file is required: a host and credentials from flags or env are enough.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use scrybridge_core::{
    BridgeConfig, DEFAULT_ENGINE_IO_PATH, DEFAULT_MIN_SNAPSHOT_BYTES, DEFAULT_SNAPSHOT_TEMPLATES,
    ReconnectConfig, StalePolicy, TlsVerification,
};

const ENV_PREFIX: &str = "SCRYBRIDGE_";

/// Keys the CLI reads from the environment itself (see `GlobalOpts`).
/// Leaving them to clap keeps numeric-looking secrets as strings.
const CLI_ENV_KEYS: &[&str] = &["host", "username", "password", "config"];

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no {field} configured (set --{flag} or SCRYBRIDGE_{env})")]
    Missing {
        field: &'static str,
        flag: &'static str,
        env: &'static str,
    },

    #[error("config file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// Every tunable, as it appears in TOML and `SCRYBRIDGE_*` env vars.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Hub base URL (e.g. "https://192.168.1.10:10443").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Plaintext password. Prefer the env var or the interactive prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Facade listen address.
    pub bind: String,
    pub port: u16,

    /// Accept self-signed hub certificates.
    pub insecure: bool,
    /// Custom CA certificate (PEM). Enables verification when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,
    /// Login request timeout, seconds.
    pub timeout: u64,

    pub engine_io_path: String,
    pub keepalive_secs: u64,
    pub handshake_timeout_secs: u64,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_secs: u64,

    pub snapshot_timeout_secs: u64,
    pub snapshot_min_bytes: usize,
    pub snapshot_templates: Vec<String>,

    /// Seconds a device may stay stale before it is dropped. `0` keeps it.
    pub stale_ttl_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: None,
            username: None,
            password: None,
            bind: "127.0.0.1".into(),
            port: 18765,
            insecure: true,
            ca_cert: None,
            timeout: 30,
            engine_io_path: DEFAULT_ENGINE_IO_PATH.into(),
            keepalive_secs: 30,
            handshake_timeout_secs: 10,
            reconnect_initial_ms: 1_000,
            reconnect_max_secs: 30,
            snapshot_timeout_secs: 10,
            snapshot_min_bytes: DEFAULT_MIN_SNAPSHOT_BYTES,
            snapshot_templates: DEFAULT_SNAPSHOT_TEMPLATES
                .iter()
                .map(|t| (*t).to_owned())
                .collect(),
            stale_ttl_secs: 15 * 60,
        }
    }
}

/// Command-line values that win over every other layer.
///
/// `None` fields leave the lower layers untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Platform config file location (e.g. `~/.config/scrybridge/config.toml`).
pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "scrybridge").map_or_else(
        || PathBuf::from(".scrybridge.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Loading ─────────────────────────────────────────────────────────

fn figment(file: &Path, overrides: &Overrides) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(file))
        .merge(Env::prefixed(ENV_PREFIX).ignore(CLI_ENV_KEYS))
        .merge(Serialized::defaults(overrides))
}

/// Load settings from every layer.
///
/// An explicit `path` must exist; the default location is optional.
pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Settings, ConfigError> {
    let file = match path {
        Some(p) if !p.exists() => {
            return Err(ConfigError::FileNotFound {
                path: p.to_path_buf(),
            });
        }
        Some(p) => p.to_path_buf(),
        None => config_path(),
    };

    Ok(figment(&file, overrides).extract()?)
}

// ── Validation ──────────────────────────────────────────────────────

impl Settings {
    /// Validated hub base URL, always ending in `/`.
    pub fn hub_url(&self) -> Result<Url, ConfigError> {
        let raw = self
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(ConfigError::Missing {
                field: "hub host",
                flag: "host",
                env: "HOST",
            })?;

        let mut url = Url::parse(raw).map_err(|e| invalid("host", format!("{raw}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("host", format!("expected http or https, got '{}'", url.scheme())));
        }
        if url.host_str().is_none() {
            return Err(invalid("host", format!("{raw}: no host name")));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Socket address for the facade listener.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind
            .parse()
            .map_err(|_| invalid("bind", format!("not an IP address: {}", self.bind)))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// A configured `ca_cert` always wins over `insecure`.
    pub fn tls(&self) -> TlsVerification {
        if let Some(ref ca) = self.ca_cert {
            TlsVerification::CustomCa(ca.clone())
        } else if self.insecure {
            TlsVerification::DangerAcceptInvalid
        } else {
            TlsVerification::SystemDefaults
        }
    }

    /// Translate into the runtime config, checking every field.
    pub fn to_bridge_config(&self) -> Result<BridgeConfig, ConfigError> {
        let url = self.hub_url()?;

        let username = self
            .username
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::Missing {
                field: "username",
                flag: "username",
                env: "USERNAME",
            })?;
        let password = self
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(ConfigError::Missing {
                field: "password",
                flag: "password",
                env: "PASSWORD",
            })?;

        if self.snapshot_templates.is_empty() {
            return Err(invalid("snapshot_templates", "at least one template is required"));
        }
        if let Some(t) = self.snapshot_templates.iter().find(|t| !t.contains("{id}")) {
            return Err(invalid("snapshot_templates", format!("'{t}' has no {{id}} placeholder")));
        }
        if self.keepalive_secs == 0 {
            return Err(invalid("keepalive_secs", "must be greater than zero"));
        }
        if self.reconnect_initial_ms == 0 {
            return Err(invalid("reconnect_initial_ms", "must be greater than zero"));
        }
        if !self.engine_io_path.starts_with('/') {
            return Err(invalid("engine_io_path", "must start with '/'"));
        }

        let mut config = BridgeConfig::new(url, username, SecretString::from(password.to_owned()));
        config.tls = self.tls();
        config.timeout = Duration::from_secs(self.timeout);
        config.engine_io_path.clone_from(&self.engine_io_path);
        config.keepalive_interval = Duration::from_secs(self.keepalive_secs);
        config.handshake_timeout = Duration::from_secs(self.handshake_timeout_secs);
        config.reconnect = ReconnectConfig {
            initial_delay: Duration::from_millis(self.reconnect_initial_ms),
            max_delay: Duration::from_secs(self.reconnect_max_secs)
                .max(Duration::from_millis(self.reconnect_initial_ms)),
            max_retries: None,
        };
        config.snapshot_templates.clone_from(&self.snapshot_templates);
        config.snapshot_min_bytes = self.snapshot_min_bytes;
        config.snapshot_timeout = Duration::from_secs(self.snapshot_timeout_secs);
        config.stale = StalePolicy {
            ttl: (self.stale_ttl_secs > 0).then(|| Duration::from_secs(self.stale_ttl_secs)),
            ..StalePolicy::default()
        };
        Ok(config)
    }
}
