// ── Runtime bridge configuration ──
//
// These types describe *how* to reach the hub and how the mirror behaves.
// They carry credential data and tuning, but never touch disk.
// The binary builds a `BridgeConfig` (via `scrybridge-config`) and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use scrybridge_api::realtime::DEFAULT_ENGINE_IO_PATH;
use scrybridge_api::snapshot::{DEFAULT_MIN_SNAPSHOT_BYTES, DEFAULT_SNAPSHOT_TEMPLATES};
use scrybridge_api::{ReconnectConfig, TlsMode, TransportConfig};
use secrecy::SecretString;
use url::Url;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed certs). Default for local hubs.
    #[default]
    DangerAcceptInvalid,
}

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => Self::System,
            TlsVerification::CustomCa(path) => Self::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => Self::DangerAcceptInvalid,
        }
    }
}

/// What to do with devices the hub stops reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalePolicy {
    /// How long a device may be missing from full snapshots before it is
    /// dropped from the mirror. `None` keeps stale devices forever.
    pub ttl: Option<Duration>,
    /// How often the manager looks for expired devices.
    pub sweep_interval: Duration,
}

impl Default for StalePolicy {
    fn default() -> Self {
        Self {
            ttl: Some(Duration::from_secs(15 * 60)),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Everything needed to log in, mirror, and serve a hub.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Hub base URL (e.g. `https://hub.local:10443/`).
    pub url: Url,
    pub username: String,
    pub password: SecretString,
    pub tls: TlsVerification,
    /// Timeout for login and other one-shot HTTP calls.
    pub timeout: Duration,

    /// Engine.IO endpoint path on the hub.
    pub engine_io_path: String,
    pub keepalive_interval: Duration,
    pub handshake_timeout: Duration,
    pub reconnect: ReconnectConfig,

    /// Snapshot URL templates, tried in order.
    pub snapshot_templates: Vec<String>,
    /// Bodies at or below this size are not accepted as images.
    pub snapshot_min_bytes: usize,
    /// Per-template snapshot timeout.
    pub snapshot_timeout: Duration,

    pub stale: StalePolicy,
}

impl BridgeConfig {
    /// Config with defaults for everything but the hub and credentials.
    pub fn new(url: Url, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            url,
            username: username.into(),
            password,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            engine_io_path: DEFAULT_ENGINE_IO_PATH.into(),
            keepalive_interval: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
            snapshot_templates: DEFAULT_SNAPSHOT_TEMPLATES
                .iter()
                .map(|t| (*t).to_owned())
                .collect(),
            snapshot_min_bytes: DEFAULT_MIN_SNAPSHOT_BYTES,
            snapshot_timeout: Duration::from_secs(10),
            stale: StalePolicy::default(),
        }
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: TlsMode::from(&self.tls),
            timeout: self.timeout,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_hub_conventions() {
        let config = BridgeConfig::new(
            Url::parse("https://hub.local:10443/").unwrap(),
            "admin",
            SecretString::from("pw".to_owned()),
        );
        assert_eq!(config.keepalive_interval, Duration::from_secs(30));
        assert_eq!(config.snapshot_templates.len(), 2);
        assert_eq!(config.snapshot_min_bytes, 100);
        assert_eq!(config.engine_io_path, "/endpoint/@scrypted/core/engine.io/api/");
        assert_eq!(config.stale.ttl, Some(Duration::from_secs(900)));
        assert_eq!(config.transport().tls, TlsMode::DangerAcceptInvalid);
    }
}
