// ── Core error types ──
//
// Domain errors from scrybridge-core. Consumers never see reqwest or
// tungstenite errors directly; the `From<scrybridge_api::Error>` impl
// translates transport-layer failures into these variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to hub at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Hub request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("TLS error: {message}")]
    Tls { message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Could not fetch snapshot for device {device_id}")]
    SnapshotUnavailable { device_id: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("Hub API error: {message}")]
    Api { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<scrybridge_api::Error> for CoreError {
    fn from(err: scrybridge_api::Error) -> Self {
        use scrybridge_api::Error as Api;

        match err {
            Api::Authentication { message } => Self::AuthenticationFailed { message },
            Api::Transport(e) => Self::ConnectionFailed {
                url: e.url().map_or_else(String::new, ToString::to_string),
                reason: if e.is_timeout() {
                    "request timed out".into()
                } else {
                    e.to_string()
                },
            },
            Api::Timeout { timeout_secs } => Self::Timeout { timeout_secs },
            Api::Tls(message) => Self::Tls { message },
            Api::InvalidUrl(e) => Self::Config {
                message: format!("invalid URL: {e}"),
            },
            Api::SnapshotUnavailable { device_id, .. } => Self::SnapshotUnavailable { device_id },
            Api::WebSocketConnect(reason) => Self::ConnectionFailed {
                url: String::new(),
                reason,
            },
            other => Self::Api {
                message: other.to_string(),
            },
        }
    }
}
