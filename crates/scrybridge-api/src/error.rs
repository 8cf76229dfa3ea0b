use thiserror::Error;

/// Top-level error type for the `scrybridge-api` crate.
///
/// Covers every failure mode across the hub surfaces the bridge touches:
/// login, HTTP transport, the realtime socket, and snapshot retrieval.
/// `scrybridge-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected (bad credentials, explicit error payload, no token).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Realtime socket ─────────────────────────────────────────────
    /// WebSocket connection failed or dropped with an error.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// The peer spoke something other than Engine.IO / Socket.IO.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The hub refused the Socket.IO namespace connection.
    #[error("Hub rejected the event connection: {message}")]
    ConnectRejected { message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Snapshots ───────────────────────────────────────────────────
    /// Every snapshot URL template was tried and none yielded an image.
    #[error("No snapshot available for device {device_id} after {attempts} attempt(s)")]
    SnapshotUnavailable { device_id: String, attempts: usize },
}

impl Error {
    /// Returns `true` if this error came from the login exchange.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. }
            | Self::WebSocketConnect(_)
            | Self::Protocol(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_are_not_transient() {
        let err = Error::Authentication {
            message: "bad credentials".into(),
        };
        assert!(err.is_auth());
        assert!(!err.is_transient());
    }

    #[test]
    fn socket_errors_are_transient() {
        assert!(Error::WebSocketConnect("reset".into()).is_transient());
        assert!(Error::Protocol("garbage".into()).is_transient());
        assert!(
            !Error::SnapshotUnavailable {
                device_id: "cam1".into(),
                attempts: 2
            }
            .is_transient()
        );
    }
}
