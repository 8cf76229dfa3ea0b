//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with help
//! text and a stable exit code per failure class.

use miette::Diagnostic;
use thiserror::Error;

use scrybridge_config::ConfigError;
use scrybridge_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to hub at {url}: {reason}")]
    #[diagnostic(
        code(scrybridge::connection_failed),
        help("Check that the hub is running and reachable, and that --host is correct.")
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("TLS error: {message}")]
    #[diagnostic(
        code(scrybridge::tls_error),
        help(
            "Hubs usually present self-signed certificates.\n\
             Use --insecure (-k) to accept them, or set ca_cert in the config file."
        )
    )]
    Tls { message: String },

    #[error("Hub request timed out after {seconds}s")]
    #[diagnostic(
        code(scrybridge::timeout),
        help("Increase the timeout with --timeout or check hub responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(scrybridge::auth_failed),
        help("Verify --username and --password (or SCRYBRIDGE_USERNAME / SCRYBRIDGE_PASSWORD).")
    )]
    AuthFailed { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid configuration")]
    #[diagnostic(code(scrybridge::config), help("Config file: {path}"))]
    Config {
        #[source]
        source: ConfigError,
        path: String,
    },

    // ── Runtime ──────────────────────────────────────────────────────
    #[error("Cannot listen on {addr}")]
    #[diagnostic(
        code(scrybridge::bind),
        help("Another process may be using the port. Pick another with --port.")
    )]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Hub API error: {message}")]
    #[diagnostic(code(scrybridge::api_error))]
    Api { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(scrybridge::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    pub fn config(source: ConfigError) -> Self {
        Self::Config {
            source,
            path: scrybridge_config::config_path().display().to_string(),
        }
    }

    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Tls { .. } | Self::Timeout { .. } => {
                exit_code::CONNECTION
            }
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::Config { .. } => exit_code::CONFIG,
            Self::Bind { .. } | Self::Api { .. } | Self::Io(_) | Self::Json(_) => exit_code::GENERAL,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::config(err)
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => Self::ConnectionFailed { url, reason },
            CoreError::AuthenticationFailed { message } => Self::AuthFailed { message },
            CoreError::Timeout { timeout_secs } => Self::Timeout {
                seconds: timeout_secs,
            },
            CoreError::Tls { message } => Self::Tls { message },
            CoreError::Config { message } => Self::config(ConfigError::Validation {
                field: "host".into(),
                reason: message,
            }),
            other => Self::Api {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_by_class() {
        let auth: CliError = CoreError::AuthenticationFailed {
            message: "bad credentials".into(),
        }
        .into();
        assert_eq!(auth.exit_code(), exit_code::AUTH);

        let conn: CliError = CoreError::ConnectionFailed {
            url: "https://hub/".into(),
            reason: "refused".into(),
        }
        .into();
        assert_eq!(conn.exit_code(), exit_code::CONNECTION);

        let config: CliError = ConfigError::Missing {
            field: "hub host",
            flag: "host",
            env: "HOST",
        }
        .into();
        assert_eq!(config.exit_code(), exit_code::CONFIG);

        let other: CliError = CoreError::SnapshotUnavailable {
            device_id: "x".into(),
        }.into();
        assert_eq!(other.exit_code(), exit_code::GENERAL);
    }
}
