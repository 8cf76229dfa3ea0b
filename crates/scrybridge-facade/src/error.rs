//! Facade error type.
//!
//! Every handler failure ends up here and leaves as a JSON body of the form
//! `{"error": "<message>"}` with a matching status code.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FacadeError {
    #[error("Device not found")]
    DeviceNotFound { id: String },

    #[error("Could not fetch snapshot")]
    SnapshotUnavailable { device_id: String },

    #[error("Unknown endpoint")]
    UnknownEndpoint { path: String },
}

impl FacadeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DeviceNotFound { .. } | Self::UnknownEndpoint { .. } => StatusCode::NOT_FOUND,
            Self::SnapshotUnavailable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for FacadeError {
    fn into_response(self) -> Response {
        match &self {
            Self::DeviceNotFound { id } => debug!(device_id = %id, "device not found"),
            Self::UnknownEndpoint { path } => debug!(%path, "unknown endpoint"),
            Self::SnapshotUnavailable { device_id } => {
                warn!(%device_id, "no snapshot template produced an image");
            }
        }
        (self.status_code(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(
            FacadeError::DeviceNotFound { id: "x".into() }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            FacadeError::UnknownEndpoint { path: "/x".into() }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            FacadeError::SnapshotUnavailable { device_id: "x".into() }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn messages_are_fixed() {
        assert_eq!(FacadeError::DeviceNotFound { id: "cam9".into() }.to_string(), "Device not found");
        assert_eq!(
            FacadeError::SnapshotUnavailable { device_id: "cam9".into() }.to_string(),
            "Could not fetch snapshot"
        );
    }
}
