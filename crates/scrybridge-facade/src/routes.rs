//! HTTP route handlers.
//!
//! Handlers only read the store; they never wait on the hub connection.
//! The snapshot route is the one exception that talks to the hub, bounded
//! by the fetcher's per-template timeouts.

use std::sync::Arc;

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::{Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, get};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::debug;

use scrybridge_core::{ConnectionState, CoreError, DeviceRecord};

use crate::AppState;
use crate::error::FacadeError;

/// Build the facade router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", read_only(get(status)))
        .route("/devices", read_only(get(devices)))
        .route("/cameras", read_only(get(cameras)))
        .route("/device/{id}/state", read_only(get(device_state)))
        .route("/device/{id}/snapshot", read_only(get(device_snapshot)))
        .fallback(unknown_endpoint)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any method other than GET is reported like an unknown path.
fn read_only(route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.fallback(unknown_endpoint)
}

// ── Response bodies ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub connected: bool,
    pub device_count: usize,
    /// Epoch seconds of the last applied update, `0` before the first.
    pub last_update: i64,
    pub state: ConnectionState,
    pub stale_count: usize,
}

#[derive(Debug, Serialize)]
pub struct DevicesBody {
    pub devices: Vec<Arc<DeviceRecord>>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct CamerasBody {
    pub cameras: Vec<Arc<DeviceRecord>>,
    pub count: usize,
}

// ── Handlers ────────────────────────────────────────────────────────

async fn status(State(state): State<AppState>) -> Json<StatusBody> {
    let status = state.store.status();
    Json(StatusBody {
        connected: status.state.is_connected(),
        device_count: status.device_count,
        last_update: status.last_update.map_or(0, |t| t.timestamp()),
        state: status.state,
        stale_count: status.stale_count,
    })
}

async fn devices(State(state): State<AppState>) -> Json<DevicesBody> {
    let devices = state.store.list();
    Json(DevicesBody {
        count: devices.len(),
        devices,
    })
}

async fn cameras(State(state): State<AppState>) -> Json<CamerasBody> {
    let cameras = state.store.cameras();
    Json(CamerasBody {
        count: cameras.len(),
        cameras,
    })
}

/// A device id that fails to decode cannot name a stored device.
fn device_id(path: Result<Path<String>, PathRejection>, uri: &Uri) -> Result<String, FacadeError> {
    path.map(|Path(id)| id).map_err(|rejection| {
        debug!(path = %uri.path(), error = %rejection, "undecodable device id");
        FacadeError::DeviceNotFound {
            id: uri.path().to_owned(),
        }
    })
}

async fn device_state(
    State(state): State<AppState>,
    uri: Uri,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<Arc<DeviceRecord>>, FacadeError> {
    let id = device_id(path, &uri)?;
    state
        .store
        .get(&id)
        .map(Json)
        .ok_or(FacadeError::DeviceNotFound { id })
}

async fn device_snapshot(
    State(state): State<AppState>,
    uri: Uri,
    path: Result<Path<String>, PathRejection>,
) -> Result<Response, FacadeError> {
    let id = device_id(path, &uri)?;
    if !state.store.contains(&id) {
        return Err(FacadeError::DeviceNotFound { id });
    }

    match state.snapshots.fetch(&id).await {
        Ok(snapshot) => {
            debug!(device_id = %id, bytes = snapshot.data.len(), "serving snapshot");
            Ok(([(header::CONTENT_TYPE, snapshot.content_type)], snapshot.data).into_response())
        }
        Err(CoreError::SnapshotUnavailable { .. }) => {
            Err(FacadeError::SnapshotUnavailable { device_id: id })
        }
        Err(e) => {
            debug!(device_id = %id, error = %e, "snapshot fetch failed");
            Err(FacadeError::SnapshotUnavailable { device_id: id })
        }
    }
}

async fn unknown_endpoint(uri: Uri) -> FacadeError {
    FacadeError::UnknownEndpoint {
        path: uri.path().to_owned(),
    }
}
