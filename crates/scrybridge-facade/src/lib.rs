//! scrybridge-facade: read-only HTTP view of the device mirror.
//!
//! | Route | Response |
//! |---|---|
//! | `GET /status` | connectivity, device and stale counts, last update |
//! | `GET /devices` | every device record |
//! | `GET /cameras` | records tagged `Camera` or `VideoCamera` |
//! | `GET /device/{id}/state` | one record |
//! | `GET /device/{id}/snapshot` | camera image bytes |
//!
//! Errors are JSON objects with a single `error` field.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use scrybridge_core::{DeviceStore, SnapshotService};

pub mod error;
pub mod routes;

pub use error::FacadeError;
pub use routes::router;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DeviceStore>,
    pub snapshots: Arc<SnapshotService>,
}

impl AppState {
    pub fn new(store: Arc<DeviceStore>, snapshots: Arc<SnapshotService>) -> Self {
        Self { store, snapshots }
    }
}

/// Serve the facade on `listener` until `shutdown` resolves.
///
/// In-flight requests are allowed to finish after the signal.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "facade listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("facade stopped");
    Ok(())
}
