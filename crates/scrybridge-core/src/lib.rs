// scrybridge-core: the hub mirror between scrybridge-api and the facade.
//
// `Bridge` logs in and starts a `ConnectionManager`, which folds realtime
// hub events into a `DeviceStore`. Readers only ever see the store.

pub mod bridge;
pub mod config;
pub mod error;
pub mod manager;
pub mod model;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{Bridge, SnapshotService};
pub use config::{BridgeConfig, StalePolicy, TlsVerification};
pub use error::CoreError;
pub use manager::ConnectionManager;
pub use model::{CAMERA_INTERFACES, ConnectionState, DeviceRecord};
pub use store::{DeviceStore, SnapshotSummary, StoreStatus};

pub use scrybridge_api::realtime::DEFAULT_ENGINE_IO_PATH;
pub use scrybridge_api::snapshot::{DEFAULT_MIN_SNAPSHOT_BYTES, DEFAULT_SNAPSHOT_TEMPLATES};
pub use scrybridge_api::{ReconnectConfig, Snapshot, Token};
