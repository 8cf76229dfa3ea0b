// scrybridge-api: Async client for a Scrypted hub (login, realtime events, snapshots)

pub mod auth;
pub mod engineio;
pub mod error;
pub mod realtime;
pub mod snapshot;
pub mod transport;

pub use auth::{AuthClient, Token};
pub use error::Error;
pub use realtime::{HubEvent, RealtimeConfig, RealtimeHandle, ReconnectConfig, realtime_url};
pub use snapshot::{Snapshot, SnapshotFetcher};
pub use transport::{TlsMode, TransportConfig};
