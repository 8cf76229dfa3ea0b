// ── Bridge lifecycle ──
//
// Login, then start the mirror. Login is the only step allowed to fail:
// once a token exists, every later connection problem is retried in the
// background and surfaces only as connectivity on the store.

use std::sync::Arc;

use scrybridge_api::{
    AuthClient, RealtimeConfig, Snapshot, SnapshotFetcher, Token, realtime_url,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::error::CoreError;
use crate::manager::ConnectionManager;
use crate::store::DeviceStore;

/// A logged-in, running hub mirror.
pub struct Bridge {
    store: Arc<DeviceStore>,
    token: Token,
    snapshots: Arc<SnapshotService>,
    manager: ConnectionManager,
}

impl Bridge {
    /// Log in and start mirroring.
    ///
    /// Fails only on configuration, TLS, or login errors. Returns as soon
    /// as the realtime loop is spawned; the first connection happens in
    /// the background.
    pub async fn connect(config: BridgeConfig, cancel: CancellationToken) -> Result<Self, CoreError> {
        let transport = config.transport();
        let http = transport.build_client()?;
        let connector = transport.socket_connector()?;

        let token = AuthClient::new(http.clone(), config.url.clone())
            .login(&config.username, &config.password)
            .await?;
        info!(url = %config.url, username = %config.username, "logged in to hub");

        let mut realtime = RealtimeConfig::new(realtime_url(&config.url, &config.engine_io_path)?);
        realtime.keepalive_interval = config.keepalive_interval;
        realtime.handshake_timeout = config.handshake_timeout;
        realtime.reconnect = config.reconnect.clone();
        debug!(url = %realtime.url, "starting realtime stream");

        let store = Arc::new(DeviceStore::new());
        let manager = ConnectionManager::start(
            Arc::clone(&store),
            realtime,
            token.clone(),
            connector,
            config.stale.clone(),
            cancel,
        );

        let fetcher = SnapshotFetcher::new(http, config.url.clone())
            .with_templates(config.snapshot_templates.clone())
            .with_min_bytes(config.snapshot_min_bytes)
            .with_attempt_timeout(config.snapshot_timeout);

        Ok(Self {
            store,
            snapshots: Arc::new(SnapshotService::new(fetcher, token.clone())),
            token,
            manager,
        })
    }

    /// Log in once and return the hub's raw login response.
    pub async fn check_login(config: &BridgeConfig) -> Result<Value, CoreError> {
        let http = config.transport().build_client()?;
        let body = AuthClient::new(http, config.url.clone())
            .login_raw(&config.username, &config.password)
            .await?;
        Ok(body)
    }

    pub fn store(&self) -> &Arc<DeviceStore> {
        &self.store
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn snapshots(&self) -> Arc<SnapshotService> {
        Arc::clone(&self.snapshots)
    }

    /// Stop the realtime loop. The store stays readable, marked offline.
    pub async fn shutdown(self) {
        self.manager.shutdown().await;
        info!("bridge stopped");
    }
}

/// Camera snapshots on behalf of the bridge, using its login token.
#[derive(Debug)]
pub struct SnapshotService {
    fetcher: SnapshotFetcher,
    token: Token,
}

impl SnapshotService {
    pub fn new(fetcher: SnapshotFetcher, token: Token) -> Self {
        Self { fetcher, token }
    }

    pub async fn fetch(&self, device_id: &str) -> Result<Snapshot, CoreError> {
        Ok(self.fetcher.fetch(device_id, &self.token).await?)
    }
}
