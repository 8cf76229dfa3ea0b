// ── Connection manager ──
//
// Owns the realtime stream for the lifetime of the bridge and folds every
// hub event into the store, in arrival order. It is the store's only
// writer. A periodic sweep drops devices that stayed stale past the TTL.

use std::sync::Arc;

use chrono::Utc;
use scrybridge_api::{HubEvent, RealtimeConfig, RealtimeHandle, Token};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::Connector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::StalePolicy;
use crate::model::ConnectionState;
use crate::store::DeviceStore;

/// Background owner of the hub connection.
pub struct ConnectionManager {
    store: Arc<DeviceStore>,
    cancel: CancellationToken,
    realtime: RealtimeHandle,
    dispatch: JoinHandle<()>,
}

impl ConnectionManager {
    /// Spawn the realtime stream and the dispatch task.
    ///
    /// Returns immediately. Connection failures after this point are
    /// retried in the background and only show up as connectivity.
    pub fn start(
        store: Arc<DeviceStore>,
        config: RealtimeConfig,
        token: Token,
        connector: Option<Connector>,
        stale: StalePolicy,
        cancel: CancellationToken,
    ) -> Self {
        let (realtime, events) = RealtimeHandle::spawn(config, token, connector, cancel.child_token());
        let dispatch = tokio::spawn(dispatch_task(
            Arc::clone(&store),
            events,
            stale,
            cancel.clone(),
        ));

        Self {
            store,
            cancel,
            realtime,
            dispatch,
        }
    }

    pub fn store(&self) -> &Arc<DeviceStore> {
        &self.store
    }

    /// Stop the stream, wait for both tasks, and mark the mirror offline.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.realtime.shutdown();
        self.realtime.join().await;
        if let Err(e) = self.dispatch.await {
            warn!(error = %e, "dispatch task panicked");
        }
        self.store.set_connectivity(false);
        debug!("connection manager stopped");
    }
}

async fn dispatch_task(
    store: Arc<DeviceStore>,
    mut events: mpsc::Receiver<HubEvent>,
    stale: StalePolicy,
    cancel: CancellationToken,
) {
    let mut sweep = tokio::time::interval(stale.sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    sweep.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => {
                let Some(event) = event else {
                    info!("hub event stream ended");
                    break;
                };
                apply_event(&store, event);
            }
            _ = sweep.tick(), if stale.ttl.is_some() => {
                if let Some(ttl) = stale.ttl {
                    let expired = store.expire_stale(ttl, Utc::now());
                    if expired > 0 {
                        info!(expired, "dropped stale devices");
                    }
                }
            }
        }
    }

    store.set_connectivity(false);
}

/// Fold one hub event into the store.
pub(crate) fn apply_event(store: &DeviceStore, event: HubEvent) {
    match event {
        HubEvent::Connecting { attempt } => {
            debug!(attempt, "connecting to hub");
            store.set_connection_state(ConnectionState::Connecting);
        }
        HubEvent::Connected => {
            store.set_connection_state(ConnectionState::Connected);
        }
        HubEvent::Disconnected { reason } => {
            warn!(%reason, "hub connection lost");
            store.set_connection_state(ConnectionState::Disconnected);
        }
        HubEvent::SystemState(devices) => {
            let summary = store.apply_snapshot(devices);
            info!(
                upserted = summary.upserted,
                skipped = summary.skipped,
                newly_stale = summary.newly_stale,
                "applied hub snapshot"
            );
        }
        HubEvent::StateChange {
            device_id,
            property,
            value,
        } => {
            if !store.apply_property(&device_id, &property, value) {
                trace!(%device_id, %property, "dropping change for unknown device");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{Map, Value, json};

    use super::*;

    fn devices(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn lifecycle_events_drive_connectivity() {
        let store = DeviceStore::new();

        apply_event(&store, HubEvent::Connecting { attempt: 0 });
        assert_eq!(store.connection_state(), ConnectionState::Connecting);
        assert!(!store.connectivity());

        apply_event(&store, HubEvent::Connected);
        assert!(store.connectivity());

        apply_event(&store, HubEvent::Disconnected { reason: "eof".into() });
        assert!(!store.connectivity());
    }

    #[test]
    fn data_events_update_store() {
        let store = DeviceStore::new();

        apply_event(
            &store,
            HubEvent::SystemState(devices(json!({"cam1": {"interfaces": ["Camera"], "on": true}}))),
        );
        apply_event(
            &store,
            HubEvent::StateChange {
                device_id: "cam1".into(),
                property: "on".into(),
                value: json!(false),
            },
        );
        apply_event(
            &store,
            HubEvent::StateChange {
                device_id: "ghost".into(),
                property: "on".into(),
                value: json!(true),
            },
        );

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("cam1").unwrap().property("on"), Some(&json!(false)));
    }

    #[test]
    fn disconnect_keeps_last_known_state() {
        let store = DeviceStore::new();
        apply_event(&store, HubEvent::Connected);
        apply_event(&store, HubEvent::SystemState(devices(json!({"lamp": {"on": true}}))));
        apply_event(&store, HubEvent::Disconnected { reason: "reset".into() });

        assert!(!store.connectivity());
        assert_eq!(store.get("lamp").unwrap().property("on"), Some(&json!(true)));
    }
}
