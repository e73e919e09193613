//! Device status endpoint.
//!
//! ### `GET /status`
//! Returns a JSON snapshot of the device: identity, provisioning state,
//! network and broker. Secrets are never included.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info};

use iotkit_core::{
    signal_quality, Application, ConfigPortal, DeviceHooks, JoinOutcome, KeyValueBackend,
    NetworkLink, ProvisioningState, Restarter, SignalLevel,
};

use crate::error::HostError;

/// Shared snapshot, written by the tick driver and read by the handler.
pub type SharedStatus = Arc<RwLock<StatusSnapshot>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub name: String,
    pub model: String,
    pub version: String,
    pub state: String,
    pub network_available: bool,
    pub services_ready: bool,
    pub ssid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_quality: Option<u8>,
    pub signal_level: String,
    pub uptime_ms: u64,
}

impl StatusSnapshot {
    pub fn capture<B, H, N, P, R>(app: &mut Application<B, H, N, P, R>, uptime_ms: u64) -> Self
    where
        B: KeyValueBackend,
        H: DeviceHooks,
        N: NetworkLink,
        P: ConfigPortal,
        R: Restarter,
    {
        let rssi = if app.controller().network_available() {
            app.controller_mut().link_mut().rssi()
        } else {
            None
        };
        let properties = app.properties();
        let settings = app.settings();

        Self {
            name: properties.name.clone(),
            model: properties.model.clone(),
            version: properties.version.to_string(),
            state: state_label(app.state()).to_string(),
            network_available: app.controller().network_available(),
            services_ready: app.services_ready(),
            ssid: settings.ssid().to_string(),
            broker: app.broker_endpoint(),
            signal_quality: rssi.map(signal_quality),
            signal_level: SignalLevel::from_rssi(rssi).to_string(),
            uptime_ms,
        }
    }
}

pub fn state_label(state: ProvisioningState) -> &'static str {
    match state {
        ProvisioningState::Idle => "idle",
        ProvisioningState::Joining => "joining",
        ProvisioningState::Joined(JoinOutcome::Online) => "online",
        ProvisioningState::Joined(JoinOutcome::Offline) => "offline",
        ProvisioningState::ConfigPortal => "configuring",
        ProvisioningState::Restarting => "restarting",
    }
}

pub fn create_router(status: SharedStatus) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .with_state(status)
}

/// Handler for `GET /status`.
async fn status_handler(State(status): State<SharedStatus>) -> Json<StatusSnapshot> {
    Json(status.read().await.clone())
}

/// Bind `addr` and serve the status endpoint in a background task.
pub async fn spawn_status_server(
    addr: SocketAddr,
    status: SharedStatus,
) -> Result<(SocketAddr, JoinHandle<()>), HostError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| HostError::Bind { addr, source })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| HostError::Bind { addr, source })?;
    info!("Status endpoint listening on http://{}/status", local_addr);

    let app = create_router(status);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Status server error: {}", e);
        }
    });
    Ok((local_addr, handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json_has_no_secrets() {
        let snapshot = StatusSnapshot {
            name: "dev".to_string(),
            ssid: "home".to_string(),
            state: "online".to_string(),
            ..StatusSnapshot::default()
        };

        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["ssid"], "home");
        assert_eq!(json["networkAvailable"], false);
        assert!(json.get("broker").is_none());
        assert!(json.get("password").is_none());
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(state_label(ProvisioningState::Joined(JoinOutcome::Online)), "online");
        assert_eq!(state_label(ProvisioningState::ConfigPortal), "configuring");
    }
}
