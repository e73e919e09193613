//! Host device configuration.
//!
//! Loaded from the JSON file named by the `IOTKIT_CONFIG` environment
//! variable. Every field has a default, so an empty object (or no file at
//! all) yields a working simulated device.
//!
//! ```json
//! {
//!   "dataDir": "/var/lib/iotkit",
//!   "chipId": 11259341,
//!   "layout": "baseWithBroker",
//!   "portalAddr": "0.0.0.0:8080"
//! }
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use iotkit_core::portal::{access_point_name, DEFAULT_AP_PREFIX};
use iotkit_core::provisioning::{
    DEFAULT_JOIN_POLL_CAP, DEFAULT_JOIN_POLL_INTERVAL, DEFAULT_PORTAL_TIMEOUT,
    DEFAULT_RESTART_GRACE,
};
use iotkit_core::settings::validate_name;
use iotkit_core::wifi_settings::DEFAULT_NAMESPACE;
use iotkit_core::{DeviceProperties, ProvisioningConfig, SemanticVersion, SettingsLayout};

use crate::error::HostError;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "IOTKIT_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceConfig {
    /// Directory holding the settings namespaces.
    pub data_dir: PathBuf,
    pub namespace: String,
    /// Identifier appended to the access-point name.
    pub chip_id: u32,
    pub ap_prefix: String,
    pub layout: SettingsLayout,
    /// Ask for the portal on every boot, even with stored credentials.
    pub force_portal: bool,

    pub join_poll_cap: u32,
    pub join_poll_interval_ms: u64,
    pub portal_timeout_secs: u64,
    pub restart_grace_ms: u64,
    pub tick_interval_ms: u64,
    pub update_interval_secs: u64,

    pub portal_addr: SocketAddr,
    pub status_addr: SocketAddr,

    /// Simulated link comes up on this poll; `None` never connects.
    pub link_connect_after: Option<u32>,

    pub device: DeviceProperties,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./iotkit-data"),
            namespace: DEFAULT_NAMESPACE.to_string(),
            chip_id: 0,
            ap_prefix: DEFAULT_AP_PREFIX.to_string(),
            layout: SettingsLayout::BaseWithBroker,
            force_portal: false,
            join_poll_cap: DEFAULT_JOIN_POLL_CAP,
            join_poll_interval_ms: DEFAULT_JOIN_POLL_INTERVAL.as_millis() as u64,
            portal_timeout_secs: DEFAULT_PORTAL_TIMEOUT.as_secs(),
            restart_grace_ms: DEFAULT_RESTART_GRACE.as_millis() as u64,
            tick_interval_ms: 100,
            update_interval_secs: 15,
            portal_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            status_addr: SocketAddr::from(([127, 0, 0, 1], 8081)),
            link_connect_after: Some(2),
            device: DeviceProperties::new(
                "iotkit device",
                "iotkit-linux",
                "iotkit",
                SemanticVersion::new(0, 1, 0),
            ),
        }
    }
}

impl DeviceConfig {
    /// Load from the file named by `IOTKIT_CONFIG`, or defaults when unset.
    pub fn from_env() -> Result<Self, HostError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, HostError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| HostError::io(path, e))?;
        Self::from_json(&text).map_err(|err| match err {
            HostError::Json { source, .. } => HostError::Json {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, HostError> {
        let config: Self = serde_json::from_str(text).map_err(|source| HostError::Json {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), HostError> {
        validate_name(&self.namespace).map_err(|e| HostError::Config(e.to_string()))?;
        if self.tick_interval_ms == 0 {
            return Err(HostError::Config("tickIntervalMs must be positive".to_string()));
        }
        if self.update_interval_secs == 0 {
            return Err(HostError::Config(
                "updateIntervalSecs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn access_point(&self) -> String {
        access_point_name(&self.ap_prefix, self.chip_id)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    /// The subset of the configuration the provisioning controller sees.
    pub fn provisioning_config(&self) -> ProvisioningConfig {
        ProvisioningConfig {
            namespace: self.namespace.clone(),
            access_point: self.access_point(),
            join_poll_cap: self.join_poll_cap,
            join_poll_interval: Duration::from_millis(self.join_poll_interval_ms),
            portal_timeout: Duration::from_secs(self.portal_timeout_secs),
            restart_grace: Duration::from_millis(self.restart_grace_ms),
        }
    }
}
