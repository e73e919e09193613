//! ESP32 bindings for iotkit.
//!
//! This crate provides the platform half of `iotkit-core` on ESP-IDF:
//! - [`NvsBackend`]: settings namespaces in NVS flash
//! - [`EspWifiLink`]: the station interface
//! - [`SoftApPortal`]: access point plus configuration form on port 80
//! - [`ChipRestarter`]: software reset
//!
//! # Example
//!
//! ```ignore
//! let wifi = shared_wifi(peripherals.modem, sysloop, nvs.clone())?;
//! let store = SettingsStore::new(NvsBackend::new(nvs));
//! let controller = ProvisioningController::new(
//!     config,
//!     hooks,
//!     EspWifiLink::new(wifi.clone()),
//!     SoftApPortal::new(wifi),
//!     ChipRestarter,
//! );
//! ```

pub mod nvs;
pub mod portal;
pub mod restart;
pub mod wifi;

pub use nvs::{NvsBackend, NvsNamespace};
pub use portal::SoftApPortal;
pub use restart::{chip_id, ChipRestarter};
pub use wifi::{shared_wifi, EspWifiLink, SharedWifi};
