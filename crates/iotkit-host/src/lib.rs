//! # iotkit-host
//!
//! Linux bindings for `iotkit-core`.
//!
//! This crate provides:
//! - [`FileBackend`]: one JSON document per settings namespace
//! - [`HttpPortal`]: the configuration portal as an HTTP form (axum)
//! - [`SimulatedLink`]: a station link for desktop runs
//! - [`ProcessRestarter`]: restart by exiting with a dedicated code
//! - [`Driver`]: the tokio tick loop and the `/status` endpoint
//! - [`DeviceConfig`]: JSON configuration named by `IOTKIT_CONFIG`
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = DeviceConfig::from_env()?;
//! let store = SettingsStore::new(FileBackend::new(&config.data_dir)?);
//! let portal = HttpPortal::new(config.portal_addr, Handle::current());
//! let controller = ProvisioningController::new(
//!     config.provisioning_config(),
//!     NoopHooks,
//!     SimulatedLink::new(config.link_connect_after),
//!     portal,
//!     ProcessRestarter::new(),
//! );
//! let mut app = Application::new(config.device.clone(), config.layout, store, controller);
//!
//! let exit = Driver::new(config.tick_interval()).run(&mut app, shutdown).await;
//! std::process::exit(exit.exit_code());
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod file_backend;
pub mod portal;
pub mod restart;
pub mod sim;
pub mod status;

pub use config::DeviceConfig;
pub use driver::{Driver, DriverExit};
pub use error::HostError;
pub use file_backend::FileBackend;
pub use portal::HttpPortal;
pub use restart::{ProcessRestarter, RESTART_EXIT_CODE};
pub use sim::SimulatedLink;
pub use status::{StatusSnapshot, SharedStatus};
