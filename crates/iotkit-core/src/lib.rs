//! # iotkit-core
//!
//! Boot-time provisioning and settings persistence for connected devices.
//!
//! This crate provides:
//! - Namespace-scoped settings persistence with dirty tracking
//! - The Wi-Fi/broker settings record
//! - The provisioning state machine (join known network or open the
//!   configuration portal, with bounded retries and a portal timeout)
//! - The application lifecycle and device hooks
//! - An in-memory backend for tests and simulation
//!
//! This crate is intentionally runtime-agnostic and contains no async code,
//! making it usable on both Linux (tokio) and ESP32 (esp-idf) targets.
//! Platform crates implement [`KeyValueBackend`], [`NetworkLink`],
//! [`ConfigPortal`] and [`Restarter`].

pub mod app;
pub mod device;
pub mod hooks;
pub mod memory;
pub mod network;
pub mod portal;
pub mod provisioning;
pub mod settings;
pub mod wifi_settings;

pub use app::{Application, IntervalTimer};
pub use device::{DeviceProperties, SemanticVersion, VersionParseError};
pub use hooks::{DeviceHooks, NoopHooks, Restarter};
pub use memory::{MemoryBackend, StoredValue};
pub use network::{signal_quality, LinkError, LinkStatus, NetworkLink, SignalLevel};
pub use portal::{
    access_point_name, BrokerSubmission, ConfigPortal, PortalError, PortalEvent, PortalRequest,
    PortalSubmission,
};
pub use provisioning::{
    JoinAttempt, JoinOutcome, PortalSession, ProvisioningConfig, ProvisioningController,
    ProvisioningState,
};
pub use settings::{
    AccessMode, DirtyFlag, KeyValueBackend, NamespaceAccess, SettingsError, SettingsRecord,
    SettingsStore,
};
pub use wifi_settings::{BrokerAddress, BrokerSettings, SettingsLayout, WifiSettings};
