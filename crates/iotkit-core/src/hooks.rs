//! Device capability hooks.
//!
//! A concrete device plugs its own behaviour into the application lifecycle
//! by implementing [`DeviceHooks`]. Every method has a no-op default, so a
//! device only overrides what it needs.

/// Lifecycle callbacks for a concrete device.
pub trait DeviceHooks {
    /// Called first in setup, before settings are loaded.
    fn pre_setup(&mut self) {}

    /// Called once, when provisioning has reached a terminal state.
    fn post_setup(&mut self) {}

    /// Ask for the configuration portal even when credentials are stored,
    /// e.g. because a button is held during boot.
    fn config_requested_on_startup(&mut self) -> bool {
        false
    }

    /// The configuration portal is about to open under `access_point`.
    fn on_config(&mut self, access_point: &str) {}

    /// Called at the start of every loop iteration once provisioning is done.
    fn pre_loop(&mut self) {}

    /// Called at the end of every loop iteration once provisioning is done.
    fn post_loop(&mut self) {}
}

/// Device with no custom behaviour.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl DeviceHooks for NoopHooks {}

/// Process-restart collaborator.
pub trait Restarter {
    /// Reboot the device. On hardware this does not return.
    fn restart(&mut self);
}
