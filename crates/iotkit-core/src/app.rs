//! Top-level application object.
//!
//! [`Application`] owns the settings record, the settings store and the
//! provisioning controller, and runs the device lifecycle around them:
//!
//! 1. [`setup`](Application::setup): `pre_setup` hook, settings load, entry
//!    decision.
//! 2. [`tick`](Application::tick): advances provisioning; once the device has
//!    joined (online or offline) runs `post_setup` once, then `pre_loop`,
//!    the periodic update and `post_loop` on every tick.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::device::DeviceProperties;
use crate::hooks::{DeviceHooks, Restarter};
use crate::network::NetworkLink;
use crate::portal::ConfigPortal;
use crate::provisioning::{duration_ms, ProvisioningController, ProvisioningState};
use crate::settings::{KeyValueBackend, SettingsStore};
use crate::wifi_settings::{BrokerAddress, SettingsLayout, WifiSettings};

/// Period of the automatic device update.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(15);

/// Fires once per interval, driven by caller-supplied timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalTimer {
    interval_ms: u64,
    last_ms: u64,
}

impl IntervalTimer {
    pub fn new(interval: Duration, now_ms: u64) -> Self {
        Self {
            interval_ms: duration_ms(interval),
            last_ms: now_ms,
        }
    }

    /// `true` if the interval has passed; the timer then starts over.
    pub fn elapsed(&mut self, now_ms: u64) -> bool {
        if now_ms.saturating_sub(self.last_ms) >= self.interval_ms {
            self.last_ms = now_ms;
            true
        } else {
            false
        }
    }

    pub fn restart(&mut self, now_ms: u64) {
        self.last_ms = now_ms;
    }
}

/// A provisioned device.
pub struct Application<B, H, N, P, R> {
    properties: DeviceProperties,
    store: SettingsStore<B>,
    settings: WifiSettings,
    controller: ProvisioningController<H, N, P, R>,
    update_timer: IntervalTimer,
    post_setup_done: bool,
    using_wifi: bool,
    publish_pending: bool,
}

impl<B, H, N, P, R> Application<B, H, N, P, R>
where
    B: KeyValueBackend,
    H: DeviceHooks,
    N: NetworkLink,
    P: ConfigPortal,
    R: Restarter,
{
    pub fn new(
        properties: DeviceProperties,
        layout: SettingsLayout,
        store: SettingsStore<B>,
        controller: ProvisioningController<H, N, P, R>,
    ) -> Self {
        Self {
            properties,
            store,
            settings: WifiSettings::new(layout),
            controller,
            update_timer: IntervalTimer::new(DEFAULT_UPDATE_INTERVAL, 0),
            post_setup_done: false,
            using_wifi: false,
            publish_pending: false,
        }
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_timer = IntervalTimer::new(interval, 0);
        self
    }

    /// Run the boot sequence up to the provisioning entry decision.
    pub fn setup(&mut self, now_ms: u64) -> ProvisioningState {
        info!(
            name = %self.properties.name,
            version = %self.properties.version,
            "device starting"
        );
        self.controller.hooks_mut().pre_setup();

        let namespace = self.controller.config().namespace.clone();
        if let Err(err) = self.store.load(&namespace, &mut self.settings) {
            warn!(%err, "failed to load settings, using defaults");
        }

        self.update_timer.restart(now_ms);
        self.controller.begin(now_ms, &self.settings)
    }

    /// Advance provisioning and, once joined, run one loop iteration.
    pub fn tick(&mut self, now_ms: u64) -> ProvisioningState {
        let state = self
            .controller
            .tick(now_ms, &mut self.settings, &mut self.store);

        if !matches!(state, ProvisioningState::Joined(_)) {
            return state;
        }

        if !self.post_setup_done {
            self.post_setup_done = true;
            // Only a stored network identifier puts the radio to use.
            self.using_wifi = self.settings.is_configured();
            if self.controller.services_ready() {
                self.prepare_broker();
            }
            self.controller.hooks_mut().post_setup();
            debug!("setup complete");
        }

        self.controller.hooks_mut().pre_loop();
        self.update(now_ms, false);
        self.controller.hooks_mut().post_loop();
        state
    }

    /// Run the periodic update if its interval has elapsed or `force` is set.
    ///
    /// Returns `true` if an update cycle ran. While Wi-Fi is in use this
    /// raises the publish request read by
    /// [`take_publish_request`](Self::take_publish_request).
    pub fn update(&mut self, now_ms: u64, force: bool) -> bool {
        if force {
            self.update_timer.restart(now_ms);
        } else if !self.update_timer.elapsed(now_ms) {
            return false;
        }

        if self.using_wifi {
            self.publish_pending = true;
        }
        true
    }

    /// Consume the pending "publish device state" request.
    pub fn take_publish_request(&mut self) -> bool {
        std::mem::take(&mut self.publish_pending)
    }

    fn prepare_broker(&self) {
        match self.settings.broker().and_then(|b| b.address()) {
            Some(BrokerAddress::Ip(ip)) => info!(%ip, "message broker configured by address"),
            Some(BrokerAddress::Host(host)) => info!(%host, "message broker configured by name"),
            None => debug!("no message broker configured"),
        }
    }

    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    /// Read-only view of the settings record.
    pub fn settings(&self) -> &WifiSettings {
        &self.settings
    }

    pub fn store(&self) -> &SettingsStore<B> {
        &self.store
    }

    pub fn controller(&self) -> &ProvisioningController<H, N, P, R> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ProvisioningController<H, N, P, R> {
        &mut self.controller
    }

    pub fn state(&self) -> ProvisioningState {
        self.controller.state()
    }

    /// Provisioning finished with a network join attempt (online or not).
    pub fn using_wifi(&self) -> bool {
        self.using_wifi
    }

    pub fn services_ready(&self) -> bool {
        self.controller.services_ready()
    }

    /// `host:port` of the configured message broker.
    pub fn broker_endpoint(&self) -> Option<String> {
        self.settings.broker_endpoint()
    }
}
