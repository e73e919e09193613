//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;

use iotkit_core::{
    ConfigPortal, DeviceHooks, LinkError, LinkStatus, NetworkLink, PortalError, PortalEvent,
    PortalRequest, ProvisioningConfig, ProvisioningController, Restarter,
};

/// Link that comes up on a given poll, or never.
#[derive(Debug, Default)]
pub struct ScriptedLink {
    /// 1-based poll on which the link reports `Connected`.
    pub connect_on_poll: Option<u32>,
    pub polls: u32,
    pub joins: Vec<(String, String)>,
    pub power_save_disabled: bool,
}

impl ScriptedLink {
    pub fn never() -> Self {
        Self::default()
    }

    pub fn connects_on(poll: u32) -> Self {
        Self {
            connect_on_poll: Some(poll),
            ..Self::default()
        }
    }
}

impl NetworkLink for ScriptedLink {
    fn begin_join(&mut self, ssid: &str, password: &str) -> Result<(), LinkError> {
        self.joins.push((ssid.to_string(), password.to_string()));
        Ok(())
    }

    fn link_status(&mut self) -> LinkStatus {
        self.polls += 1;
        match self.connect_on_poll {
            Some(n) if self.polls >= n => LinkStatus::Connected,
            _ => LinkStatus::Disconnected,
        }
    }

    fn disable_power_save(&mut self) -> Result<(), LinkError> {
        self.power_save_disabled = true;
        Ok(())
    }

    fn rssi(&mut self) -> Option<i8> {
        Some(-60)
    }
}

/// Portal replaying a fixed list of events, then `Pending` forever.
#[derive(Debug, Default)]
pub struct ScriptedPortal {
    pub events: VecDeque<PortalEvent>,
    pub requests: Vec<PortalRequest>,
    pub polls: u32,
    pub closes: u32,
    pub fail_open: bool,
}

impl ScriptedPortal {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn with_events(events: impl IntoIterator<Item = PortalEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl ConfigPortal for ScriptedPortal {
    fn open(&mut self, request: &PortalRequest) -> Result<(), PortalError> {
        if self.fail_open {
            return Err(PortalError::AccessPoint {
                name: request.access_point.clone(),
                reason: "radio busy".to_string(),
            });
        }
        self.requests.push(request.clone());
        Ok(())
    }

    fn poll(&mut self) -> PortalEvent {
        self.polls += 1;
        self.events.pop_front().unwrap_or(PortalEvent::Pending)
    }

    fn close(&mut self) {
        self.closes += 1;
    }
}

#[derive(Debug, Default)]
pub struct CountingRestarter {
    pub restarts: u32,
}

impl Restarter for CountingRestarter {
    fn restart(&mut self) {
        self.restarts += 1;
    }
}

/// Hooks recording every call in order.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    pub trigger_config: bool,
    pub calls: Vec<String>,
}

impl RecordingHooks {
    pub fn triggering() -> Self {
        Self {
            trigger_config: true,
            ..Self::default()
        }
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls.iter().filter(|c| c.as_str() == name).count()
    }
}

impl DeviceHooks for RecordingHooks {
    fn pre_setup(&mut self) {
        self.calls.push("pre_setup".to_string());
    }

    fn post_setup(&mut self) {
        self.calls.push("post_setup".to_string());
    }

    fn config_requested_on_startup(&mut self) -> bool {
        self.calls.push("config_requested_on_startup".to_string());
        self.trigger_config
    }

    fn on_config(&mut self, access_point: &str) {
        self.calls.push(format!("on_config:{}", access_point));
    }

    fn pre_loop(&mut self) {
        self.calls.push("pre_loop".to_string());
    }

    fn post_loop(&mut self) {
        self.calls.push("post_loop".to_string());
    }
}

pub type TestController =
    ProvisioningController<RecordingHooks, ScriptedLink, ScriptedPortal, CountingRestarter>;

pub fn test_config() -> ProvisioningConfig {
    ProvisioningConfig {
        access_point: "ESP_1234".to_string(),
        ..ProvisioningConfig::default()
    }
}

pub fn controller(hooks: RecordingHooks, link: ScriptedLink, portal: ScriptedPortal) -> TestController {
    ProvisioningController::new(
        test_config(),
        hooks,
        link,
        portal,
        CountingRestarter::default(),
    )
}
