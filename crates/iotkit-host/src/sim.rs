//! Simulated station link for running the device on a desktop.

use tracing::debug;

use iotkit_core::{LinkError, LinkStatus, NetworkLink};

/// Link that comes up on the `connect_after`-th status poll following a join.
#[derive(Debug, Clone)]
pub struct SimulatedLink {
    connect_after: Option<u32>,
    joined_ssid: Option<String>,
    polls: u32,
    rssi: i8,
}

impl SimulatedLink {
    /// `None` never connects.
    pub fn new(connect_after: Option<u32>) -> Self {
        Self {
            connect_after,
            joined_ssid: None,
            polls: 0,
            rssi: -58,
        }
    }

    pub fn with_rssi(mut self, rssi: i8) -> Self {
        self.rssi = rssi;
        self
    }

    pub fn joined_ssid(&self) -> Option<&str> {
        self.joined_ssid.as_deref()
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    fn is_up(&self) -> bool {
        match (self.connect_after, &self.joined_ssid) {
            (Some(after), Some(_)) => self.polls >= after,
            _ => false,
        }
    }
}

impl NetworkLink for SimulatedLink {
    fn begin_join(&mut self, ssid: &str, _password: &str) -> Result<(), LinkError> {
        if ssid.is_empty() {
            return Err(LinkError::InvalidConfig("empty SSID".to_string()));
        }
        debug!(ssid, "simulated join started");
        self.joined_ssid = Some(ssid.to_string());
        self.polls = 0;
        Ok(())
    }

    fn link_status(&mut self) -> LinkStatus {
        if self.joined_ssid.is_some() {
            self.polls += 1;
        }
        if self.is_up() {
            LinkStatus::Connected
        } else {
            LinkStatus::Disconnected
        }
    }

    fn rssi(&mut self) -> Option<i8> {
        self.is_up().then_some(self.rssi)
    }
}
