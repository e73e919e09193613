//! Network link abstraction and signal-strength helpers.

use std::fmt;

use thiserror::Error;

/// Link state as reported by the radio driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

impl LinkStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkStatus::Connected)
    }
}

/// Errors reported by a [`NetworkLink`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("Wi-Fi driver error: {0}")]
    Driver(String),

    #[error("Invalid network configuration: {0}")]
    InvalidConfig(String),
}

/// The station-mode network interface.
///
/// Joining is asynchronous from the caller's point of view:
/// [`begin_join`](Self::begin_join) starts the attempt and the provisioning
/// controller polls [`link_status`](Self::link_status) on later ticks.
pub trait NetworkLink {
    /// Start joining `ssid`. Must not block until the link is up.
    fn begin_join(&mut self, ssid: &str, password: &str) -> Result<(), LinkError>;

    /// Current link state.
    fn link_status(&mut self) -> LinkStatus;

    /// Keep the radio awake while the device is online.
    fn disable_power_save(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    /// Received signal strength in dBm, when connected.
    fn rssi(&mut self) -> Option<i8> {
        None
    }
}

/// Convert an RSSI reading (dBm) into a 0-100 quality percentage.
pub fn signal_quality(rssi: i8) -> u8 {
    let rssi = i16::from(rssi);
    if rssi <= -100 {
        0
    } else if rssi >= -50 {
        100
    } else {
        // -99..=-51 maps to 2..=98
        (2 * (rssi + 100)) as u8
    }
}

/// Coarse signal level for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SignalLevel {
    NotConnected,
    Weak,
    Good,
    Excellent,
}

impl SignalLevel {
    /// Level for an optional RSSI reading; `None` means not connected.
    pub fn from_rssi(rssi: Option<i8>) -> Self {
        match rssi {
            None => SignalLevel::NotConnected,
            Some(rssi) => Self::from_quality(signal_quality(rssi)),
        }
    }

    pub fn from_quality(quality: u8) -> Self {
        if quality >= 66 {
            SignalLevel::Excellent
        } else if quality >= 33 {
            SignalLevel::Good
        } else {
            SignalLevel::Weak
        }
    }

    /// Single-character marker, as shown on small displays.
    pub fn symbol(&self) -> char {
        match self {
            SignalLevel::NotConnected => 'X',
            SignalLevel::Weak => '.',
            SignalLevel::Good => 'o',
            SignalLevel::Excellent => 'O',
        }
    }
}

impl fmt::Display for SignalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalLevel::NotConnected => "not connected",
            SignalLevel::Weak => "weak",
            SignalLevel::Good => "good",
            SignalLevel::Excellent => "excellent",
        };
        write!(f, "{}", name)
    }
}
