//! Interactive configuration portal abstraction.
//!
//! The portal is an access point plus a small web form where the user enters
//! network credentials (and broker settings, when the record carries them).
//! Platform crates implement [`ConfigPortal`]; the provisioning controller
//! opens it, polls it once per tick and closes it on every exit path.

use std::time::Duration;

use thiserror::Error;

use crate::wifi_settings::{parse_port, BrokerSettings, WifiSettings};

/// Prefix of the advertised access-point name.
pub const DEFAULT_AP_PREFIX: &str = "ESP_";

/// Access-point name for a device: prefix followed by the decimal chip id,
/// upper-cased.
pub fn access_point_name(prefix: &str, chip_id: u32) -> String {
    format!("{}{}", prefix, chip_id).to_uppercase()
}

/// Errors reported by a [`ConfigPortal`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortalError {
    #[error("Failed to start access point '{name}': {reason}")]
    AccessPoint { name: String, reason: String },

    #[error("Failed to start portal server: {0}")]
    Server(String),

    #[error("Portal is not open")]
    NotOpen,
}

/// What the portal is asked to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalRequest {
    /// Advertised access-point name.
    pub access_point: String,
    /// How long the portal may stay open. The controller enforces the
    /// deadline; implementations may use it for display.
    pub timeout: Duration,
    /// Current broker settings, used as form defaults. `None` hides the
    /// broker fields.
    pub broker_defaults: Option<BrokerSettings>,
}

/// Broker fields as typed into the form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerSubmission {
    pub server: String,
    /// Raw port text; parsed when applied.
    pub port: String,
    pub user: String,
    pub password: String,
}

/// Values the user confirmed in the portal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortalSubmission {
    pub ssid: String,
    pub password: String,
    pub broker: Option<BrokerSubmission>,
}

impl PortalSubmission {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
            broker: None,
        }
    }

    pub fn with_broker(mut self, broker: BrokerSubmission) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Stage the submitted values into `settings`.
    ///
    /// Returns `true` if any field changed. Broker values are ignored when
    /// the record has no broker section. An unparsable port keeps the stored
    /// port.
    pub fn apply_to(&self, settings: &mut WifiSettings) -> bool {
        let mut changed = settings.set_ssid(&self.ssid);
        changed |= settings.set_password(&self.password);

        if let Some(broker) = &self.broker {
            let previous_port = settings.broker().map(BrokerSettings::port);
            changed |= settings.set_broker_server(&broker.server);
            if let Some(previous_port) = previous_port {
                changed |= settings.set_broker_port(parse_port(&broker.port, previous_port));
            }
            changed |= settings.set_broker_user(&broker.user);
            changed |= settings.set_broker_password(&broker.password);
        }
        changed
    }
}

/// Result of polling an open portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalEvent {
    /// Still waiting for the user.
    Pending,
    /// The user confirmed new values.
    Submitted(PortalSubmission),
    /// The portal was closed without confirmation.
    Closed,
    /// The portal failed while running.
    Failed(PortalError),
}

/// The configuration portal collaborator.
pub trait ConfigPortal {
    /// Start the access point and form.
    fn open(&mut self, request: &PortalRequest) -> Result<(), PortalError>;

    /// Check for user input. Must not block.
    fn poll(&mut self) -> PortalEvent;

    /// Stop the access point and form. Safe to call when not open.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsRecord;
    use crate::wifi_settings::SettingsLayout;

    #[test]
    fn test_access_point_name() {
        assert_eq!(access_point_name("ESP_", 11259341), "ESP_11259341");
        assert_eq!(access_point_name("sensor-", 7), "SENSOR-7");
    }

    #[test]
    fn test_apply_base_submission() {
        let mut settings = WifiSettings::new(SettingsLayout::Base);
        let submission = PortalSubmission::new("NET2", "pass2");

        assert!(submission.apply_to(&mut settings));
        assert_eq!(settings.ssid(), "NET2");
        assert_eq!(settings.password(), "pass2");
        assert!(settings.is_dirty());
    }

    #[test]
    fn test_apply_unchanged_submission() {
        let mut settings = WifiSettings::new(SettingsLayout::Base);
        settings.set_ssid("NET2");
        settings.mark_clean();

        assert!(!PortalSubmission::new("NET2", "").apply_to(&mut settings));
        assert!(!settings.is_dirty());
    }

    #[test]
    fn test_apply_broker_submission() {
        let mut settings = WifiSettings::new(SettingsLayout::BaseWithBroker);
        let submission = PortalSubmission::new("NET2", "pass2").with_broker(BrokerSubmission {
            server: " 10.0.0.5 ".to_string(),
            port: "8883".to_string(),
            user: "bob".to_string(),
            password: "pw".to_string(),
        });

        assert!(submission.apply_to(&mut settings));
        let broker = settings.broker().unwrap();
        assert_eq!(broker.server(), "10.0.0.5");
        assert_eq!(broker.port(), 8883);
        assert_eq!(broker.user(), "bob");
    }

    #[test]
    fn test_invalid_port_keeps_previous() {
        let mut settings = WifiSettings::new(SettingsLayout::BaseWithBroker);
        settings.set_broker_port(1884);
        let submission = PortalSubmission::new("NET2", "").with_broker(BrokerSubmission {
            port: "not-a-port".to_string(),
            ..BrokerSubmission::default()
        });

        submission.apply_to(&mut settings);

        assert_eq!(settings.broker().unwrap().port(), 1884);
    }

    #[test]
    fn test_broker_submission_ignored_without_broker_section() {
        let mut settings = WifiSettings::new(SettingsLayout::Base);
        let submission = PortalSubmission::new("", "").with_broker(BrokerSubmission {
            server: "mqtt.local".to_string(),
            ..BrokerSubmission::default()
        });

        assert!(!submission.apply_to(&mut settings));
        assert!(settings.broker().is_none());
    }
}
