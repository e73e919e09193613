//! Network credentials and optional message-broker settings.
//!
//! Persisted layout (one namespace, `WIFI` by default):
//!
//! | Key          | Type   | Default | Layout          |
//! |--------------|--------|---------|-----------------|
//! | `SSID`       | string | `""`    | all             |
//! | `PWD`        | string | `""`    | all             |
//! | `MQTTSERVER` | string | `""`    | `BaseWithBroker`|
//! | `MQTTPORT`   | u16    | `1883`  | `BaseWithBroker`|
//! | `MQTTUSER`   | string | `""`    | `BaseWithBroker`|
//! | `MQTTPWD`    | string | `""`    | `BaseWithBroker`|

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::settings::{DirtyFlag, NamespaceAccess, SettingsError, SettingsRecord};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "WIFI";

/// Broker port used when none has been stored.
pub const DEFAULT_BROKER_PORT: u16 = 1883;

/// Storage keys.
pub mod keys {
    pub const SSID: &str = "SSID";
    pub const PASSWORD: &str = "PWD";
    pub const BROKER_SERVER: &str = "MQTTSERVER";
    pub const BROKER_PORT: &str = "MQTTPORT";
    pub const BROKER_USER: &str = "MQTTUSER";
    pub const BROKER_PASSWORD: &str = "MQTTPWD";
}

/// Which fields a [`WifiSettings`] record carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SettingsLayout {
    /// Network identifier and credential only.
    #[default]
    Base,
    /// Network fields plus the message-broker section.
    BaseWithBroker,
}

// ============================================================================
// Broker section
// ============================================================================

/// Message-broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    server: String,
    port: u16,
    user: String,
    password: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: DEFAULT_BROKER_PORT,
            user: String::new(),
            password: String::new(),
        }
    }
}

impl BrokerSettings {
    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Whether a broker server has been configured.
    pub fn is_configured(&self) -> bool {
        !self.server.is_empty()
    }

    /// Classified server address, or `None` when no server is set.
    pub fn address(&self) -> Option<BrokerAddress> {
        BrokerAddress::classify(&self.server)
    }
}

/// A broker server as given by the user: either an IP literal or a host name
/// that still has to be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerAddress {
    Ip(IpAddr),
    Host(String),
}

impl BrokerAddress {
    /// Classify `server`. Returns `None` for an empty (or blank) server.
    pub fn classify(server: &str) -> Option<Self> {
        let server = server.trim();
        if server.is_empty() {
            return None;
        }
        Some(match server.parse::<IpAddr>() {
            Ok(ip) => Self::Ip(ip),
            Err(_) => Self::Host(server.to_string()),
        })
    }

    pub fn is_ip(&self) -> bool {
        matches!(self, Self::Ip(_))
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(ip) => write!(f, "{}", ip),
            Self::Host(host) => write!(f, "{}", host),
        }
    }
}

/// Parse a port typed into a form field, keeping `previous` when the text is
/// not a valid port number.
pub fn parse_port(text: &str, previous: u16) -> u16 {
    text.trim().parse::<u16>().unwrap_or(previous)
}

// ============================================================================
// WifiSettings record
// ============================================================================

/// Settings record for network credentials and, depending on the layout, the
/// message broker.
///
/// Setters return `true` when the stored value changed. Only a change marks
/// the record dirty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiSettings {
    ssid: String,
    password: String,
    broker: Option<BrokerSettings>,
    dirty: DirtyFlag,
}

impl Default for WifiSettings {
    fn default() -> Self {
        Self::new(SettingsLayout::default())
    }
}

impl WifiSettings {
    /// Create an empty, clean record with the given layout.
    pub fn new(layout: SettingsLayout) -> Self {
        let broker = match layout {
            SettingsLayout::Base => None,
            SettingsLayout::BaseWithBroker => Some(BrokerSettings::default()),
        };
        Self {
            ssid: String::new(),
            password: String::new(),
            broker,
            dirty: DirtyFlag::default(),
        }
    }

    pub fn layout(&self) -> SettingsLayout {
        if self.broker.is_some() {
            SettingsLayout::BaseWithBroker
        } else {
            SettingsLayout::Base
        }
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Broker section, present only with [`SettingsLayout::BaseWithBroker`].
    pub fn broker(&self) -> Option<&BrokerSettings> {
        self.broker.as_ref()
    }

    /// A network identifier has been stored.
    pub fn is_configured(&self) -> bool {
        !self.ssid.is_empty()
    }

    /// Set the network identifier. Stored verbatim.
    pub fn set_ssid(&mut self, ssid: &str) -> bool {
        if self.ssid == ssid {
            return false;
        }
        self.dirty.stage(&mut self.ssid, ssid.to_string())
    }

    /// Set the network credential. Stored verbatim.
    pub fn set_password(&mut self, password: &str) -> bool {
        if self.password == password {
            return false;
        }
        self.dirty.stage(&mut self.password, password.to_string())
    }

    /// Set the broker server, trimmed. No-op without a broker section.
    pub fn set_broker_server(&mut self, server: &str) -> bool {
        match self.broker.as_mut() {
            Some(broker) => stage_trimmed(&mut self.dirty, &mut broker.server, server),
            None => false,
        }
    }

    /// Set the broker port. No-op without a broker section.
    pub fn set_broker_port(&mut self, port: u16) -> bool {
        match self.broker.as_mut() {
            Some(broker) => self.dirty.stage(&mut broker.port, port),
            None => false,
        }
    }

    /// Set the broker user, trimmed. No-op without a broker section.
    pub fn set_broker_user(&mut self, user: &str) -> bool {
        match self.broker.as_mut() {
            Some(broker) => stage_trimmed(&mut self.dirty, &mut broker.user, user),
            None => false,
        }
    }

    /// Set the broker password, trimmed. No-op without a broker section.
    pub fn set_broker_password(&mut self, password: &str) -> bool {
        match self.broker.as_mut() {
            Some(broker) => stage_trimmed(&mut self.dirty, &mut broker.password, password),
            None => false,
        }
    }

    /// `host:port` of the configured broker, if any.
    pub fn broker_endpoint(&self) -> Option<String> {
        let broker = self.broker.as_ref()?;
        let address = broker.address()?;
        Some(match address {
            BrokerAddress::Ip(IpAddr::V6(ip)) => format!("[{}]:{}", ip, broker.port),
            other => format!("{}:{}", other, broker.port),
        })
    }
}

fn stage_trimmed(dirty: &mut DirtyFlag, slot: &mut String, value: &str) -> bool {
    let value = value.trim();
    if slot == value {
        return false;
    }
    dirty.stage(slot, value.to_string())
}

impl SettingsRecord for WifiSettings {
    fn read_fields<N: NamespaceAccess>(&mut self, ns: &N) {
        self.ssid = ns.get_string(keys::SSID, "");
        self.password = ns.get_string(keys::PASSWORD, "");

        if let Some(broker) = self.broker.as_mut() {
            broker.server = ns.get_string(keys::BROKER_SERVER, "");
            broker.port = ns.get_u16(keys::BROKER_PORT, DEFAULT_BROKER_PORT);
            broker.user = ns.get_string(keys::BROKER_USER, "");
            broker.password = ns.get_string(keys::BROKER_PASSWORD, "");
        }
    }

    fn write_fields<N: NamespaceAccess>(&self, ns: &mut N) -> Result<(), SettingsError> {
        ns.put_string(keys::SSID, &self.ssid)?;
        ns.put_string(keys::PASSWORD, &self.password)?;

        if let Some(broker) = &self.broker {
            ns.put_string(keys::BROKER_SERVER, &broker.server)?;
            ns.put_u16(keys::BROKER_PORT, broker.port)?;
            ns.put_string(keys::BROKER_USER, &broker.user)?;
            ns.put_string(keys::BROKER_PASSWORD, &broker.password)?;
        }
        Ok(())
    }

    fn is_dirty(&self) -> bool {
        self.dirty.is_set()
    }

    fn mark_dirty(&mut self) {
        self.dirty.set();
    }

    fn mark_clean(&mut self) {
        self.dirty.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBackend, StoredValue};
    use crate::settings::SettingsStore;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let settings = WifiSettings::new(SettingsLayout::BaseWithBroker);

        assert_eq!(settings.ssid(), "");
        assert!(!settings.is_configured());
        assert!(!settings.is_dirty());
        let broker = settings.broker().unwrap();
        assert_eq!(broker.port(), 1883);
        assert!(broker.address().is_none());
    }

    #[test]
    fn test_setting_same_value_is_not_a_change() {
        let mut settings = WifiSettings::new(SettingsLayout::Base);

        assert!(!settings.set_ssid(""));
        assert!(!settings.is_dirty());

        assert!(settings.set_ssid("home"));
        assert!(settings.is_dirty());
    }

    #[test]
    fn test_network_fields_are_stored_verbatim() {
        let mut settings = WifiSettings::new(SettingsLayout::Base);

        settings.set_ssid(" home ");
        settings.set_password(" secret ");

        assert_eq!(settings.ssid(), " home ");
        assert_eq!(settings.password(), " secret ");
    }

    #[test]
    fn test_broker_fields_are_trimmed() {
        let mut settings = WifiSettings::new(SettingsLayout::BaseWithBroker);
        settings.set_broker_server("broker.local");
        settings.mark_clean();

        assert!(!settings.set_broker_server("  broker.local \t"));
        assert!(!settings.is_dirty());

        assert!(settings.set_broker_user(" alice "));
        assert_eq!(settings.broker().unwrap().user(), "alice");
    }

    #[test]
    fn test_broker_setters_without_broker_section() {
        let mut settings = WifiSettings::new(SettingsLayout::Base);

        assert!(!settings.set_broker_server("broker.local"));
        assert!(!settings.set_broker_port(8883));
        assert!(!settings.is_dirty());
        assert!(settings.broker_endpoint().is_none());
    }

    #[test]
    fn test_base_layout_persists_network_keys_only() {
        let mut store = SettingsStore::new(MemoryBackend::new());
        let mut settings = WifiSettings::new(SettingsLayout::Base);
        settings.set_ssid("home");

        store.commit(DEFAULT_NAMESPACE, &mut settings).unwrap();

        let backend = store.backend();
        assert_eq!(
            backend.value("WIFI", keys::SSID),
            Some(&StoredValue::Str("home".to_string()))
        );
        assert_eq!(backend.value("WIFI", keys::BROKER_PORT), None);
        assert_eq!(backend.write_count(), 2);
    }

    #[test]
    fn test_round_trip_with_broker() {
        let mut store = SettingsStore::new(MemoryBackend::new());
        let mut settings = WifiSettings::new(SettingsLayout::BaseWithBroker);
        settings.set_ssid("home");
        settings.set_password("secret");
        settings.set_broker_server("10.0.0.2");
        settings.set_broker_port(8883);
        settings.set_broker_user("alice");
        settings.set_broker_password("pw");
        store.commit(DEFAULT_NAMESPACE, &mut settings).unwrap();

        let mut reloaded = WifiSettings::new(SettingsLayout::BaseWithBroker);
        store.load(DEFAULT_NAMESPACE, &mut reloaded).unwrap();

        assert_eq!(reloaded, settings);
    }

    #[test]
    fn test_first_run_defaults() {
        let mut store = SettingsStore::new(MemoryBackend::new());
        let mut settings = WifiSettings::new(SettingsLayout::BaseWithBroker);

        store.load(DEFAULT_NAMESPACE, &mut settings).unwrap();

        assert_eq!(settings, WifiSettings::new(SettingsLayout::BaseWithBroker));
        assert!(store.backend().contains_namespace(DEFAULT_NAMESPACE));
    }

    #[test]
    fn test_broker_address_classification() {
        assert_eq!(
            BrokerAddress::classify("192.168.1.10"),
            Some(BrokerAddress::Ip("192.168.1.10".parse().unwrap()))
        );
        assert_eq!(
            BrokerAddress::classify("mqtt.example.org"),
            Some(BrokerAddress::Host("mqtt.example.org".to_string()))
        );
        assert!(BrokerAddress::classify("::1").unwrap().is_ip());
        assert_eq!(BrokerAddress::classify("   "), None);
    }

    #[test]
    fn test_broker_endpoint() {
        let mut settings = WifiSettings::new(SettingsLayout::BaseWithBroker);
        assert_eq!(settings.broker_endpoint(), None);

        settings.set_broker_server("mqtt.local");
        assert_eq!(settings.broker_endpoint().as_deref(), Some("mqtt.local:1883"));

        settings.set_broker_server("fe80::1");
        settings.set_broker_port(8883);
        assert_eq!(settings.broker_endpoint().as_deref(), Some("[fe80::1]:8883"));
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("8883", 1883), 8883);
        assert_eq!(parse_port(" 1884 ", 1883), 1884);
        assert_eq!(parse_port("", 1883), 1883);
        assert_eq!(parse_port("70000", 1883), 1883);
        assert_eq!(parse_port("abc", 42), 42);
    }
}
