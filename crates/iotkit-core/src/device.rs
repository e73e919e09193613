//! Device identity: name, model, manufacturer and firmware version.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version in `X.Y.Z` form, ordered by major, then minor, then patch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemanticVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl SemanticVersion {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    #[error("Expected X.Y.Z, got '{0}'")]
    Format(String),

    #[error("Invalid version component '{0}'")]
    Component(String),
}

impl FromStr for SemanticVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(VersionParseError::Format(s.to_string()));
        }

        let component = |part: &str| {
            part.parse::<u16>()
                .map_err(|_| VersionParseError::Component(part.to_string()))
        };

        Ok(Self {
            major: component(parts[0])?,
            minor: component(parts[1])?,
            patch: component(parts[2])?,
        })
    }
}

impl Serialize for SemanticVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemanticVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Static description of a device, as announced to a home-automation hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProperties {
    pub name: String,
    pub model: String,
    pub manufacturer: String,
    pub version: SemanticVersion,
    /// Where firmware updates are fetched from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_url: Option<String>,
}

impl DeviceProperties {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        manufacturer: impl Into<String>,
        version: SemanticVersion,
    ) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            manufacturer: manufacturer.into(),
            version,
            update_url: None,
        }
    }

    pub fn with_update_url(mut self, url: impl Into<String>) -> Self {
        self.update_url = Some(url.into());
        self
    }

    /// `true` when `available` is newer than the running firmware.
    pub fn is_update(&self, available: SemanticVersion) -> bool {
        available > self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ordering() {
        let v = SemanticVersion::new(1, 2, 3);

        assert!(SemanticVersion::new(2, 0, 0) > v);
        assert!(SemanticVersion::new(1, 3, 0) > v);
        assert!(SemanticVersion::new(1, 2, 4) > v);
        assert!(SemanticVersion::new(1, 2, 2) < v);
        assert!(SemanticVersion::new(0, 9, 9) < v);
        assert_eq!(SemanticVersion::new(1, 2, 3), v);
    }

    #[test]
    fn test_version_parse_and_display() {
        let v: SemanticVersion = "1.0.12".parse().unwrap();

        assert_eq!(v, SemanticVersion::new(1, 0, 12));
        assert_eq!(v.to_string(), "1.0.12");
    }

    #[test]
    fn test_version_parse_errors() {
        assert!(matches!(
            "1.0".parse::<SemanticVersion>(),
            Err(VersionParseError::Format(_))
        ));
        assert!(matches!(
            "1.x.0".parse::<SemanticVersion>(),
            Err(VersionParseError::Component(c)) if c == "x"
        ));
        assert!("1.0.70000".parse::<SemanticVersion>().is_err());
    }

    #[test]
    fn test_properties_json() {
        let props = DeviceProperties::new("Boiler", "BX-1", "DIY", SemanticVersion::new(1, 1, 0))
            .with_update_url("http://updates.local/bx1.bin");

        let json = serde_json::to_value(&props).unwrap();
        assert_eq!(json["version"], "1.1.0");
        assert_eq!(json["updateUrl"], "http://updates.local/bx1.bin");

        let back: DeviceProperties = serde_json::from_value(json).unwrap();
        assert_eq!(back, props);
    }

    #[test]
    fn test_is_update() {
        let props = DeviceProperties::new("Boiler", "BX-1", "DIY", SemanticVersion::new(1, 1, 0));

        assert!(props.is_update(SemanticVersion::new(1, 1, 1)));
        assert!(!props.is_update(SemanticVersion::new(1, 1, 0)));
    }
}
