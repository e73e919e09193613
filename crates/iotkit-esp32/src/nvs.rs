//! NVS (Non-Volatile Storage) settings backend.
//!
//! Strings and `u16` values map to the native NVS types; booleans are stored
//! as `u8`.

use std::marker::PhantomData;

use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_svc::sys::{EspError, ESP_ERR_NVS_NOT_FOUND};
use log::warn;

use iotkit_core::settings::validate_name;
use iotkit_core::{AccessMode, KeyValueBackend, NamespaceAccess, SettingsError};

/// Longest string value read back from flash, terminator included.
const MAX_STR_LEN: usize = 128;

/// [`KeyValueBackend`] over the default NVS partition.
pub struct NvsBackend {
    partition: EspDefaultNvsPartition,
}

impl NvsBackend {
    pub fn new(partition: EspDefaultNvsPartition) -> Self {
        Self { partition }
    }
}

impl KeyValueBackend for NvsBackend {
    type Namespace<'a> = NvsNamespace<'a>;

    fn open(
        &mut self,
        namespace: &str,
        mode: AccessMode,
    ) -> Result<NvsNamespace<'_>, SettingsError> {
        validate_name(namespace)?;
        let read_write = mode == AccessMode::ReadWrite;

        match EspNvs::new(self.partition.clone(), namespace, read_write) {
            Ok(nvs) => Ok(NvsNamespace {
                name: namespace.to_string(),
                nvs,
                mode,
                _backend: PhantomData,
            }),
            Err(e) if is_not_found(&e) => Err(SettingsError::NotFound(namespace.to_string())),
            Err(e) => Err(SettingsError::OpenFailed {
                namespace: namespace.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

fn is_not_found(e: &EspError) -> bool {
    e.code() == ESP_ERR_NVS_NOT_FOUND as i32
}

/// An open NVS namespace. Closed when dropped.
pub struct NvsNamespace<'a> {
    name: String,
    nvs: EspNvs<NvsDefault>,
    mode: AccessMode,
    _backend: PhantomData<&'a mut NvsBackend>,
}

impl NvsNamespace<'_> {
    fn check_writable(&self, key: &str) -> Result<(), SettingsError> {
        if self.mode == AccessMode::ReadOnly {
            return Err(SettingsError::ReadOnly(self.name.clone()));
        }
        validate_name(key)
    }

    fn write_failed(key: &str, e: EspError) -> SettingsError {
        SettingsError::WriteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        }
    }
}

impl NamespaceAccess for NvsNamespace<'_> {
    fn get_string(&self, key: &str, default: &str) -> String {
        let mut buf = [0u8; MAX_STR_LEN];
        match self.nvs.get_str(key, &mut buf) {
            Ok(Some(value)) => value.to_string(),
            Ok(None) => default.to_string(),
            Err(e) => {
                warn!("NVS read of {}/{} failed: {}", self.name, key, e);
                default.to_string()
            }
        }
    }

    fn get_u16(&self, key: &str, default: u16) -> u16 {
        self.nvs.get_u16(key).ok().flatten().unwrap_or(default)
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.nvs.get_u8(key) {
            Ok(Some(value)) => value != 0,
            _ => default,
        }
    }

    fn put_string(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.check_writable(key)?;
        self.nvs
            .set_str(key, value)
            .map_err(|e| Self::write_failed(key, e))
    }

    fn put_u16(&mut self, key: &str, value: u16) -> Result<(), SettingsError> {
        self.check_writable(key)?;
        self.nvs
            .set_u16(key, value)
            .map_err(|e| Self::write_failed(key, e))
    }

    fn put_bool(&mut self, key: &str, value: bool) -> Result<(), SettingsError> {
        self.check_writable(key)?;
        self.nvs
            .set_u8(key, u8::from(value))
            .map_err(|e| Self::write_failed(key, e))
    }
}
