//! In-memory key/value backend.
//!
//! Used by unit tests, by host simulations, and anywhere a volatile settings
//! store is acceptable. Supports fault injection so the error paths of
//! [`SettingsStore`](crate::settings::SettingsStore) can be exercised.

use std::collections::BTreeMap;

use crate::settings::{validate_name, AccessMode, KeyValueBackend, NamespaceAccess, SettingsError};

/// A value as it sits in the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    Str(String),
    U16(u16),
    Bool(bool),
}

type Entries = BTreeMap<String, StoredValue>;

/// Volatile [`KeyValueBackend`] keeping every namespace in a `BTreeMap`.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    namespaces: BTreeMap<String, Entries>,
    /// Fail every open with [`SettingsError::OpenFailed`].
    fail_open: bool,
    /// Fail read-only opens only.
    fail_read_only_open: bool,
    /// Number of further puts allowed before writes start failing.
    write_budget: Option<usize>,
    /// Successful puts since creation.
    writes: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent open fail, simulating an unavailable partition.
    pub fn set_open_failure(&mut self, fail: bool) {
        self.fail_open = fail;
    }

    /// Make read-only opens fail while read-write opens still succeed.
    pub fn set_read_only_open_failure(&mut self, fail: bool) {
        self.fail_read_only_open = fail;
    }

    /// Allow `count` more successful puts, then fail every write.
    pub fn fail_writes_after(&mut self, count: usize) {
        self.write_budget = Some(count);
    }

    /// Remove any write failure injected with [`fail_writes_after`](Self::fail_writes_after).
    pub fn clear_write_failure(&mut self) {
        self.write_budget = None;
    }

    /// Total number of successful puts.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    pub fn contains_namespace(&self, namespace: &str) -> bool {
        self.namespaces.contains_key(namespace)
    }

    /// Look at a raw stored value.
    pub fn value(&self, namespace: &str, key: &str) -> Option<&StoredValue> {
        self.namespaces.get(namespace)?.get(key)
    }

    /// Seed a raw value, creating the namespace if needed.
    pub fn insert(&mut self, namespace: &str, key: &str, value: StoredValue) {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Drop a whole namespace, as a factory reset would.
    pub fn erase_namespace(&mut self, namespace: &str) -> bool {
        self.namespaces.remove(namespace).is_some()
    }
}

impl KeyValueBackend for MemoryBackend {
    type Namespace<'a> = MemoryNamespace<'a>;

    fn open(
        &mut self,
        namespace: &str,
        mode: AccessMode,
    ) -> Result<MemoryNamespace<'_>, SettingsError> {
        validate_name(namespace)?;

        if self.fail_open || (self.fail_read_only_open && mode == AccessMode::ReadOnly) {
            return Err(SettingsError::OpenFailed {
                namespace: namespace.to_string(),
                reason: "storage unavailable".to_string(),
            });
        }

        if mode == AccessMode::ReadOnly && !self.namespaces.contains_key(namespace) {
            return Err(SettingsError::NotFound(namespace.to_string()));
        }

        let entries = self.namespaces.entry(namespace.to_string()).or_default();
        Ok(MemoryNamespace {
            name: namespace.to_string(),
            mode,
            entries,
            write_budget: &mut self.write_budget,
            writes: &mut self.writes,
        })
    }
}

/// Open namespace of a [`MemoryBackend`].
#[derive(Debug)]
pub struct MemoryNamespace<'a> {
    name: String,
    mode: AccessMode,
    entries: &'a mut Entries,
    write_budget: &'a mut Option<usize>,
    writes: &'a mut usize,
}

impl MemoryNamespace<'_> {
    fn put(&mut self, key: &str, value: StoredValue) -> Result<(), SettingsError> {
        validate_name(key)?;

        if self.mode == AccessMode::ReadOnly {
            return Err(SettingsError::ReadOnly(self.name.clone()));
        }

        if let Some(budget) = self.write_budget.as_mut() {
            if *budget == 0 {
                return Err(SettingsError::WriteFailed {
                    key: key.to_string(),
                    reason: "injected write failure".to_string(),
                });
            }
            *budget -= 1;
        }

        self.entries.insert(key.to_string(), value);
        *self.writes += 1;
        Ok(())
    }
}

impl NamespaceAccess for MemoryNamespace<'_> {
    fn get_string(&self, key: &str, default: &str) -> String {
        match self.entries.get(key) {
            Some(StoredValue::Str(s)) => s.clone(),
            _ => default.to_string(),
        }
    }

    fn get_u16(&self, key: &str, default: u16) -> u16 {
        match self.entries.get(key) {
            Some(StoredValue::U16(v)) => *v,
            _ => default,
        }
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.entries.get(key) {
            Some(StoredValue::Bool(b)) => *b,
            _ => default,
        }
    }

    fn put_string(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.put(key, StoredValue::Str(value.to_string()))
    }

    fn put_u16(&mut self, key: &str, value: u16) -> Result<(), SettingsError> {
        self.put(key, StoredValue::U16(value))
    }

    fn put_bool(&mut self, key: &str, value: bool) -> Result<(), SettingsError> {
        self.put(key, StoredValue::Bool(value))
    }
}
