//! Namespace-scoped settings persistence.
//!
//! This module provides the storage abstraction that every platform implements
//! differently:
//! - Linux: one JSON document per namespace (`iotkit-host`)
//! - ESP32: NVS (Non-Volatile Storage) partitions (`iotkit-esp32`)
//! - Tests: [`MemoryBackend`](crate::memory::MemoryBackend)
//!
//! Records are written through an explicit two-step protocol. Field setters
//! *stage* a value and flip the record's dirty flag when it changes;
//! [`SettingsStore::commit`] writes the record only when it is dirty and
//! clears the flag once the write succeeded. Flash has a finite number of
//! erase cycles, so the dirty flag is the only gate for a physical write.

use thiserror::Error;
use tracing::{debug, warn};

/// Longest namespace or key name accepted by NVS.
pub const MAX_NAME_LEN: usize = 15;

/// Errors that can occur while reading or writing settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// The namespace does not exist (only reported for read-only opens).
    #[error("Namespace not found: {0}")]
    NotFound(String),

    /// The backing store could not open the namespace.
    #[error("Failed to open namespace '{namespace}': {reason}")]
    OpenFailed { namespace: String, reason: String },

    /// A write was attempted through a read-only handle.
    #[error("Namespace '{0}' is open read-only")]
    ReadOnly(String),

    /// A single key could not be written.
    #[error("Failed to write key '{key}': {reason}")]
    WriteFailed { key: String, reason: String },

    /// Namespace or key name is empty, too long, or not ASCII.
    #[error("Invalid namespace or key name: '{0}'")]
    InvalidName(String),
}

/// How a namespace is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Reads only. Fails with [`SettingsError::NotFound`] when the namespace
    /// has never been created.
    ReadOnly,
    /// Reads and writes. Creates the namespace if it does not exist.
    ReadWrite,
}

/// Typed access to the keys of one open namespace.
///
/// Getters never fail: a missing key, a key stored with a different type, or a
/// transient read error all yield the caller-supplied default.
pub trait NamespaceAccess {
    fn get_string(&self, key: &str, default: &str) -> String;

    fn get_u16(&self, key: &str, default: u16) -> u16;

    fn get_bool(&self, key: &str, default: bool) -> bool;

    fn put_string(&mut self, key: &str, value: &str) -> Result<(), SettingsError>;

    fn put_u16(&mut self, key: &str, value: u16) -> Result<(), SettingsError>;

    fn put_bool(&mut self, key: &str, value: bool) -> Result<(), SettingsError>;
}

/// A key/value store partitioned into named namespaces.
///
/// All methods are synchronous so the trait can be implemented on embedded
/// targets without an async runtime.
pub trait KeyValueBackend {
    /// Handle to an open namespace. Dropping it closes the namespace.
    type Namespace<'a>: NamespaceAccess
    where
        Self: 'a;

    /// Open `namespace` with the given access mode.
    fn open(
        &mut self,
        namespace: &str,
        mode: AccessMode,
    ) -> Result<Self::Namespace<'_>, SettingsError>;
}

/// An aggregate of fields persisted together in one namespace.
pub trait SettingsRecord {
    /// Populate every known field from `ns`, using per-field defaults for
    /// absent keys. Must not touch the dirty flag.
    fn read_fields<N: NamespaceAccess>(&mut self, ns: &N);

    /// Write every field to `ns`, unconditionally.
    fn write_fields<N: NamespaceAccess>(&self, ns: &mut N) -> Result<(), SettingsError>;

    fn is_dirty(&self) -> bool;

    fn mark_dirty(&mut self);

    fn mark_clean(&mut self);
}

/// Dirty bit shared by settings records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyFlag(bool);

impl DirtyFlag {
    /// Store `value` into `slot`, setting the flag if it differs.
    ///
    /// Returns `true` when the stored value changed.
    pub fn stage<T: PartialEq>(&mut self, slot: &mut T, value: T) -> bool {
        if *slot == value {
            return false;
        }
        *slot = value;
        self.0 = true;
        true
    }

    pub fn is_set(&self) -> bool {
        self.0
    }

    pub fn set(&mut self) {
        self.0 = true;
    }

    pub fn clear(&mut self) {
        self.0 = false;
    }
}

/// Check a namespace or key name against the NVS limits.
pub fn validate_name(name: &str) -> Result<(), SettingsError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN || !name.is_ascii() {
        return Err(SettingsError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Persistence engine for [`SettingsRecord`]s.
#[derive(Debug)]
pub struct SettingsStore<B> {
    backend: B,
}

impl<B: KeyValueBackend> SettingsStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Read every field of `record` from `namespace`.
    ///
    /// On first run the namespace does not exist yet; it is created and the
    /// record is filled with defaults. Any other open failure is returned
    /// without creating anything, `record` is left untouched and the caller
    /// carries on with whatever it already holds.
    pub fn load<R: SettingsRecord>(
        &mut self,
        namespace: &str,
        record: &mut R,
    ) -> Result<(), SettingsError> {
        let mode = match self.backend.open(namespace, AccessMode::ReadOnly) {
            Ok(_) => AccessMode::ReadOnly,
            Err(SettingsError::NotFound(_)) => {
                debug!(namespace, "namespace does not exist yet, creating it");
                AccessMode::ReadWrite
            }
            Err(err) => return Err(err),
        };

        let ns = self.backend.open(namespace, mode)?;
        record.read_fields(&ns);
        Ok(())
    }

    /// Write every field of `record` to `namespace`.
    ///
    /// There is no rollback: if a write fails midway, the keys written before
    /// the failure keep their new values.
    pub fn save<R: SettingsRecord>(
        &mut self,
        namespace: &str,
        record: &R,
    ) -> Result<(), SettingsError> {
        let mut ns = self.backend.open(namespace, AccessMode::ReadWrite)?;
        record.write_fields(&mut ns)
    }

    /// Save `record` if it is dirty and clear the flag on success.
    ///
    /// Returns `Ok(true)` when a write happened and `Ok(false)` when the
    /// record was clean. On failure the dirty flag is kept so a later commit
    /// retries.
    pub fn commit<R: SettingsRecord>(
        &mut self,
        namespace: &str,
        record: &mut R,
    ) -> Result<bool, SettingsError> {
        if !record.is_dirty() {
            debug!(namespace, "settings unchanged, skipping write");
            return Ok(false);
        }

        match self.save(namespace, record) {
            Ok(()) => {
                record.mark_clean();
                debug!(namespace, "settings committed");
                Ok(true)
            }
            Err(err) => {
                warn!(namespace, %err, "settings write failed, keeping dirty flag");
                Err(err)
            }
        }
    }
}
