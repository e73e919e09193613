//! File-backed settings storage.
//!
//! Each namespace is one JSON document `<dir>/<namespace>.json` mapping keys
//! to plain JSON values:
//!
//! ```json
//! { "SSID": "home", "PWD": "secret", "MQTTPORT": 1883 }
//! ```
//!
//! Every put rewrites the document through a temp file and a rename, so a
//! reader never observes a half-written file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use iotkit_core::settings::validate_name;
use iotkit_core::{AccessMode, KeyValueBackend, NamespaceAccess, SettingsError};

use crate::error::HostError;

/// A stored value. Untagged so the files stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileValue {
    Bool(bool),
    U16(u16),
    Str(String),
}

type Document = BTreeMap<String, FileValue>;

/// [`KeyValueBackend`] storing one JSON file per namespace.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Use `dir` as the settings directory, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, HostError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| HostError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document holding `namespace`.
    pub fn namespace_path(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{}.json", namespace))
    }

    /// Delete a namespace document. Returns `false` if it did not exist.
    pub fn erase_namespace(&self, namespace: &str) -> Result<bool, HostError> {
        let path = self.namespace_path(namespace);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(HostError::io(path, e)),
        }
    }
}

fn read_document(path: &Path) -> Result<Document, HostError> {
    let text = std::fs::read_to_string(path).map_err(|e| HostError::io(path, e))?;
    serde_json::from_str(&text).map_err(|source| HostError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_document(path: &Path, document: &Document) -> std::io::Result<()> {
    let text = serde_json::to_string_pretty(document)?;

    let parent = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("settings");
    let temp_path = parent.join(format!(".{}.tmp-{}", file_name, std::process::id()));

    std::fs::write(&temp_path, text)?;
    std::fs::rename(&temp_path, path)
}

fn open_failed(namespace: &str, err: impl std::fmt::Display) -> SettingsError {
    SettingsError::OpenFailed {
        namespace: namespace.to_string(),
        reason: err.to_string(),
    }
}

impl KeyValueBackend for FileBackend {
    type Namespace<'a> = FileNamespace<'a>;

    fn open(
        &mut self,
        namespace: &str,
        mode: AccessMode,
    ) -> Result<FileNamespace<'_>, SettingsError> {
        validate_name(namespace)?;
        let path = self.namespace_path(namespace);

        let document = if path.exists() {
            match read_document(&path) {
                Ok(document) => document,
                Err(HostError::Json { source, .. }) => {
                    warn!(namespace, %source, "discarding unreadable settings document");
                    Document::new()
                }
                Err(e) => return Err(open_failed(namespace, e)),
            }
        } else {
            match mode {
                AccessMode::ReadOnly => {
                    return Err(SettingsError::NotFound(namespace.to_string()));
                }
                AccessMode::ReadWrite => {
                    let document = Document::new();
                    write_document(&path, &document).map_err(|e| open_failed(namespace, e))?;
                    debug!(namespace, path = %path.display(), "created settings namespace");
                    document
                }
            }
        };

        Ok(FileNamespace {
            name: namespace.to_string(),
            path,
            mode,
            document,
            _backend: std::marker::PhantomData,
        })
    }
}

/// Open namespace of a [`FileBackend`].
#[derive(Debug)]
pub struct FileNamespace<'a> {
    name: String,
    path: PathBuf,
    mode: AccessMode,
    document: Document,
    _backend: std::marker::PhantomData<&'a mut FileBackend>,
}

impl FileNamespace<'_> {
    fn put(&mut self, key: &str, value: FileValue) -> Result<(), SettingsError> {
        validate_name(key)?;
        if self.mode == AccessMode::ReadOnly {
            return Err(SettingsError::ReadOnly(self.name.clone()));
        }

        let previous = self.document.insert(key.to_string(), value);
        if let Err(e) = write_document(&self.path, &self.document) {
            // Keep memory in line with what is on disk.
            match previous {
                Some(previous) => self.document.insert(key.to_string(), previous),
                None => self.document.remove(key),
            };
            return Err(SettingsError::WriteFailed {
                key: key.to_string(),
                reason: e.to_string(),
            });
        }
        Ok(())
    }
}

impl NamespaceAccess for FileNamespace<'_> {
    fn get_string(&self, key: &str, default: &str) -> String {
        match self.document.get(key) {
            Some(FileValue::Str(s)) => s.clone(),
            _ => default.to_string(),
        }
    }

    fn get_u16(&self, key: &str, default: u16) -> u16 {
        match self.document.get(key) {
            Some(FileValue::U16(v)) => *v,
            _ => default,
        }
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.document.get(key) {
            Some(FileValue::Bool(b)) => *b,
            _ => default,
        }
    }

    fn put_string(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.put(key, FileValue::Str(value.to_string()))
    }

    fn put_u16(&mut self, key: &str, value: u16) -> Result<(), SettingsError> {
        self.put(key, FileValue::U16(value))
    }

    fn put_bool(&mut self, key: &str, value: bool) -> Result<(), SettingsError> {
        self.put(key, FileValue::Bool(value))
    }
}
