//! Persistence tests for the JSON-file settings backend.

use iotkit_core::{
    AccessMode, KeyValueBackend, NamespaceAccess, SettingsError, SettingsLayout, SettingsRecord,
    SettingsStore, WifiSettings,
};
use iotkit_host::FileBackend;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

#[test]
fn test_first_run_creates_namespace_file() {
    let dir = tempdir().unwrap();
    let mut store = SettingsStore::new(FileBackend::new(dir.path()).unwrap());
    let mut settings = WifiSettings::new(SettingsLayout::BaseWithBroker);

    store.load("WIFI", &mut settings).unwrap();

    assert!(dir.path().join("WIFI.json").exists());
    assert_eq!(settings, WifiSettings::new(SettingsLayout::BaseWithBroker));
}

#[test]
fn test_settings_survive_a_new_backend() {
    let dir = tempdir().unwrap();
    let mut settings = WifiSettings::new(SettingsLayout::BaseWithBroker);
    settings.set_ssid("NET2");
    settings.set_password("pass2");
    settings.set_broker_server("mqtt.local");
    settings.set_broker_port(8883);
    {
        let mut store = SettingsStore::new(FileBackend::new(dir.path()).unwrap());
        assert_eq!(store.commit("WIFI", &mut settings), Ok(true));
    }

    let mut store = SettingsStore::new(FileBackend::new(dir.path()).unwrap());
    let mut reloaded = WifiSettings::new(SettingsLayout::BaseWithBroker);
    store.load("WIFI", &mut reloaded).unwrap();

    assert_eq!(reloaded, settings);
    assert!(!reloaded.is_dirty());
}

#[test]
fn test_document_is_plain_json() {
    let dir = tempdir().unwrap();
    let mut store = SettingsStore::new(FileBackend::new(dir.path()).unwrap());
    let mut settings = WifiSettings::new(SettingsLayout::BaseWithBroker);
    settings.set_ssid("home");
    store.commit("WIFI", &mut settings).unwrap();

    let text = std::fs::read_to_string(dir.path().join("WIFI.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();

    assert_eq!(json["SSID"], "home");
    assert_eq!(json["MQTTPORT"], 1883);
}

#[test]
fn test_read_only_open_of_missing_namespace() {
    let dir = tempdir().unwrap();
    let mut backend = FileBackend::new(dir.path()).unwrap();

    assert!(matches!(
        backend.open("WIFI", AccessMode::ReadOnly),
        Err(SettingsError::NotFound(_))
    ));
    assert!(!dir.path().join("WIFI.json").exists());
}

#[test]
fn test_read_only_handle_rejects_writes() {
    let dir = tempdir().unwrap();
    let mut backend = FileBackend::new(dir.path()).unwrap();
    backend.open("WIFI", AccessMode::ReadWrite).unwrap();

    let mut ns = backend.open("WIFI", AccessMode::ReadOnly).unwrap();

    assert_eq!(
        ns.put_bool("FLAG", true),
        Err(SettingsError::ReadOnly("WIFI".to_string()))
    );
}

#[test]
fn test_corrupt_document_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("WIFI.json"), "{ not json").unwrap();
    let mut store = SettingsStore::new(FileBackend::new(dir.path()).unwrap());
    let mut settings = WifiSettings::new(SettingsLayout::Base);

    store.load("WIFI", &mut settings).unwrap();
    assert_eq!(settings.ssid(), "");

    settings.set_ssid("home");
    store.commit("WIFI", &mut settings).unwrap();
    let mut reloaded = WifiSettings::new(SettingsLayout::Base);
    store.load("WIFI", &mut reloaded).unwrap();
    assert_eq!(reloaded.ssid(), "home");
}

#[test]
fn test_read_only_open_of_corrupt_document_yields_defaults() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("WIFI.json"), "{ not json").unwrap();
    let mut backend = FileBackend::new(dir.path()).unwrap();

    let ns = backend.open("WIFI", AccessMode::ReadOnly).unwrap();

    assert_eq!(ns.get_string("SSID", "fallback"), "fallback");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("WIFI.json")).unwrap(),
        "{ not json"
    );
}

#[test]
fn test_erase_namespace() {
    let dir = tempdir().unwrap();
    let mut backend = FileBackend::new(dir.path()).unwrap();
    backend.open("WIFI", AccessMode::ReadWrite).unwrap();

    assert!(backend.erase_namespace("WIFI").unwrap());
    assert!(!backend.erase_namespace("WIFI").unwrap());
}

#[test]
fn test_no_temp_files_left_behind() {
    let dir = tempdir().unwrap();
    let mut store = SettingsStore::new(FileBackend::new(dir.path()).unwrap());
    let mut settings = WifiSettings::new(SettingsLayout::BaseWithBroker);
    settings.set_ssid("home");
    store.commit("WIFI", &mut settings).unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();

    assert_eq!(names, vec!["WIFI.json".to_string()]);
}
