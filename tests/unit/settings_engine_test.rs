//! Unit tests for the Settings Engine.
//!
//! Every test points the engine at a file inside a fresh temp directory.

use linksync::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use linksync::types::errors::SettingsError;
use linksync::types::settings::{BackendKind, LinkSyncSettings, RelayMode};
use serde_json::json;
use tempfile::TempDir;

fn engine_in(dir: &TempDir) -> SettingsEngine {
    let path = dir.path().join("config").join("settings.json");
    SettingsEngine::new(Some(path.to_string_lossy().to_string()))
}

#[test]
fn test_load_without_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in(&dir);
    let settings = engine.load().unwrap();
    assert_eq!(settings, LinkSyncSettings::default());
    assert_eq!(settings.relay.mode, RelayMode::Disabled);
    assert_eq!(settings.queue.max_attempts, 3);
    assert_eq!(settings.queue.publish_timeout_secs, 10);
    assert_eq!(settings.storage.backends, vec![BackendKind::Sqlite]);
}

#[test]
fn test_set_value_persists_across_engines() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in(&dir);
    engine.load().unwrap();
    engine.set_value("relay.mode", json!("local")).unwrap();
    engine.set_value("queue.max_attempts", json!(5)).unwrap();

    let mut reopened = engine_in(&dir);
    let settings = reopened.load().unwrap();
    assert_eq!(settings.relay.mode, RelayMode::Local);
    assert_eq!(settings.queue.max_attempts, 5);
}

#[test]
fn test_set_value_rejects_unknown_key() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in(&dir);
    let err = engine.set_value("relay.colour", json!("blue")).unwrap_err();
    assert!(matches!(err, SettingsError::InvalidKey(_)));
    let err = engine.set_value("relay.mode.inner", json!("x")).unwrap_err();
    assert!(matches!(err, SettingsError::InvalidKey(_)));
}

#[test]
fn test_set_value_rejects_wrong_type_and_keeps_settings() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in(&dir);
    let err = engine.set_value("relay.mode", json!("carrier-pigeon")).unwrap_err();
    assert!(matches!(err, SettingsError::InvalidValue(_)));
    let err = engine.set_value("queue.max_attempts", json!("three")).unwrap_err();
    assert!(matches!(err, SettingsError::InvalidValue(_)));
    assert_eq!(engine.get_settings(), &LinkSyncSettings::default());
    // Nothing was written.
    assert!(!std::path::Path::new(engine.get_config_path()).exists());
}

#[test]
fn test_get_value_by_path_and_whole_document() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir);
    assert_eq!(engine.get_value("queue.retry_delay_ms").unwrap(), json!(500));
    assert_eq!(engine.get_value("relay.mode").unwrap(), json!("disabled"));
    let whole = engine.get_value("").unwrap();
    assert!(whole.get("relay").is_some());
    assert!(whole.get("logging").is_some());
    assert!(matches!(engine.get_value("nope"), Err(SettingsError::InvalidKey(_))));
}

#[test]
fn test_reset_restores_defaults_on_disk() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in(&dir);
    engine.set_value("remote_store.base_url", json!("http://localhost:5000")).unwrap();
    engine.reset().unwrap();

    let mut reopened = engine_in(&dir);
    assert_eq!(reopened.load().unwrap(), LinkSyncSettings::default());
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in(&dir);
    engine.save().unwrap();
    std::fs::write(engine.get_config_path(), "{ not json").unwrap();
    assert!(matches!(engine.load(), Err(SettingsError::SerializationError(_))));
}
