// linksync Settings Engine
// Loads and saves `LinkSyncSettings` as pretty JSON, with dot-path updates
// (`relay.mode`, `queue.max_attempts`) validated by a round trip through serde.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::platform;
use crate::types::errors::SettingsError;
use crate::types::settings::LinkSyncSettings;

/// Trait defining the settings engine interface.
pub trait SettingsEngineTrait {
    fn load(&mut self) -> Result<LinkSyncSettings, SettingsError>;
    fn save(&self) -> Result<(), SettingsError>;
    fn get_settings(&self) -> &LinkSyncSettings;
    fn get_value(&self, key: &str) -> Result<serde_json::Value, SettingsError>;
    fn set_value(&mut self, key: &str, value: serde_json::Value) -> Result<(), SettingsError>;
    fn reset(&mut self) -> Result<(), SettingsError>;
    fn get_config_path(&self) -> &str;
}

/// Settings engine persisting to a single JSON file.
pub struct SettingsEngine {
    config_path: String,
    settings: LinkSyncSettings,
}

impl SettingsEngine {
    /// Uses `path_override` when given, else `<config dir>/settings.json`.
    pub fn new(path_override: Option<String>) -> Self {
        let config_path = match path_override {
            Some(p) => p,
            None => platform::get_config_dir()
                .join("settings.json")
                .to_string_lossy()
                .to_string(),
        };

        Self {
            config_path,
            settings: LinkSyncSettings::default(),
        }
    }

    fn split_key(key: &str) -> Result<Vec<&str>, SettingsError> {
        let parts: Vec<&str> = key.split('.').collect();
        if key.is_empty() || parts.iter().any(|p| p.is_empty()) {
            return Err(SettingsError::InvalidKey(format!("'{}' is not a dot-separated key", key)));
        }
        Ok(parts)
    }

    fn as_json(&self) -> Result<serde_json::Value, SettingsError> {
        serde_json::to_value(&self.settings)
            .map_err(|e| SettingsError::SerializationError(format!("Failed to serialize settings: {}", e)))
    }
}

impl SettingsEngineTrait for SettingsEngine {
    /// Missing file means defaults; a malformed file is an error, not a silent reset.
    fn load(&mut self) -> Result<LinkSyncSettings, SettingsError> {
        let path = Path::new(&self.config_path);

        if !path.exists() {
            debug!(path = %self.config_path, "no settings file, using defaults");
            self.settings = LinkSyncSettings::default();
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| SettingsError::IoError(format!("Failed to read config file: {}", e)))?;

        self.settings = serde_json::from_str(&content).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to parse config file: {}", e))
        })?;
        Ok(self.settings.clone())
    }

    fn save(&self) -> Result<(), SettingsError> {
        let path = Path::new(&self.config_path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SettingsError::IoError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(&self.settings).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to serialize settings: {}", e))
        })?;

        fs::write(path, json)
            .map_err(|e| SettingsError::IoError(format!("Failed to write config file: {}", e)))
    }

    fn get_settings(&self) -> &LinkSyncSettings {
        &self.settings
    }

    /// Reads one value by dot path; an empty key returns the whole document.
    fn get_value(&self, key: &str) -> Result<serde_json::Value, SettingsError> {
        let root = self.as_json()?;
        if key.is_empty() {
            return Ok(root);
        }
        let mut current = &root;
        for part in Self::split_key(key)? {
            current = current
                .get(part)
                .ok_or_else(|| SettingsError::InvalidKey(format!("Key '{}' not found in settings", key)))?;
        }
        Ok(current.clone())
    }

    /// Updates one value by dot path and saves.
    ///
    /// Only existing keys can be set. The edited document must deserialize
    /// back into `LinkSyncSettings`, so `relay.mode = "carrier-pigeon"` fails
    /// with `InvalidValue` and leaves the settings untouched.
    fn set_value(&mut self, key: &str, value: serde_json::Value) -> Result<(), SettingsError> {
        let parts = Self::split_key(key)?;
        let mut json_value = self.as_json()?;

        {
            let (last, parents) = match parts.split_last() {
                Some(split) => split,
                None => return Err(SettingsError::InvalidKey(key.to_string())),
            };
            let mut current = &mut json_value;
            for part in parents {
                current = current
                    .get_mut(*part)
                    .ok_or_else(|| SettingsError::InvalidKey(format!("Key '{}' not found in settings", key)))?;
            }
            match current {
                serde_json::Value::Object(map) if map.contains_key(*last) => {
                    map.insert(last.to_string(), value);
                }
                serde_json::Value::Object(_) => {
                    return Err(SettingsError::InvalidKey(format!("Key '{}' not found in settings", key)));
                }
                _ => {
                    return Err(SettingsError::InvalidKey(format!(
                        "Cannot navigate to key '{}': intermediate value is not an object",
                        key
                    )));
                }
            }
        }

        self.settings = serde_json::from_value(json_value).map_err(|e| {
            SettingsError::InvalidValue(format!("Invalid value for key '{}': {}", key, e))
        })?;
        self.save()?;
        info!(key, "setting updated");
        Ok(())
    }

    fn reset(&mut self) -> Result<(), SettingsError> {
        self.settings = LinkSyncSettings::default();
        self.save()
    }

    fn get_config_path(&self) -> &str {
        &self.config_path
    }
}
