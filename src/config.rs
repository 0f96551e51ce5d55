//! Layer configuration.
//!
//! Stored as JSON:
//!
//! ```json
//! {
//!   "timeout_ms": 900,
//!   "exit_on_unmapped": true,
//!   "mappings": { "j": "mouse_left_click", "k": "mouse_right_click" },
//!   "known_devices": { "046D:C52B": { "name": "Trackball", "enabled": true } }
//! }
//! ```

use crate::device::{DeviceId, DeviceIdentity, KnownDevice};
use crate::error::{Error, Result};
use crate::event::MouseAction;
use crate::pipeline::KeyMapping;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default inactivity window.
pub const DEFAULT_TIMEOUT_MS: i64 = 900;

const APP_DIR: &str = "mouselayer";
const CONFIG_FILE: &str = "config.json";

/// Everything `Engine::reload` applies in one swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Key name to action name, e.g. `"j": "mouse_left_click"`.
    #[serde(default = "default_mappings", deserialize_with = "lenient_entries")]
    pub mappings: BTreeMap<String, String>,
    /// Inactivity window in milliseconds; `<= 0` never times out.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i64,
    /// Leave the layer when an unmapped key is pressed.
    #[serde(default = "default_exit_on_unmapped", alias = "exit_on_other_key")]
    pub exit_on_unmapped: bool,
    /// Per-device policy keyed by `VVVV:PPPP`.
    #[serde(default, deserialize_with = "lenient_entries")]
    pub known_devices: BTreeMap<String, KnownDevice>,
}

fn default_mappings() -> BTreeMap<String, String> {
    [
        ("j", MouseAction::LeftClick),
        ("k", MouseAction::RightClick),
        ("u", MouseAction::ScrollUp),
        ("i", MouseAction::ScrollDown),
    ]
    .into_iter()
    .map(|(key, action)| (key.to_string(), action.name().to_string()))
    .collect()
}

/// Deserialize a map entry by entry, skipping values of the wrong shape.
fn lenient_entries<'de, D, T>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value(value) {
            Ok(parsed) => Some((key, parsed)),
            Err(e) => {
                log::warn!("Skipping configuration entry {:?}: {}", key, e);
                None
            }
        })
        .collect())
}

fn default_timeout_ms() -> i64 {
    DEFAULT_TIMEOUT_MS
}

fn default_exit_on_unmapped() -> bool {
    true
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            mappings: default_mappings(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            exit_on_unmapped: true,
            known_devices: BTreeMap::new(),
        }
    }
}

impl LayerConfig {
    /// Parse a configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::MalformedConfiguration(format!("invalid configuration: {}", e)))
    }

    /// Serialize to pretty JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a configuration file.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config = Self::from_json_str(&content)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Write the configuration, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json_string()?)?;
        log::info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Build the key mapping; malformed entries are skipped with a warning.
    pub fn key_mapping(&self) -> KeyMapping {
        KeyMapping::from_entries(
            self.mappings
                .iter()
                .map(|(key, action)| (key.as_str(), action.as_str())),
        )
    }

    /// Parse `known_devices`; malformed ids are skipped with a warning.
    pub fn devices(&self) -> Vec<DeviceIdentity> {
        self.known_devices
            .iter()
            .filter_map(|(key, known)| match key.parse::<DeviceId>() {
                Ok(id) => {
                    let mut identity = DeviceIdentity::new(id, known.name.clone());
                    identity.enabled = known.enabled;
                    Some(identity)
                }
                Err(e) => {
                    log::warn!("Skipping known device: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// The platform's default configuration file.
///
/// - Linux: `$XDG_CONFIG_HOME/mouselayer/config.json`
/// - macOS: `~/Library/Application Support/mouselayer/config.json`
/// - Windows: `%APPDATA%\mouselayer\config.json`
pub fn config_path() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| Error::NotSupported("no configuration directory".into()))?;
    Ok(base.join(APP_DIR).join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LayerConfig::default();
        assert_eq!(config.timeout_ms, 900);
        assert!(config.exit_on_unmapped);

        let mapping = config.key_mapping();
        assert_eq!(mapping.len(), 4);
        assert_eq!(mapping.get("j"), Some(MouseAction::LeftClick));
        assert_eq!(mapping.get("i"), Some(MouseAction::ScrollDown));

        // An empty document means all defaults.
        assert_eq!(LayerConfig::from_json_str("{}").unwrap(), config);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let config = LayerConfig::from_json_str(
            r#"{
                "timeout_ms": 500,
                "exit_on_other_key": false,
                "mappings": {"F": "mouse_left_click", "x": "keyboard_control_x", "shift": "mouse_right_click"},
                "known_devices": {
                    "093A:2510": {"name": "Touchpad", "enabled": false},
                    "garbage": {"name": "?"},
                    "046D:C52B": {}
                }
            }"#,
        )
        .unwrap();

        assert!(!config.exit_on_unmapped);
        let mapping = config.key_mapping();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get("f"), Some(MouseAction::LeftClick));

        let devices = config.devices();
        assert_eq!(devices.len(), 2);
        assert!(devices.iter().any(|d| d.id() == DeviceId::new(0x093A, 0x2510) && !d.enabled));
        assert!(devices.iter().any(|d| d.id() == DeviceId::new(0x046D, 0xC52B) && d.enabled));
    }

    #[test]
    fn test_mistyped_entries_do_not_reject_the_file() {
        let config = LayerConfig::from_json_str(
            r#"{
                "mappings": {"j": "mouse_left_click", "k": 5},
                "known_devices": {
                    "093A:2510": {"name": "Touchpad", "enabled": "yes"},
                    "046D:C52B": {"name": "Trackball", "enabled": false}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.mappings.len(), 1);
        assert_eq!(config.key_mapping().get("j"), Some(MouseAction::LeftClick));
        assert_eq!(config.key_mapping().get("k"), None);

        let devices = config.devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id(), DeviceId::new(0x046D, 0xC52B));
        assert!(!devices[0].enabled);
    }

    #[test]
    fn test_invalid_document_is_rejected() {
        assert!(matches!(
            LayerConfig::from_json_str("{ not json"),
            Err(Error::MalformedConfiguration(_))
        ));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = std::env::temp_dir().join(format!("mouselayer-config-{}", std::process::id()));
        let path = dir.join("nested").join(CONFIG_FILE);

        assert_eq!(LayerConfig::load(&path).unwrap(), LayerConfig::default());

        let mut config = LayerConfig::default();
        config.timeout_ms = 0;
        config.known_devices.insert(
            "046D:C52B".into(),
            KnownDevice {
                name: "Trackball".into(),
                enabled: false,
            },
        );
        config.save(&path).unwrap();
        assert_eq!(LayerConfig::load(&path).unwrap(), config);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_config_path_file_name() {
        if let Ok(path) = config_path() {
            assert!(path.ends_with("mouselayer/config.json"));
        }
    }
}
