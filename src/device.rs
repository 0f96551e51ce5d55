//! Device identity registry.
//!
//! Pointing devices are identified by their USB vendor/product pair. The
//! registry remembers every device that has produced activity together with
//! its enabled flag, so a disabled trackball or a laptop touchpad can be kept
//! from triggering the layer.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

/// Stable vendor/product pair of a pointing device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId {
    /// USB vendor id.
    pub vendor_id: u16,
    /// USB product id.
    pub product_id: u16,
}

impl DeviceId {
    /// Create a device id from a vendor/product pair.
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    /// Extract the id from a platform device path.
    ///
    /// Windows raw input paths look like
    /// `\\?\HID#VID_046D&PID_C52B&MI_01&Col01#...`.
    pub fn from_device_path(path: &str) -> Option<Self> {
        let upper = path.to_uppercase();
        let vendor = hex_after(&upper, "VID_")?;
        let product = hex_after(&upper, "PID_")?;
        Some(Self::new(vendor, product))
    }
}

fn hex_after(haystack: &str, marker: &str) -> Option<u16> {
    let start = haystack.find(marker)? + marker.len();
    let digits = haystack[start..].split(['&', '#', '\\', '_']).next()?;
    u16::from_str_radix(digits.get(..4)?, 16).ok()
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:{:04X}", self.vendor_id, self.product_id)
    }
}

impl FromStr for DeviceId {
    type Err = Error;

    /// Parse the `VVVV:PPPP` hex form used in configuration files.
    fn from_str(s: &str) -> Result<Self> {
        let malformed = || Error::MalformedConfiguration(format!("bad device id {s:?}"));
        let (vendor, product) = s.trim().split_once(':').ok_or_else(malformed)?;
        let vendor = u16::from_str_radix(vendor.trim_start_matches("0x"), 16).map_err(|_| malformed())?;
        let product =
            u16::from_str_radix(product.trim_start_matches("0x"), 16).map_err(|_| malformed())?;
        Ok(Self::new(vendor, product))
    }
}

/// A pointing device known to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// USB vendor id.
    pub vendor_id: u16,
    /// USB product id.
    pub product_id: u16,
    /// Human-readable name, best effort.
    pub display_name: String,
    /// Whether activity from this device triggers the layer.
    pub enabled: bool,
}

impl DeviceIdentity {
    /// Create an enabled identity.
    pub fn new(id: DeviceId, display_name: impl Into<String>) -> Self {
        Self {
            vendor_id: id.vendor_id,
            product_id: id.product_id,
            display_name: display_name.into(),
            enabled: true,
        }
    }

    /// The vendor/product pair.
    pub fn id(&self) -> DeviceId {
        DeviceId::new(self.vendor_id, self.product_id)
    }
}

/// Persisted per-device settings, keyed by `VVVV:PPPP` in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownDevice {
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Whether the device triggers the layer.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

/// Registry of pointing devices and their enabled policy.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Mutex<HashMap<DeviceId, DeviceIdentity>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a device produced activity and return its identity.
    ///
    /// Devices seen for the first time are registered as enabled. A known
    /// device without a name picks up `display_name`.
    pub fn observe(&self, id: DeviceId, display_name: &str) -> Option<DeviceIdentity> {
        let mut devices = self.devices.lock().ok()?;
        let identity = devices.entry(id).or_insert_with(|| {
            log::info!("New pointing device {} ({})", id, display_name);
            DeviceIdentity::new(id, display_name)
        });
        if identity.display_name.is_empty() && !display_name.is_empty() {
            identity.display_name = display_name.to_string();
        }
        Some(identity.clone())
    }

    /// Look up a device without registering it.
    pub fn get(&self, id: DeviceId) -> Option<DeviceIdentity> {
        self.devices.lock().ok()?.get(&id).cloned()
    }

    /// Check whether a device may trigger the layer.
    ///
    /// Unknown devices are allowed.
    pub fn is_enabled(&self, id: DeviceId) -> bool {
        self.get(id).is_none_or(|identity| identity.enabled)
    }

    /// Explicitly enable or disable a device.
    ///
    /// Returns `false` if the device has never been seen.
    pub fn set_enabled(&self, id: DeviceId, enabled: bool) -> Result<bool> {
        let mut devices = self
            .devices
            .lock()
            .map_err(|_| Error::ThreadError("mutex poisoned".into()))?;
        match devices.get_mut(&id) {
            Some(identity) => {
                if identity.enabled != enabled {
                    log::info!(
                        "Device {} {}",
                        id,
                        if enabled { "enabled" } else { "disabled" }
                    );
                }
                identity.enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Merge configured devices into the registry.
    ///
    /// Configured entries overwrite the enabled flag and name of matching
    /// devices; devices only known at runtime are kept.
    pub fn apply_known(&self, known: impl IntoIterator<Item = DeviceIdentity>) -> Result<()> {
        let mut devices = self
            .devices
            .lock()
            .map_err(|_| Error::ThreadError("mutex poisoned".into()))?;
        for identity in known {
            devices.insert(identity.id(), identity);
        }
        Ok(())
    }

    /// All known devices, ordered by id.
    pub fn devices(&self) -> Vec<DeviceIdentity> {
        let Ok(devices) = self.devices.lock() else {
            return Vec::new();
        };
        let mut list: Vec<_> = devices.values().cloned().collect();
        list.sort_by_key(DeviceIdentity::id);
        list
    }

    /// Export the registry in its persisted form.
    pub fn export(&self) -> BTreeMap<String, KnownDevice> {
        self.devices()
            .into_iter()
            .map(|identity| {
                (
                    identity.id().to_string(),
                    KnownDevice {
                        name: identity.display_name,
                        enabled: identity.enabled,
                    },
                )
            })
            .collect()
    }
}
