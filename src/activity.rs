//! Pointing-device activity plumbing shared by the platform sources.
//!
//! Platform sources report activity either attributed to a device
//! (`device_activity`) or anonymously. [`ActivitySink`] consults the
//! [`DeviceRegistry`] and drops activity from disabled devices before it
//! reaches the action queue.

use crate::device::{DeviceId, DeviceIdentity, DeviceRegistry};
use crate::event::QueuedAction;
use crate::worker::ActionSender;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Which kind of activity source is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivitySourceMode {
    /// Per-device attribution; enable/disable filtering works.
    Raw,
    /// System-wide pointer hook; activity is anonymous and unfiltered.
    Generic,
    /// No activity source is installed.
    Unavailable,
}

impl ActivitySourceMode {
    /// Check if device filtering is in effect.
    pub fn supports_filtering(&self) -> bool {
        matches!(self, ActivitySourceMode::Raw)
    }
}

impl fmt::Display for ActivitySourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActivitySourceMode::Raw => "raw",
            ActivitySourceMode::Generic => "generic",
            ActivitySourceMode::Unavailable => "unavailable",
        })
    }
}

/// Where activity sources deliver their events.
#[derive(Debug, Clone)]
pub struct ActivitySink {
    registry: Arc<DeviceRegistry>,
    queue: ActionSender,
}

impl ActivitySink {
    pub fn new(registry: Arc<DeviceRegistry>, queue: ActionSender) -> Self {
        Self { registry, queue }
    }

    /// Report activity from an identified device.
    ///
    /// Returns `false` if the device is disabled and the activity was dropped.
    pub fn device_activity(&self, id: DeviceId, display_name: &str) -> bool {
        let identity = self
            .registry
            .observe(id, display_name)
            .unwrap_or_else(|| DeviceIdentity::new(id, display_name));
        if !identity.enabled {
            return false;
        }
        self.queue.send(QueuedAction::MouseActivity {
            device: Some(identity),
        });
        true
    }

    /// Report activity that cannot be attributed to a device.
    pub fn anonymous_activity(&self) {
        self.queue.send(QueuedAction::MouseActivity { device: None });
    }

    /// The registry this sink filters against.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }
}

/// One raw pointer report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawMouseSample {
    pub dx: i32,
    pub dy: i32,
    pub button_flags: u16,
}

impl RawMouseSample {
    /// Some devices report at a fixed rate while idle; those reports carry
    /// no motion and no button change.
    pub fn is_activity(&self) -> bool {
        self.dx != 0 || self.dy != 0 || self.button_flags != 0
    }
}

/// Result of resolving a native device handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Handle belongs to this device.
    Device(DeviceId, String),
    /// Handle could not be attributed.
    Unknown,
}

/// Native handle to device identity cache.
///
/// A miss triggers at most one re-enumeration. Handles that stay unresolved
/// are remembered so a chatty unknown device never causes repeated
/// enumeration; [`invalidate`](Self::invalidate) forgets both.
#[derive(Debug)]
pub struct HandleTable<H> {
    known: HashMap<H, (DeviceId, String)>,
    unresolved: HashSet<H>,
}

impl<H: Copy + Eq + Hash> Default for HandleTable<H> {
    fn default() -> Self {
        Self {
            known: HashMap::new(),
            unresolved: HashSet::new(),
        }
    }
}

impl<H: Copy + Eq + Hash> HandleTable<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the table contents with a fresh enumeration.
    pub fn replace(&mut self, devices: impl IntoIterator<Item = (H, DeviceId, String)>) {
        self.known = devices
            .into_iter()
            .map(|(handle, id, name)| (handle, (id, name)))
            .collect();
    }

    /// Resolve `handle`, calling `enumerate` once on a first-time miss.
    pub fn resolve<F, I>(&mut self, handle: H, enumerate: F) -> Resolved
    where
        F: FnOnce() -> I,
        I: IntoIterator<Item = (H, DeviceId, String)>,
    {
        if let Some((id, name)) = self.known.get(&handle) {
            return Resolved::Device(*id, name.clone());
        }
        if self.unresolved.contains(&handle) {
            return Resolved::Unknown;
        }

        self.replace(enumerate());
        match self.known.get(&handle) {
            Some((id, name)) => Resolved::Device(*id, name.clone()),
            None => {
                self.unresolved.insert(handle);
                Resolved::Unknown
            }
        }
    }

    /// Forget everything, e.g. after a device arrived or left.
    pub fn invalidate(&mut self) {
        self.known.clear();
        self.unresolved.clear();
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}
