//! Keyboard interception and pointer activity from `/dev/input`.
//!
//! Keyboards are grabbed so that suppressed keys never reach the session;
//! everything else is re-emitted through a uinput passthrough. Pointer
//! nodes are read without grabbing. Both loops rescan for hotplugged
//! devices.

use crate::activity::ActivitySink;
use crate::device::DeviceId;
use crate::error::{Error, Result};
use crate::pipeline::KeyInterceptor;
use crate::service::{POLL_INTERVAL, ServiceThread};
use evdev::{Device, InputEventKind, Key as EvdevKey, RelativeAxisType};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use super::await_startup;
use super::nodes::NodeSet;
use super::simulate::KeyPassthrough;
use crate::platform::linux::keycodes::evdev_keycode_to_key;

/// Key event values.
const KEY_RELEASE: i32 = 0;
const KEY_PRESS: i32 = 1;
const KEY_REPEAT: i32 = 2;

/// Pointer buttons as reported by mice and trackballs.
const BTN_MOUSE_FIRST: u16 = 0x110;
const BTN_MOUSE_LAST: u16 = 0x117;

fn is_keyboard(device: &Device) -> bool {
    let has_letters = device
        .supported_keys()
        .is_some_and(|keys| keys.contains(EvdevKey::KEY_A) && keys.contains(EvdevKey::KEY_Z));
    // Combined receivers that also move the pointer stay ungrabbed, or the
    // activity reader would go blind on them.
    has_letters && !is_pointer(device)
}

fn is_pointer(device: &Device) -> bool {
    device.supported_relative_axes().is_some_and(|axes| {
        axes.contains(RelativeAxisType::REL_X) && axes.contains(RelativeAxisType::REL_Y)
    })
}

fn any_key_down(device: &Device) -> bool {
    device
        .get_key_state()
        .map(|state| state.iter().next().is_some())
        .unwrap_or(false)
}

/// Grabs keyboards and routes their keys through the interceptor.
struct KeyboardGrab {
    interceptor: Arc<KeyInterceptor>,
    passthrough: KeyPassthrough,
    nodes: NodeSet,
}

impl KeyboardGrab {
    /// Pick up new keyboards. Returns `(grabbed, deferred)`.
    fn rescan(&mut self) -> Result<(usize, usize)> {
        let mut deferred = 0;
        let grabbed = self.nodes.rescan(|device| {
            if !is_keyboard(device) {
                return false;
            }
            // Grabbing with a key down would strand its release.
            if any_key_down(device) {
                deferred += 1;
                return false;
            }
            match device.grab() {
                Ok(()) => true,
                Err(e) => {
                    log::warn!(
                        "Failed to grab keyboard {}: {}",
                        device.name().unwrap_or("unnamed"),
                        e
                    );
                    false
                }
            }
        })?;
        Ok((grabbed, deferred))
    }

    fn dispatch(&mut self, code: u16, value: i32) {
        let is_press = match value {
            KEY_PRESS | KEY_REPEAT => true,
            KEY_RELEASE => false,
            _ => return,
        };
        let key = evdev_keycode_to_key(code);
        if !self.interceptor.classify(key.id(), is_press).is_suppress() {
            self.passthrough.key(code, value);
        }
    }

    fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::SeqCst) {
            if self.nodes.rescan_due() {
                if let Err(e) = self.rescan() {
                    log::warn!("Keyboard rescan failed: {}", e);
                }
            }

            let ready = match self.nodes.poll(POLL_INTERVAL) {
                Ok(ready) => ready,
                Err(e) => {
                    log::error!("poll() failed: {}", e);
                    break;
                }
            };

            let mut gone = Vec::new();
            for index in ready {
                let Some(device) = self.nodes.device_mut(index) else {
                    continue;
                };
                let keys: Vec<(u16, i32)> = match device.fetch_events() {
                    Ok(events) => events
                        .filter_map(|ev| match ev.kind() {
                            InputEventKind::Key(key) => Some((key.code(), ev.value())),
                            _ => None,
                        })
                        .collect(),
                    Err(e) => {
                        log::debug!("Keyboard read failed: {}", e);
                        gone.push(index);
                        continue;
                    }
                };
                for (code, value) in keys {
                    self.dispatch(code, value);
                }
            }
            if !gone.is_empty() {
                self.nodes.remove(gone);
            }
        }

        for mut device in self.nodes.drain() {
            let _ = device.ungrab();
        }
    }
}

/// Grab keyboards on a service thread.
///
/// Fails with [`Error::HookUnavailable`] if the passthrough cannot be
/// created or no keyboard is reachable.
pub(super) fn spawn_keyboard_grab(interceptor: Arc<KeyInterceptor>) -> Result<ServiceThread> {
    let (ready_tx, ready) = mpsc::channel();

    let service = ServiceThread::spawn("keyboard-grab", move |running| {
        let passthrough = match KeyPassthrough::create() {
            Ok(passthrough) => passthrough,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        let mut grab = KeyboardGrab {
            interceptor,
            passthrough,
            nodes: NodeSet::new(),
        };
        match grab.rescan() {
            Ok((0, 0)) => {
                let _ = ready_tx.send(Err(Error::HookUnavailable(
                    "Could not grab any keyboard. Make sure you're in the 'input' group.".into(),
                )));
                return;
            }
            Ok((grabbed, deferred)) => {
                log::info!("Grabbed {} keyboard(s), {} deferred", grabbed, deferred);
                let _ = ready_tx.send(Ok(()));
            }
            Err(e) => {
                let _ = ready_tx.send(Err(Error::HookUnavailable(e.to_string())));
                return;
            }
        }

        grab.run(&running);
        log::debug!("Keyboards released");
    })?;

    await_startup(service, ready, "keyboard grab")
}

/// Reads pointer nodes and reports which device moved.
struct PointerReader {
    sink: ActivitySink,
    /// Report every pointer anonymously.
    anonymous: bool,
    nodes: NodeSet,
}

impl PointerReader {
    fn rescan(&mut self) -> Result<usize> {
        self.nodes.rescan(|device| is_pointer(device))
    }

    fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::SeqCst) {
            if self.nodes.rescan_due() {
                match self.rescan() {
                    Ok(0) => {}
                    Ok(added) => log::debug!("{} new pointing device(s)", added),
                    Err(e) => log::warn!("Pointer rescan failed: {}", e),
                }
            }

            let ready = match self.nodes.poll(POLL_INTERVAL) {
                Ok(ready) => ready,
                Err(e) => {
                    log::error!("poll() failed: {}", e);
                    break;
                }
            };

            let mut gone = Vec::new();
            for index in ready {
                let Some(device) = self.nodes.device_mut(index) else {
                    continue;
                };
                let active = match device.fetch_events() {
                    Ok(events) => events.fold(false, |active, ev| {
                        active
                            || match ev.kind() {
                                InputEventKind::RelAxis(_) => ev.value() != 0,
                                InputEventKind::Key(key) => {
                                    (BTN_MOUSE_FIRST..=BTN_MOUSE_LAST).contains(&key.code())
                                        && ev.value() != KEY_REPEAT
                                }
                                _ => false,
                            }
                    }),
                    Err(e) => {
                        log::debug!("Pointer read failed: {}", e);
                        gone.push(index);
                        continue;
                    }
                };
                // One report per batch keeps the layer alive.
                if active {
                    report(&self.sink, self.anonymous, device);
                }
            }
            if !gone.is_empty() {
                self.nodes.remove(gone);
            }
        }

        self.nodes.drain();
    }
}

fn report(sink: &ActivitySink, anonymous: bool, device: &Device) {
    if anonymous {
        sink.anonymous_activity();
        return;
    }
    let input_id = device.input_id();
    let id = DeviceId::new(input_id.vendor(), input_id.product());
    let name = device
        .name()
        .map(str::to_owned)
        .unwrap_or_else(|| format!("Pointing device {}", id));
    sink.device_activity(id, &name);
}

/// Read pointer nodes on a service thread.
///
/// With `anonymous` set every report skips the device registry. Fails with
/// [`Error::DeviceEnumeration`] if `/dev/input` cannot be read.
pub(super) fn spawn_pointer_reader(sink: ActivitySink, anonymous: bool) -> Result<ServiceThread> {
    let (ready_tx, ready) = mpsc::channel();

    let service = ServiceThread::spawn("pointer-reader", move |running| {
        let mut reader = PointerReader {
            sink,
            anonymous,
            nodes: NodeSet::new(),
        };
        match reader.rescan() {
            Ok(count) => {
                log::info!("Reading {} pointing device(s)", count);
                let _ = ready_tx.send(Ok(()));
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        }

        reader.run(&running);
        log::debug!("Pointer reader stopped");
    })?;

    await_startup(service, ready, "pointer reader")
}
