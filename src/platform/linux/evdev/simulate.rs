//! Virtual uinput devices.
//!
//! One device carries synthesized clicks and wheel notches, another
//! re-emits keyboard events the interceptor lets through while the
//! physical keyboards are grabbed.

use crate::error::{Error, Result};
use crate::event::Button;
use crate::worker::PointerActuator;
use evdev::{
    AttributeSet, EventType as EvdevEventType, InputEvent, Key as EvdevKey, RelativeAxisType,
    uinput::{VirtualDevice, VirtualDeviceBuilder},
};
use std::sync::Mutex;

use super::nodes::VIRTUAL_DEVICE_PREFIX;

/// Highest key code the kernel defines (`KEY_MAX`).
const KEY_MAX: u16 = 0x2ff;

/// `BTN_MISC..=BTN_GEAR_UP` and the `BTN_TRIGGER_HAPPY*` block. Advertising
/// these would make the passthrough look like a mouse or joystick.
const BUTTON_RANGES: [std::ops::RangeInclusive<u16>; 2] = [0x100..=0x15f, 0x2c0..=0x2e7];

/// Key codes a keyboard passthrough must accept.
fn passthrough_key_codes() -> impl Iterator<Item = u16> {
    (1..=KEY_MAX).filter(|code| !BUTTON_RANGES.iter().any(|range| range.contains(code)))
}

fn syn() -> InputEvent {
    InputEvent::new(EvdevEventType::SYNCHRONIZATION, 0, 0)
}

fn evdev_button(button: Button) -> EvdevKey {
    match button {
        Button::Left => EvdevKey::BTN_LEFT,
        Button::Right => EvdevKey::BTN_RIGHT,
        Button::Middle => EvdevKey::BTN_MIDDLE,
    }
}

/// Synthesizes clicks and wheel notches through a uinput pointer.
///
/// The device is created on first use, so constructing the actuator
/// never needs `/dev/uinput` access.
#[derive(Default)]
pub struct UinputActuator {
    device: Mutex<Option<VirtualDevice>>,
}

impl UinputActuator {
    pub fn new() -> Self {
        Self::default()
    }

    fn create_device() -> Result<VirtualDevice> {
        let mut keys = AttributeSet::<EvdevKey>::new();
        keys.insert(EvdevKey::BTN_LEFT);
        keys.insert(EvdevKey::BTN_RIGHT);
        keys.insert(EvdevKey::BTN_MIDDLE);

        // REL_X/REL_Y make desktops classify the device as a mouse.
        let mut rel_axes = AttributeSet::<RelativeAxisType>::new();
        rel_axes.insert(RelativeAxisType::REL_X);
        rel_axes.insert(RelativeAxisType::REL_Y);
        rel_axes.insert(RelativeAxisType::REL_WHEEL);
        rel_axes.insert(RelativeAxisType::REL_HWHEEL);

        let name = format!("{} virtual pointer", VIRTUAL_DEVICE_PREFIX);
        VirtualDeviceBuilder::new()
            .and_then(|builder| builder.name(&name).with_keys(&keys))
            .and_then(|builder| builder.with_relative_axes(&rel_axes))
            .and_then(|builder| builder.build())
            .map_err(|e| {
                Error::Actuation(format!(
                    "Failed to create virtual pointer: {}. Check access to /dev/uinput.",
                    e
                ))
            })
    }

    fn emit(&self, events: &[InputEvent]) -> Result<()> {
        let mut guard = self
            .device
            .lock()
            .map_err(|_| Error::ThreadError("mutex poisoned".into()))?;

        if guard.is_none() {
            *guard = Some(Self::create_device()?);
        }
        let device = guard
            .as_mut()
            .ok_or_else(|| Error::Actuation("Virtual pointer not initialized".into()))?;

        device
            .emit(events)
            .map_err(|e| Error::Actuation(format!("Failed to emit event: {}", e)))
    }

    fn button(&self, button: Button, value: i32) -> Result<()> {
        self.emit(&[
            InputEvent::new(EvdevEventType::KEY, evdev_button(button).code(), value),
            syn(),
        ])
    }
}

impl PointerActuator for UinputActuator {
    fn press(&self, button: Button) -> Result<()> {
        self.button(button, 1)
    }

    fn release(&self, button: Button) -> Result<()> {
        self.button(button, 0)
    }

    fn scroll(&self, dx: i32, dy: i32) -> Result<()> {
        let mut events = Vec::with_capacity(3);
        if dy != 0 {
            events.push(InputEvent::new(
                EvdevEventType::RELATIVE,
                RelativeAxisType::REL_WHEEL.0,
                dy,
            ));
        }
        if dx != 0 {
            events.push(InputEvent::new(
                EvdevEventType::RELATIVE,
                RelativeAxisType::REL_HWHEEL.0,
                dx,
            ));
        }
        if events.is_empty() {
            return Ok(());
        }
        events.push(syn());
        self.emit(&events)
    }
}

/// Re-emits keyboard events from grabbed keyboards.
pub(super) struct KeyPassthrough {
    device: VirtualDevice,
}

impl KeyPassthrough {
    pub fn create() -> Result<Self> {
        let mut keys = AttributeSet::<EvdevKey>::new();
        for code in passthrough_key_codes() {
            keys.insert(EvdevKey::new(code));
        }

        let name = format!("{} keyboard passthrough", VIRTUAL_DEVICE_PREFIX);
        let device = VirtualDeviceBuilder::new()
            .and_then(|builder| builder.name(&name).with_keys(&keys))
            .and_then(|builder| builder.build())
            .map_err(|e| {
                Error::HookUnavailable(format!(
                    "Failed to create keyboard passthrough: {}. Check access to /dev/uinput.",
                    e
                ))
            })?;

        Ok(Self { device })
    }

    /// Re-emit a key transition with a fresh timestamp.
    pub fn key(&mut self, code: u16, value: i32) {
        let events = [InputEvent::new(EvdevEventType::KEY, code, value), syn()];
        if let Err(e) = self.device.emit(&events) {
            log::warn!("Failed to re-emit key {}: {}", code, e);
        }
    }
}
