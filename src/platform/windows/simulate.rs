//! Mouse actuation using SendInput.

use crate::error::{Error, Result};
use crate::event::Button;
use crate::worker::PointerActuator;
use std::mem::size_of;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    INPUT, INPUT_0, INPUT_MOUSE, MOUSE_EVENT_FLAGS, MOUSEEVENTF_HWHEEL, MOUSEEVENTF_LEFTDOWN,
    MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP, MOUSEEVENTF_RIGHTDOWN,
    MOUSEEVENTF_RIGHTUP, MOUSEEVENTF_WHEEL, MOUSEINPUT, SendInput,
};

const WHEEL_DELTA: i32 = 120;

/// Send a mouse event
fn sim_mouse_event(flags: MOUSE_EVENT_FLAGS, data: i32) -> Result<()> {
    let input = INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx: 0,
                dy: 0,
                mouseData: data as u32,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    };

    let inputs = [input];
    let result = unsafe { SendInput(&inputs, size_of::<INPUT>() as i32) };

    if result != 1 {
        Err(Error::Actuation("SendInput failed for mouse event".into()))
    } else {
        Ok(())
    }
}

/// Synthesizes clicks and wheel notches with `SendInput`.
///
/// The events carry the injected flag, so the hooks ignore them.
#[derive(Debug, Default)]
pub struct SendInputActuator;

impl SendInputActuator {
    pub fn new() -> Self {
        Self
    }
}

impl PointerActuator for SendInputActuator {
    fn press(&self, button: Button) -> Result<()> {
        match button {
            Button::Left => sim_mouse_event(MOUSEEVENTF_LEFTDOWN, 0),
            Button::Right => sim_mouse_event(MOUSEEVENTF_RIGHTDOWN, 0),
            Button::Middle => sim_mouse_event(MOUSEEVENTF_MIDDLEDOWN, 0),
        }
    }

    fn release(&self, button: Button) -> Result<()> {
        match button {
            Button::Left => sim_mouse_event(MOUSEEVENTF_LEFTUP, 0),
            Button::Right => sim_mouse_event(MOUSEEVENTF_RIGHTUP, 0),
            Button::Middle => sim_mouse_event(MOUSEEVENTF_MIDDLEUP, 0),
        }
    }

    fn scroll(&self, dx: i32, dy: i32) -> Result<()> {
        if dy != 0 {
            sim_mouse_event(MOUSEEVENTF_WHEEL, dy.wrapping_mul(WHEEL_DELTA))?;
        }
        if dx != 0 {
            sim_mouse_event(MOUSEEVENTF_HWHEEL, dx.wrapping_mul(WHEEL_DELTA))?;
        }
        Ok(())
    }
}
