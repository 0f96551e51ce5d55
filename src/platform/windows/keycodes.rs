//! Windows virtual-key code mapping.

use crate::keycode::Key;

/// Convert a Windows virtual-key code to a Key.
pub fn keycode_to_key(vk: u16) -> Key {
    match vk {
        // Letters
        0x41 => Key::KeyA,
        0x42 => Key::KeyB,
        0x43 => Key::KeyC,
        0x44 => Key::KeyD,
        0x45 => Key::KeyE,
        0x46 => Key::KeyF,
        0x47 => Key::KeyG,
        0x48 => Key::KeyH,
        0x49 => Key::KeyI,
        0x4A => Key::KeyJ,
        0x4B => Key::KeyK,
        0x4C => Key::KeyL,
        0x4D => Key::KeyM,
        0x4E => Key::KeyN,
        0x4F => Key::KeyO,
        0x50 => Key::KeyP,
        0x51 => Key::KeyQ,
        0x52 => Key::KeyR,
        0x53 => Key::KeyS,
        0x54 => Key::KeyT,
        0x55 => Key::KeyU,
        0x56 => Key::KeyV,
        0x57 => Key::KeyW,
        0x58 => Key::KeyX,
        0x59 => Key::KeyY,
        0x5A => Key::KeyZ,

        // Numbers
        0x30 => Key::Num0,
        0x31 => Key::Num1,
        0x32 => Key::Num2,
        0x33 => Key::Num3,
        0x34 => Key::Num4,
        0x35 => Key::Num5,
        0x36 => Key::Num6,
        0x37 => Key::Num7,
        0x38 => Key::Num8,
        0x39 => Key::Num9,

        // Function keys
        0x70 => Key::F1,
        0x71 => Key::F2,
        0x72 => Key::F3,
        0x73 => Key::F4,
        0x74 => Key::F5,
        0x75 => Key::F6,
        0x76 => Key::F7,
        0x77 => Key::F8,
        0x78 => Key::F9,
        0x79 => Key::F10,
        0x7A => Key::F11,
        0x7B => Key::F12,

        // Modifiers. Low-level hooks report the sided codes; the generic
        // VK_SHIFT/VK_CONTROL/VK_MENU only show up from injected input.
        0xA0 | 0x10 => Key::ShiftLeft,
        0xA1 => Key::ShiftRight,
        0xA2 | 0x11 => Key::ControlLeft,
        0xA3 => Key::ControlRight,
        0xA4 | 0x12 => Key::AltLeft,
        0xA5 => Key::AltRight,
        0x5B => Key::MetaLeft,
        0x5C => Key::MetaRight,

        // Editing and navigation
        0x1B => Key::Escape,
        0x09 => Key::Tab,
        0x14 => Key::CapsLock,
        0x20 => Key::Space,
        0x0D => Key::Enter,
        0x08 => Key::Backspace,
        0x2D => Key::Insert,
        0x2E => Key::Delete,
        0x24 => Key::Home,
        0x23 => Key::End,
        0x21 => Key::PageUp,
        0x22 => Key::PageDown,
        0x26 => Key::ArrowUp,
        0x28 => Key::ArrowDown,
        0x25 => Key::ArrowLeft,
        0x27 => Key::ArrowRight,

        // OEM punctuation (US layout)
        0xC0 => Key::Grave,
        0xBD => Key::Minus,
        0xBB => Key::Equal,
        0xDB => Key::BracketLeft,
        0xDD => Key::BracketRight,
        0xDC => Key::Backslash,
        0xBA => Key::Semicolon,
        0xDE => Key::Quote,
        0xBC => Key::Comma,
        0xBE => Key::Period,
        0xBF => Key::Slash,

        _ => Key::Unknown(vk as u32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_home_row() {
        assert_eq!(keycode_to_key(0x4A).id(), "j");
        assert_eq!(keycode_to_key(0xBA).id(), "semicolon");
        assert_eq!(keycode_to_key(0xA1), Key::ShiftRight);
        assert_eq!(keycode_to_key(0xFF), Key::Unknown(0xFF));
    }
}
