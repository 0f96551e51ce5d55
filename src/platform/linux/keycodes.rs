//! Linux evdev keycode to Key mappings.
//!
//! Codes are the raw `KEY_*` values from `linux/input-event-codes.h`.

use crate::keycode::Key;

/// Convert an evdev keycode to our Key enum.
pub fn evdev_keycode_to_key(code: u16) -> Key {
    match code {
        // Letters (QWERTY layout)
        30 => Key::KeyA,
        48 => Key::KeyB,
        46 => Key::KeyC,
        32 => Key::KeyD,
        18 => Key::KeyE,
        33 => Key::KeyF,
        34 => Key::KeyG,
        35 => Key::KeyH,
        23 => Key::KeyI,
        36 => Key::KeyJ,
        37 => Key::KeyK,
        38 => Key::KeyL,
        50 => Key::KeyM,
        49 => Key::KeyN,
        24 => Key::KeyO,
        25 => Key::KeyP,
        16 => Key::KeyQ,
        19 => Key::KeyR,
        31 => Key::KeyS,
        20 => Key::KeyT,
        22 => Key::KeyU,
        47 => Key::KeyV,
        17 => Key::KeyW,
        45 => Key::KeyX,
        21 => Key::KeyY,
        44 => Key::KeyZ,

        // Numbers
        11 => Key::Num0,
        2 => Key::Num1,
        3 => Key::Num2,
        4 => Key::Num3,
        5 => Key::Num4,
        6 => Key::Num5,
        7 => Key::Num6,
        8 => Key::Num7,
        9 => Key::Num8,
        10 => Key::Num9,

        // Function keys
        59 => Key::F1,
        60 => Key::F2,
        61 => Key::F3,
        62 => Key::F4,
        63 => Key::F5,
        64 => Key::F6,
        65 => Key::F7,
        66 => Key::F8,
        67 => Key::F9,
        68 => Key::F10,
        87 => Key::F11,
        88 => Key::F12,

        // Modifiers
        42 => Key::ShiftLeft,
        54 => Key::ShiftRight,
        29 => Key::ControlLeft,
        97 => Key::ControlRight,
        56 => Key::AltLeft,
        100 => Key::AltRight,
        125 => Key::MetaLeft,
        126 => Key::MetaRight,

        // Editing and navigation
        1 => Key::Escape,
        15 => Key::Tab,
        58 => Key::CapsLock,
        57 => Key::Space,
        28 => Key::Enter,
        14 => Key::Backspace,
        110 => Key::Insert,
        111 => Key::Delete,
        102 => Key::Home,
        107 => Key::End,
        104 => Key::PageUp,
        109 => Key::PageDown,
        103 => Key::ArrowUp,
        108 => Key::ArrowDown,
        105 => Key::ArrowLeft,
        106 => Key::ArrowRight,

        // Punctuation
        41 => Key::Grave,
        12 => Key::Minus,
        13 => Key::Equal,
        26 => Key::BracketLeft,
        27 => Key::BracketRight,
        43 => Key::Backslash,
        39 => Key::Semicolon,
        40 => Key::Quote,
        51 => Key::Comma,
        52 => Key::Period,
        53 => Key::Slash,

        _ => Key::Unknown(code as u32),
    }
}
