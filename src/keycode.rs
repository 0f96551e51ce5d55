//! Platform-neutral key codes and their canonical string ids.
//!
//! Hooks translate native key codes into [`Key`] and hand the pipeline the
//! key's canonical id (`"f"`, `"semicolon"`, `"shift_left"`, ...). Mapping
//! tables are keyed by the same ids, so a configuration written on one
//! platform classifies identically on another.

/// Keyboard keys the hooks can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    // Letters
    KeyA,
    KeyB,
    KeyC,
    KeyD,
    KeyE,
    KeyF,
    KeyG,
    KeyH,
    KeyI,
    KeyJ,
    KeyK,
    KeyL,
    KeyM,
    KeyN,
    KeyO,
    KeyP,
    KeyQ,
    KeyR,
    KeyS,
    KeyT,
    KeyU,
    KeyV,
    KeyW,
    KeyX,
    KeyY,
    KeyZ,

    // Numbers (top row)
    Num0,
    Num1,
    Num2,
    Num3,
    Num4,
    Num5,
    Num6,
    Num7,
    Num8,
    Num9,

    // Function keys
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,

    // Modifiers
    ShiftLeft,
    ShiftRight,
    ControlLeft,
    ControlRight,
    AltLeft,
    AltRight,
    MetaLeft, // Windows/Command/Super
    MetaRight,

    // Editing and navigation
    Escape,
    Tab,
    CapsLock,
    Space,
    Enter,
    Backspace,
    Insert,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,

    // Punctuation
    Grave,
    Minus,
    Equal,
    BracketLeft,
    BracketRight,
    Backslash,
    Semicolon,
    Quote,
    Comma,
    Period,
    Slash,

    /// A key without a canonical id, carrying the native code.
    Unknown(u32),
}

impl Default for Key {
    fn default() -> Self {
        Key::Unknown(0)
    }
}

/// Canonical ids, one per named key.
const KEY_IDS: &[(Key, &str)] = &[
    (Key::KeyA, "a"),
    (Key::KeyB, "b"),
    (Key::KeyC, "c"),
    (Key::KeyD, "d"),
    (Key::KeyE, "e"),
    (Key::KeyF, "f"),
    (Key::KeyG, "g"),
    (Key::KeyH, "h"),
    (Key::KeyI, "i"),
    (Key::KeyJ, "j"),
    (Key::KeyK, "k"),
    (Key::KeyL, "l"),
    (Key::KeyM, "m"),
    (Key::KeyN, "n"),
    (Key::KeyO, "o"),
    (Key::KeyP, "p"),
    (Key::KeyQ, "q"),
    (Key::KeyR, "r"),
    (Key::KeyS, "s"),
    (Key::KeyT, "t"),
    (Key::KeyU, "u"),
    (Key::KeyV, "v"),
    (Key::KeyW, "w"),
    (Key::KeyX, "x"),
    (Key::KeyY, "y"),
    (Key::KeyZ, "z"),
    (Key::Num0, "0"),
    (Key::Num1, "1"),
    (Key::Num2, "2"),
    (Key::Num3, "3"),
    (Key::Num4, "4"),
    (Key::Num5, "5"),
    (Key::Num6, "6"),
    (Key::Num7, "7"),
    (Key::Num8, "8"),
    (Key::Num9, "9"),
    (Key::F1, "f1"),
    (Key::F2, "f2"),
    (Key::F3, "f3"),
    (Key::F4, "f4"),
    (Key::F5, "f5"),
    (Key::F6, "f6"),
    (Key::F7, "f7"),
    (Key::F8, "f8"),
    (Key::F9, "f9"),
    (Key::F10, "f10"),
    (Key::F11, "f11"),
    (Key::F12, "f12"),
    (Key::ShiftLeft, "shift_left"),
    (Key::ShiftRight, "shift_right"),
    (Key::ControlLeft, "ctrl_left"),
    (Key::ControlRight, "ctrl_right"),
    (Key::AltLeft, "alt_left"),
    (Key::AltRight, "alt_right"),
    (Key::MetaLeft, "meta_left"),
    (Key::MetaRight, "meta_right"),
    (Key::Escape, "escape"),
    (Key::Tab, "tab"),
    (Key::CapsLock, "caps_lock"),
    (Key::Space, "space"),
    (Key::Enter, "enter"),
    (Key::Backspace, "backspace"),
    (Key::Insert, "insert"),
    (Key::Delete, "delete"),
    (Key::Home, "home"),
    (Key::End, "end"),
    (Key::PageUp, "page_up"),
    (Key::PageDown, "page_down"),
    (Key::ArrowUp, "up"),
    (Key::ArrowDown, "down"),
    (Key::ArrowLeft, "left"),
    (Key::ArrowRight, "right"),
    (Key::Grave, "grave"),
    (Key::Minus, "minus"),
    (Key::Equal, "equal"),
    (Key::BracketLeft, "bracket_left"),
    (Key::BracketRight, "bracket_right"),
    (Key::Backslash, "backslash"),
    (Key::Semicolon, "semicolon"),
    (Key::Quote, "quote"),
    (Key::Comma, "comma"),
    (Key::Period, "period"),
    (Key::Slash, "slash"),
];

/// Alternative spellings accepted in configuration files.
const KEY_ALIASES: &[(&str, Key)] = &[
    ("shift", Key::ShiftLeft),
    ("left shift", Key::ShiftLeft),
    ("right shift", Key::ShiftRight),
    ("ctrl", Key::ControlLeft),
    ("control", Key::ControlLeft),
    ("alt", Key::AltLeft),
    ("option", Key::AltLeft),
    ("meta", Key::MetaLeft),
    ("win", Key::MetaLeft),
    ("windows", Key::MetaLeft),
    ("cmd", Key::MetaLeft),
    ("super", Key::MetaLeft),
    ("esc", Key::Escape),
    ("return", Key::Enter),
    ("`", Key::Grave),
    ("-", Key::Minus),
    ("=", Key::Equal),
    ("[", Key::BracketLeft),
    ("]", Key::BracketRight),
    ("\\", Key::Backslash),
    (";", Key::Semicolon),
    ("'", Key::Quote),
    (",", Key::Comma),
    (".", Key::Period),
    ("/", Key::Slash),
];

impl Key {
    /// The canonical id of this key.
    ///
    /// Keys without a name map to `"unknown"`.
    pub fn id(&self) -> &'static str {
        KEY_IDS
            .iter()
            .find(|(key, _)| key == self)
            .map(|(_, id)| *id)
            .unwrap_or("unknown")
    }

    /// Look a key up by canonical id or accepted alias.
    ///
    /// Lookup is exact; callers normalize case first.
    pub fn from_id(id: &str) -> Option<Key> {
        KEY_IDS
            .iter()
            .find(|(_, name)| *name == id)
            .map(|(key, _)| *key)
            .or_else(|| {
                KEY_ALIASES
                    .iter()
                    .find(|(name, _)| *name == id)
                    .map(|(_, key)| *key)
            })
    }

    /// Check if this is a modifier key.
    pub fn is_modifier(&self) -> bool {
        matches!(
            self,
            Key::ShiftLeft
                | Key::ShiftRight
                | Key::ControlLeft
                | Key::ControlRight
                | Key::AltLeft
                | Key::AltRight
                | Key::MetaLeft
                | Key::MetaRight
        )
    }
}

/// Check if a (lower-case) key id names a modifier.
pub fn is_modifier_id(id: &str) -> bool {
    Key::from_id(id).is_some_and(|key| key.is_modifier())
}

/// Normalize a configured key name into the id the hooks report.
///
/// Aliases resolve to their canonical id; names that match no known key are
/// kept lower-cased so platform adapters with wider key sets still match.
pub fn canonical_key_id(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    match Key::from_id(&lowered) {
        Some(key) => key.id().to_string(),
        None => lowered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_resolve() {
        for (key, id) in KEY_IDS {
            assert_eq!(Key::from_id(id), Some(*key));
            assert_eq!(key.id(), *id);
        }
    }

    #[test]
    fn test_modifier_ids() {
        assert!(is_modifier_id("shift_left"));
        assert!(is_modifier_id("shift"));
        assert!(is_modifier_id("ctrl_right"));
        assert!(!is_modifier_id("caps_lock"));
        assert!(!is_modifier_id("f"));
        assert!(!is_modifier_id("not-a-key"));
    }

    #[test]
    fn test_canonical_key_id() {
        assert_eq!(canonical_key_id(" F "), "f");
        assert_eq!(canonical_key_id(";"), "semicolon");
        assert_eq!(canonical_key_id("Shift"), "shift_left");
        assert_eq!(canonical_key_id("Numpad7"), "numpad7");
        assert_eq!(Key::Unknown(0x99).id(), "unknown");
    }
}
