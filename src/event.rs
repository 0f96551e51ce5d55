//! Event types shared between the pipeline, the activity sources and the worker.

use crate::device::DeviceIdentity;
use std::fmt;
use std::sync::Arc;

/// Scroll notches emitted per scroll action.
pub const SCROLL_NOTCHES: i32 = 3;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    /// Left mouse button (Button 1).
    Left,
    /// Right mouse button (Button 2).
    Right,
    /// Middle mouse button (Button 3).
    Middle,
}

/// A mouse action a key can be mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseAction {
    LeftClick,
    RightClick,
    MiddleClick,
    ScrollUp,
    ScrollDown,
    ScrollLeft,
    ScrollRight,
}

impl MouseAction {
    /// All actions, in configuration order.
    pub const ALL: [MouseAction; 7] = [
        MouseAction::LeftClick,
        MouseAction::RightClick,
        MouseAction::MiddleClick,
        MouseAction::ScrollUp,
        MouseAction::ScrollDown,
        MouseAction::ScrollLeft,
        MouseAction::ScrollRight,
    ];

    /// Parse a configuration action name such as `mouse_left_click`.
    ///
    /// Matching is case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|action| action.name().eq_ignore_ascii_case(name))
    }

    /// The configuration name of this action.
    pub fn name(&self) -> &'static str {
        match self {
            MouseAction::LeftClick => "mouse_left_click",
            MouseAction::RightClick => "mouse_right_click",
            MouseAction::MiddleClick => "mouse_middle_click",
            MouseAction::ScrollUp => "mouse_scroll_up",
            MouseAction::ScrollDown => "mouse_scroll_down",
            MouseAction::ScrollLeft => "mouse_scroll_left",
            MouseAction::ScrollRight => "mouse_scroll_right",
        }
    }

    /// The button this action holds down, if it is a click action.
    pub fn button(&self) -> Option<Button> {
        match self {
            MouseAction::LeftClick => Some(Button::Left),
            MouseAction::RightClick => Some(Button::Right),
            MouseAction::MiddleClick => Some(Button::Middle),
            _ => None,
        }
    }

    /// The `(dx, dy)` scroll delta of this action, if it is a scroll action.
    ///
    /// Positive `dy` scrolls up (away from the user), positive `dx` scrolls right.
    pub fn scroll_delta(&self) -> Option<(i32, i32)> {
        match self {
            MouseAction::ScrollUp => Some((0, SCROLL_NOTCHES)),
            MouseAction::ScrollDown => Some((0, -SCROLL_NOTCHES)),
            MouseAction::ScrollLeft => Some((-SCROLL_NOTCHES, 0)),
            MouseAction::ScrollRight => Some((SCROLL_NOTCHES, 0)),
            _ => None,
        }
    }
}

impl fmt::Display for MouseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the hook should do with a physical key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Let the key reach its normal destination.
    PassThrough,
    /// Swallow the key.
    Suppress,
}

impl Decision {
    /// Check if the key should be swallowed.
    pub fn is_suppress(&self) -> bool {
        matches!(self, Decision::Suppress)
    }
}

/// A unit of work for the action worker.
#[derive(Debug, Clone, PartialEq)]
pub enum QueuedAction {
    /// A mapped key went down.
    Press { key: Arc<str>, action: MouseAction },
    /// A mapped key that was suppressed on press came back up.
    Release { key: Arc<str>, action: MouseAction },
    /// A pointing device moved, clicked or scrolled.
    MouseActivity { device: Option<DeviceIdentity> },
    /// An unmapped key was pressed while the layer was active.
    Unmapped { key: Arc<str> },
}

impl QueuedAction {
    /// Short label used in log records.
    pub fn kind(&self) -> &'static str {
        match self {
            QueuedAction::Press { .. } => "press",
            QueuedAction::Release { .. } => "release",
            QueuedAction::MouseActivity { .. } => "mouse_activity",
            QueuedAction::Unmapped { .. } => "unmapped",
        }
    }
}
