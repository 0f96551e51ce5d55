//! Linux platform implementation.
//!
//! The `evdev` feature (default) enables the `/dev/input` backend; `x11`
//! (default) adds an XRecord pointer listener as its generic fallback.
//! Without `evdev` the engine can still be driven through a custom
//! [`Backend`](crate::engine::Backend), but the native one refuses to start.

#[cfg(feature = "evdev")]
mod keycodes;

#[cfg(feature = "evdev")]
mod evdev;

#[cfg(all(feature = "evdev", feature = "x11"))]
mod x11;

#[cfg(feature = "evdev")]
pub use evdev::*;

#[cfg(not(feature = "evdev"))]
pub use super::unsupported::*;
