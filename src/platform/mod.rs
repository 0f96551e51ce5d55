//! Platform-specific implementations.
//!
//! Each platform exports a `NativeBackend` implementing
//! [`Backend`](crate::engine::Backend) and a `native_actuator()`.

#[cfg(target_os = "windows")]
mod windows;
#[cfg(target_os = "windows")]
pub use windows::*;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::*;

#[cfg(not(any(target_os = "windows", all(target_os = "linux", feature = "evdev"))))]
mod unsupported;
#[cfg(not(any(target_os = "windows", target_os = "linux")))]
pub use unsupported::*;
