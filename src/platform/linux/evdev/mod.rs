//! Linux evdev backend.
//!
//! Reads `/dev/input/event*` directly, so it works on X11, Wayland and the
//! console alike. Keyboards are grabbed and re-emitted through uinput,
//! pointer nodes carry their USB vendor/product ids in `input_id()`, and
//! mouse actions go out through a virtual uinput pointer. With the `x11`
//! feature, the generic activity source is an XRecord listener, which
//! works without access to `/dev/input`.
//!
//! ## Permissions
//!
//! The process needs read access to `/dev/input/event*` and write access
//! to `/dev/uinput`:
//! ```bash
//! sudo usermod -aG input $USER
//! # Then log out and back in
//! ```

mod listen;
mod nodes;
mod simulate;

use crate::activity::ActivitySink;
use crate::engine::Backend;
use crate::error::{Error, Result};
use crate::pipeline::KeyInterceptor;
use crate::service::{STOP_TIMEOUT, ServiceThread};
use crate::worker::PointerActuator;
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

pub use simulate::UinputActuator;

/// How long a reader thread may take to report its first scan.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Wait for a freshly spawned reader to report whether it opened its nodes.
pub(in crate::platform::linux) fn await_startup(
    mut service: ServiceThread,
    ready: Receiver<Result<()>>,
    what: &str,
) -> Result<ServiceThread> {
    match ready.recv_timeout(STARTUP_TIMEOUT) {
        Ok(Ok(())) => Ok(service),
        Ok(Err(e)) => {
            service.stop(STOP_TIMEOUT);
            Err(e)
        }
        Err(_) => {
            service.stop(STOP_TIMEOUT);
            Err(Error::ThreadError(format!("{} did not start", what)))
        }
    }
}

/// The native pointer actuator.
pub fn native_actuator() -> Result<Arc<dyn PointerActuator>> {
    Ok(Arc::new(UinputActuator::new()))
}

/// Keyboard grab and pointer readers over `/dev/input`.
#[derive(Default)]
pub struct NativeBackend {
    key_grab: Option<ServiceThread>,
    activity: Option<ServiceThread>,
}

impl NativeBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for NativeBackend {
    fn install_key_hook(&mut self, interceptor: Arc<KeyInterceptor>) -> Result<()> {
        self.remove_key_hook();
        self.key_grab = Some(listen::spawn_keyboard_grab(interceptor)?);
        Ok(())
    }

    fn remove_key_hook(&mut self) {
        if let Some(mut service) = self.key_grab.take() {
            service.stop(STOP_TIMEOUT);
        }
    }

    fn start_raw_activity(&mut self, sink: ActivitySink) -> Result<()> {
        self.stop_activity();
        self.activity = Some(listen::spawn_pointer_reader(sink, false)?);
        Ok(())
    }

    fn start_generic_activity(&mut self, sink: ActivitySink) -> Result<()> {
        self.stop_activity();

        #[cfg(feature = "x11")]
        match super::x11::spawn_pointer_listener(sink.clone()) {
            Ok(service) => {
                self.activity = Some(service);
                return Ok(());
            }
            Err(e) => log::warn!("XRecord pointer listener unavailable: {}", e),
        }

        self.activity = Some(listen::spawn_pointer_reader(sink, true)?);
        Ok(())
    }

    fn stop_activity(&mut self) {
        if let Some(mut service) = self.activity.take() {
            service.stop(STOP_TIMEOUT);
        }
    }
}

impl Drop for NativeBackend {
    fn drop(&mut self) {
        self.stop_activity();
        self.remove_key_hook();
    }
}
