//! Windows backend.
//!
//! Keys are intercepted with a `WH_KEYBOARD_LL` hook, pointer activity comes
//! from the Raw Input API (falling back to a `WH_MOUSE_LL` hook) and mouse
//! actions are synthesized with `SendInput`. Each hook lives on its own
//! thread, since low-level hooks are serviced by the installing thread's
//! message loop.

mod keycodes;
mod listen;
mod rawinput;
mod simulate;

use crate::activity::ActivitySink;
use crate::engine::Backend;
use crate::error::{Error, Result};
use crate::pipeline::KeyInterceptor;
use crate::service::{POLL_INTERVAL, STOP_TIMEOUT, ServiceThread};
use crate::worker::PointerActuator;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::time::Duration;
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, MSG, MsgWaitForMultipleObjects, PM_REMOVE, PeekMessageW, QS_ALLINPUT,
    TranslateMessage,
};

pub use simulate::SendInputActuator;

/// How long a hook thread may take to report its installation result.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Dispatch this thread's messages until `running` goes false.
fn pump_messages(running: &AtomicBool) {
    let mut msg = MSG::default();
    let wait_ms = POLL_INTERVAL.as_millis() as u32;

    while running.load(Ordering::SeqCst) {
        unsafe {
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
            // Wakes on input or after the poll interval, whichever is first.
            MsgWaitForMultipleObjects(None, false, wait_ms, QS_ALLINPUT);
        }
    }
}

/// Wait for a freshly spawned hook thread to report whether it installed.
fn await_startup(
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
    Ok(Arc::new(SendInputActuator::new()))
}

/// Hooks and raw input for the current desktop session.
#[derive(Default)]
pub struct NativeBackend {
    key_hook: Option<ServiceThread>,
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
        listen::set_interceptor(Some(interceptor));
        match listen::spawn_keyboard_hook() {
            Ok(service) => {
                self.key_hook = Some(service);
                Ok(())
            }
            Err(e) => {
                listen::set_interceptor(None);
                Err(e)
            }
        }
    }

    fn remove_key_hook(&mut self) {
        if let Some(mut service) = self.key_hook.take() {
            service.stop(STOP_TIMEOUT);
        }
        listen::set_interceptor(None);
    }

    fn start_raw_activity(&mut self, sink: ActivitySink) -> Result<()> {
        self.stop_activity();
        self.activity = Some(rawinput::spawn(sink)?);
        Ok(())
    }

    fn start_generic_activity(&mut self, sink: ActivitySink) -> Result<()> {
        self.stop_activity();
        listen::set_mouse_sink(Some(sink));
        match listen::spawn_mouse_hook() {
            Ok(service) => {
                self.activity = Some(service);
                Ok(())
            }
            Err(e) => {
                listen::set_mouse_sink(None);
                Err(e)
            }
        }
    }

    fn stop_activity(&mut self) {
        if let Some(mut service) = self.activity.take() {
            service.stop(STOP_TIMEOUT);
        }
        listen::set_mouse_sink(None);
    }
}

impl Drop for NativeBackend {
    fn drop(&mut self) {
        self.stop_activity();
        self.remove_key_hook();
    }
}
