//! Low-level keyboard and mouse hooks using SetWindowsHookEx.

use crate::activity::ActivitySink;
use crate::error::{Error, Result};
use crate::pipeline::KeyInterceptor;
use crate::service::ServiceThread;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, HC_ACTION, HOOKPROC, KBDLLHOOKSTRUCT, LLKHF_INJECTED, LLMHF_INJECTED,
    MSLLHOOKSTRUCT, SetWindowsHookExW, UnhookWindowsHookEx, WH_KEYBOARD_LL, WH_MOUSE_LL,
    WINDOWS_HOOK_ID, WM_KEYDOWN, WM_KEYUP, WM_SYSKEYDOWN, WM_SYSKEYUP,
};

use super::keycodes::keycode_to_key;
use super::{await_startup, pump_messages};

/// Pipeline consulted by the keyboard hook.
static INTERCEPTOR: Mutex<Option<Arc<KeyInterceptor>>> = Mutex::new(None);

/// Sink fed by the mouse hook in generic mode.
static MOUSE_SINK: Mutex<Option<ActivitySink>> = Mutex::new(None);

pub(super) fn set_interceptor(interceptor: Option<Arc<KeyInterceptor>>) {
    if let Ok(mut slot) = INTERCEPTOR.lock() {
        *slot = interceptor;
    }
}

pub(super) fn set_mouse_sink(sink: Option<ActivitySink>) {
    if let Ok(mut slot) = MOUSE_SINK.lock() {
        *slot = sink;
    }
}

/// Keyboard hook callback
unsafe extern "system" fn keyboard_callback(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code == HC_ACTION as i32 {
        let kb = unsafe { *(lparam.0 as *const KBDLLHOOKSTRUCT) };
        // Our own SendInput output and other injectors are left alone.
        let injected = kb.flags.0 & LLKHF_INJECTED.0 != 0;

        let is_press = match wparam.0 as u32 {
            WM_KEYDOWN | WM_SYSKEYDOWN => Some(true),
            WM_KEYUP | WM_SYSKEYUP => Some(false),
            _ => None,
        };

        if let (false, Some(is_press)) = (injected, is_press) {
            let interceptor = INTERCEPTOR.lock().ok().and_then(|slot| slot.clone());
            if let Some(interceptor) = interceptor {
                let key = keycode_to_key(kb.vkCode as u16);
                if interceptor.classify(key.id(), is_press).is_suppress() {
                    return LRESULT(1);
                }
            }
        }
    }

    unsafe { CallNextHookEx(None, code, wparam, lparam) }
}

/// Mouse hook callback
unsafe extern "system" fn mouse_callback(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code == HC_ACTION as i32 {
        let mouse = unsafe { *(lparam.0 as *const MSLLHOOKSTRUCT) };
        if mouse.flags & LLMHF_INJECTED == 0 {
            let _ = catch_unwind(AssertUnwindSafe(|| {
                if let Ok(slot) = MOUSE_SINK.lock() {
                    if let Some(sink) = slot.as_ref() {
                        sink.anonymous_activity();
                    }
                }
            }));
        }
    }

    unsafe { CallNextHookEx(None, code, wparam, lparam) }
}

fn spawn_hook(name: &'static str, id: WINDOWS_HOOK_ID, callback: HOOKPROC) -> Result<ServiceThread> {
    let (ready_tx, ready) = mpsc::channel();

    let service = ServiceThread::spawn(name, move |running| {
        let hook = match unsafe { SetWindowsHookExW(id, callback, None, 0) } {
            Ok(hook) => hook,
            Err(e) => {
                let _ = ready_tx.send(Err(Error::HookUnavailable(format!(
                    "failed to set {}: {}",
                    name, e
                ))));
                return;
            }
        };
        let _ = ready_tx.send(Ok(()));
        log::debug!("{} installed", name);

        pump_messages(&running);

        unsafe {
            let _ = UnhookWindowsHookEx(hook);
        }
        log::debug!("{} removed", name);
    })?;

    await_startup(service, ready, name)
}

/// Install the keyboard hook on its own thread.
pub(super) fn spawn_keyboard_hook() -> Result<ServiceThread> {
    spawn_hook("keyboard-hook", WH_KEYBOARD_LL, Some(keyboard_callback))
}

/// Install the mouse hook on its own thread.
pub(super) fn spawn_mouse_hook() -> Result<ServiceThread> {
    spawn_hook("mouse-hook", WH_MOUSE_LL, Some(mouse_callback))
}
