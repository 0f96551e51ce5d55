//! Per-device pointer activity through the Raw Input API.
//!
//! A message-only window registered as an input sink receives `WM_INPUT`
//! for every mouse, trackball and touchpad report, tagged with the
//! originating device handle. Handles are resolved to vendor/product ids
//! from the device interface path.

use crate::activity::{ActivitySink, HandleTable, RawMouseSample, Resolved};
use crate::device::DeviceId;
use crate::error::{Error, Result};
use crate::service::ServiceThread;
use std::cell::RefCell;
use std::ffi::c_void;
use std::mem::size_of;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc;
use windows::Win32::Foundation::{GetLastError, HANDLE, HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Input::{
    GetRawInputData, GetRawInputDeviceInfoW, GetRawInputDeviceList, HRAWINPUT, RAWINPUT,
    RAWINPUTDEVICE, RAWINPUTDEVICE_FLAGS, RAWINPUTDEVICELIST, RAWINPUTHEADER, RID_INPUT,
    RIDEV_DEVNOTIFY, RIDEV_INPUTSINK, RIDEV_REMOVE, RIDI_DEVICENAME, RIM_TYPEMOUSE,
    RegisterRawInputDevices,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, HWND_MESSAGE, RegisterClassW,
    UnregisterClassW, WINDOW_EX_STYLE, WINDOW_STYLE, WM_INPUT, WNDCLASSW,
};
use windows::core::{PCWSTR, w};

use super::{await_startup, pump_messages};

const WINDOW_CLASS: PCWSTR = w!("MouseLayerRawInput");

/// HID usage page for generic desktop controls.
const HID_USAGE_PAGE_GENERIC: u16 = 0x01;
/// HID usage ID for mice (covers trackballs and touchpads).
const HID_USAGE_MOUSE: u16 = 0x02;

const WM_INPUT_DEVICE_CHANGE: u32 = 0x00FE;
const ERROR_CLASS_ALREADY_EXISTS: u32 = 1410;

struct RawState {
    sink: ActivitySink,
    table: HandleTable<isize>,
}

impl RawState {
    fn handle_input(&mut self, lparam: LPARAM) {
        let Some((handle, sample)) = read_mouse_input(lparam) else {
            return;
        };
        // Injected input (including our own SendInput) has no device.
        if handle == 0 || !sample.is_activity() {
            return;
        }

        match self.table.resolve(handle, || {
            enumerate_mice().unwrap_or_else(|e| {
                log::warn!("{}", e);
                Vec::new()
            })
        }) {
            Resolved::Device(id, name) => {
                self.sink.device_activity(id, &name);
            }
            Resolved::Unknown => self.sink.anonymous_activity(),
        }
    }
}

thread_local! {
    /// State of the raw input thread; the window procedure runs on it.
    static RAW_STATE: RefCell<Option<RawState>> = const { RefCell::new(None) };
}

fn with_state(f: impl FnOnce(&mut RawState)) {
    let _ = catch_unwind(AssertUnwindSafe(|| {
        RAW_STATE.with(|state| {
            if let Ok(mut state) = state.try_borrow_mut() {
                if let Some(state) = state.as_mut() {
                    f(state);
                }
            }
        })
    }));
}

/// Window procedure for Raw Input messages
unsafe extern "system" fn window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_INPUT => with_state(|state| state.handle_input(lparam)),
        WM_INPUT_DEVICE_CHANGE => with_state(|state| {
            log::debug!("Pointing device arrived or left");
            state.table.invalidate();
        }),
        _ => {}
    }
    unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
}

/// Read one `WM_INPUT` report; `None` if it is not a mouse report.
fn read_mouse_input(lparam: LPARAM) -> Option<(isize, RawMouseSample)> {
    let mut raw = RAWINPUT::default();
    let mut size = size_of::<RAWINPUT>() as u32;

    let read = unsafe {
        GetRawInputData(
            HRAWINPUT(lparam.0 as _),
            RID_INPUT,
            Some(&mut raw as *mut RAWINPUT as *mut c_void),
            &mut size,
            size_of::<RAWINPUTHEADER>() as u32,
        )
    };
    if read == 0 || read == u32::MAX {
        return None;
    }
    if raw.header.dwType != RIM_TYPEMOUSE.0 {
        return None;
    }

    let mouse = unsafe { raw.data.mouse };
    let sample = RawMouseSample {
        dx: mouse.lLastX,
        dy: mouse.lLastY,
        button_flags: unsafe { mouse.Anonymous.Anonymous.usButtonFlags },
    };
    Some((raw.header.hDevice.0 as isize, sample))
}

/// Interface path of a raw input device.
fn device_path(handle: HANDLE) -> Option<String> {
    let mut size = 0u32;
    unsafe {
        if GetRawInputDeviceInfoW(Some(handle), RIDI_DEVICENAME, None, &mut size) != 0
            || size == 0
        {
            return None;
        }
        let mut buffer = vec![0u16; size as usize];
        if GetRawInputDeviceInfoW(
            Some(handle),
            RIDI_DEVICENAME,
            Some(buffer.as_mut_ptr() as *mut c_void),
            &mut size,
        ) == u32::MAX
        {
            return None;
        }
        let end = buffer.iter().position(|c| *c == 0).unwrap_or(buffer.len());
        Some(String::from_utf16_lossy(&buffer[..end]))
    }
}

/// List attached mice as `(handle, id, display name)`.
///
/// Devices whose path carries no VID/PID (PS/2, virtual devices) are left
/// out and surface as anonymous activity.
fn enumerate_mice() -> Result<Vec<(isize, DeviceId, String)>> {
    let entry_size = size_of::<RAWINPUTDEVICELIST>() as u32;
    let mut count = 0u32;

    unsafe {
        if GetRawInputDeviceList(None, &mut count, entry_size) == u32::MAX {
            return Err(Error::DeviceEnumeration(format!(
                "GetRawInputDeviceList failed: {:?}",
                GetLastError()
            )));
        }
        let mut list = vec![RAWINPUTDEVICELIST::default(); count as usize];
        let listed = GetRawInputDeviceList(Some(list.as_mut_ptr()), &mut count, entry_size);
        if listed == u32::MAX {
            return Err(Error::DeviceEnumeration(format!(
                "GetRawInputDeviceList failed: {:?}",
                GetLastError()
            )));
        }
        list.truncate(listed as usize);

        Ok(list
            .iter()
            .filter(|device| device.dwType == RIM_TYPEMOUSE)
            .filter_map(|device| {
                let path = device_path(device.hDevice)?;
                let id = DeviceId::from_device_path(&path)?;
                Some((device.hDevice.0 as isize, id, format!("Pointing device {}", id)))
            })
            .collect())
    }
}

fn registration(flags: RAWINPUTDEVICE_FLAGS, target: HWND) -> [RAWINPUTDEVICE; 1] {
    [RAWINPUTDEVICE {
        usUsagePage: HID_USAGE_PAGE_GENERIC,
        usUsage: HID_USAGE_MOUSE,
        dwFlags: flags,
        hwndTarget: target,
    }]
}

/// Create the sink window and register for mouse input.
fn open(sink: ActivitySink) -> Result<(HWND, HINSTANCE)> {
    unsafe {
        let module = GetModuleHandleW(None)
            .map_err(|e| Error::DeviceEnumeration(format!("GetModuleHandleW failed: {}", e)))?;
        let instance = HINSTANCE(module.0);

        let class = WNDCLASSW {
            lpfnWndProc: Some(window_proc),
            hInstance: instance,
            lpszClassName: WINDOW_CLASS,
            ..Default::default()
        };
        if RegisterClassW(&class) == 0 {
            let last_error = GetLastError();
            if last_error.0 != ERROR_CLASS_ALREADY_EXISTS {
                return Err(Error::DeviceEnumeration(format!(
                    "failed to register window class: {:?}",
                    last_error
                )));
            }
        }

        let hwnd = match CreateWindowExW(
            WINDOW_EX_STYLE(0),
            WINDOW_CLASS,
            w!("mouselayer raw input"),
            WINDOW_STYLE(0),
            0,
            0,
            0,
            0,
            Some(HWND_MESSAGE),
            None,
            Some(instance),
            None,
        ) {
            Ok(hwnd) => hwnd,
            Err(e) => {
                let _ = UnregisterClassW(WINDOW_CLASS, Some(instance));
                return Err(Error::DeviceEnumeration(format!(
                    "failed to create raw input window: {}",
                    e
                )));
            }
        };

        let setup = enumerate_mice().and_then(|mice| {
            let devices = registration(RIDEV_INPUTSINK | RIDEV_DEVNOTIFY, hwnd);
            RegisterRawInputDevices(&devices, size_of::<RAWINPUTDEVICE>() as u32).map_err(|e| {
                Error::DeviceEnumeration(format!("RegisterRawInputDevices failed: {}", e))
            })?;
            Ok(mice)
        });

        match setup {
            Ok(mice) => {
                log::info!("Raw input registered, {} pointing device(s) attached", mice.len());
                let mut table = HandleTable::new();
                table.replace(mice);
                RAW_STATE.with(|state| *state.borrow_mut() = Some(RawState { sink, table }));
                Ok((hwnd, instance))
            }
            Err(e) => {
                let _ = DestroyWindow(hwnd);
                let _ = UnregisterClassW(WINDOW_CLASS, Some(instance));
                Err(e)
            }
        }
    }
}

/// Unregister, destroy the window and unregister the class.
fn close(hwnd: HWND, instance: HINSTANCE) {
    RAW_STATE.with(|state| *state.borrow_mut() = None);
    unsafe {
        let devices = registration(RIDEV_REMOVE, HWND::default());
        if let Err(e) = RegisterRawInputDevices(&devices, size_of::<RAWINPUTDEVICE>() as u32) {
            log::warn!("Failed to unregister raw input: {}", e);
        }
        let _ = DestroyWindow(hwnd);
        let _ = UnregisterClassW(WINDOW_CLASS, Some(instance));
    }
}

/// Run the raw input sink on its own thread.
///
/// Fails with [`Error::DeviceEnumeration`] if the window cannot be created,
/// devices cannot be listed or registration is refused.
pub(super) fn spawn(sink: ActivitySink) -> Result<ServiceThread> {
    let (ready_tx, ready) = mpsc::channel();

    let service = ServiceThread::spawn("raw-input", move |running| {
        let (hwnd, instance) = match open(sink) {
            Ok(opened) => opened,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };
        let _ = ready_tx.send(Ok(()));

        pump_messages(&running);

        close(hwnd, instance);
        log::debug!("Raw input closed");
    })?;

    await_startup(service, ready, "raw input")
}
