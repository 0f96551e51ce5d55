//! Session-wide pointer activity through the X11 RECORD extension.
//!
//! Used as the generic source when `/dev/input` is not readable. XRecord
//! sees the pointer events of every client but cannot tell devices apart,
//! so every report is anonymous. Only motion counts: the virtual pointer
//! that performs mapped clicks and scrolls never moves, so its own
//! button events cannot keep the layer alive.

use crate::activity::ActivitySink;
use crate::error::{Error, Result};
use crate::service::{POLL_INTERVAL, ServiceThread};
use std::os::raw::{c_char, c_int, c_uchar, c_ulong};
use std::ptr::{null, null_mut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use x11::xlib;
use x11::xrecord;

use super::evdev::await_startup;

/// Set by the record callback, drained once per batch of replies.
static MOTION_SEEN: AtomicBool = AtomicBool::new(false);

const FALSE: c_int = 0;

/// XRecord callback
unsafe extern "C" fn record_callback(
    _closure: *mut c_char,
    raw_data: *mut xrecord::XRecordInterceptData,
) {
    unsafe {
        let Some(data) = raw_data.as_ref() else {
            return;
        };

        // The first byte of a recorded device event is its X event type.
        if data.category == xrecord::XRecordFromServer
            && !data.data.is_null()
            && data.data_len > 0
        {
            let type_ = *data.data as c_int;
            if type_ == xlib::MotionNotify {
                MOTION_SEEN.store(true, Ordering::Relaxed);
            }
        }

        xrecord::XRecordFreeData(raw_data);
    }
}

/// Control and data connections plus the recording context.
struct Recording {
    control: *mut xlib::Display,
    data: *mut xlib::Display,
    context: xrecord::XRecordContext,
}

impl Recording {
    fn open() -> Result<Self> {
        unsafe {
            let control = xlib::XOpenDisplay(null());
            if control.is_null() {
                return Err(Error::NotSupported("Failed to open X display".into()));
            }
            let data = xlib::XOpenDisplay(null());
            if data.is_null() {
                xlib::XCloseDisplay(control);
                return Err(Error::NotSupported("Failed to open X display".into()));
            }

            let close = |reason: &str| {
                xlib::XCloseDisplay(data);
                xlib::XCloseDisplay(control);
                Error::NotSupported(reason.to_string())
            };

            let extension = xlib::XInitExtension(control, c"RECORD".as_ptr());
            if extension.is_null() {
                return Err(close("XRecord extension not available"));
            }

            let range = xrecord::XRecordAllocRange();
            if range.is_null() {
                return Err(close("Failed to allocate XRecord range"));
            }
            (*range).device_events.first = xlib::ButtonPress as c_uchar;
            (*range).device_events.last = xlib::MotionNotify as c_uchar;

            let mut clients: c_ulong = xrecord::XRecordAllClients;
            let mut ranges = range;
            let context =
                xrecord::XRecordCreateContext(control, 0, &mut clients, 1, &mut ranges, 1);
            xlib::XFree(range as *mut _);

            if context == 0 {
                return Err(close("Failed to create XRecord context"));
            }
            xlib::XSync(control, FALSE);

            let enabled =
                xrecord::XRecordEnableContextAsync(data, context, Some(record_callback), null_mut());
            if enabled == 0 {
                xrecord::XRecordFreeContext(control, context);
                return Err(close("Failed to enable XRecord context"));
            }

            Ok(Self {
                control,
                data,
                context,
            })
        }
    }

    /// Deliver pending replies to the callback without blocking.
    fn process(&self) {
        unsafe {
            xrecord::XRecordProcessReplies(self.data);
        }
    }
}

impl Drop for Recording {
    fn drop(&mut self) {
        unsafe {
            xrecord::XRecordDisableContext(self.control, self.context);
            xlib::XSync(self.control, FALSE);
            xrecord::XRecordProcessReplies(self.data);
            xrecord::XRecordFreeContext(self.control, self.context);
            xlib::XCloseDisplay(self.data);
            xlib::XCloseDisplay(self.control);
        }
    }
}

fn run(sink: ActivitySink, running: &AtomicBool, ready: mpsc::Sender<Result<()>>) {
    let recording = match Recording::open() {
        Ok(recording) => recording,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    MOTION_SEEN.store(false, Ordering::Relaxed);
    let _ = ready.send(Ok(()));
    log::debug!("XRecord pointer listener enabled");

    while running.load(Ordering::SeqCst) {
        recording.process();
        if MOTION_SEEN.swap(false, Ordering::Relaxed) {
            sink.anonymous_activity();
        }
        thread::sleep(POLL_INTERVAL);
    }

    drop(recording);
    log::debug!("XRecord pointer listener disabled");
}

/// Report anonymous pointer motion from the X session on a service thread.
///
/// Fails with [`Error::NotSupported`] without an X display or the RECORD
/// extension (e.g. on a pure Wayland session).
pub(super) fn spawn_pointer_listener(sink: ActivitySink) -> Result<ServiceThread> {
    let (ready_tx, ready) = mpsc::channel();
    let service = ServiceThread::spawn("xrecord-pointer", move |running| {
        run(sink, &running, ready_tx)
    })?;
    await_startup(service, ready, "XRecord listener")
}
