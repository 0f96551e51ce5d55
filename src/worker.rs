//! Action worker.
//!
//! One background thread drains a FIFO of [`QueuedAction`]s, drives the
//! [`PointerActuator`] and notifies an [`ActionHandler`]. Producers (the key
//! pipeline, activity sources) only ever enqueue, so hook callbacks return
//! without waiting on actuation.

use crate::device::DeviceIdentity;
use crate::error::Result;
use crate::event::{Button, MouseAction, QueuedAction};
use crate::service::{POLL_INTERVAL, STOP_TIMEOUT, ServiceThread};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};

/// Synthesizes pointer input.
pub trait PointerActuator: Send + Sync {
    /// Hold a button down.
    fn press(&self, button: Button) -> Result<()>;

    /// Let a button go.
    fn release(&self, button: Button) -> Result<()>;

    /// Scroll by whole notches; positive `dy` is up, positive `dx` is right.
    fn scroll(&self, dx: i32, dy: i32) -> Result<()>;
}

/// Callbacks run on the worker thread after each action.
///
/// All methods default to no-ops.
pub trait ActionHandler: Send + Sync {
    /// A mapped key went down (`pressed`) or came back up.
    fn on_mapped_key(&self, _key: &str, _action: MouseAction, _pressed: bool) {}

    /// An unmapped key was pressed while the layer was active.
    fn on_unmapped_key(&self, _key: &str) {}

    /// A pointing device produced activity.
    fn on_mouse_activity(&self, _device: Option<&DeviceIdentity>) {}
}

/// Producer side of the action queue.
#[derive(Debug, Clone)]
pub struct ActionSender {
    tx: Sender<QueuedAction>,
}

impl ActionSender {
    /// Enqueue an action; returns `false` if the worker is gone.
    ///
    /// Never blocks.
    pub fn send(&self, action: QueuedAction) -> bool {
        self.tx.send(action).is_ok()
    }
}

/// Create a connected queue.
pub fn action_queue() -> (ActionSender, Receiver<QueuedAction>) {
    let (tx, rx) = mpsc::channel();
    (ActionSender { tx }, rx)
}

/// The running worker thread.
pub struct ActionWorker {
    service: ServiceThread,
}

impl ActionWorker {
    /// Start draining `queue` on a new thread.
    pub fn spawn(
        queue: Receiver<QueuedAction>,
        actuator: Arc<dyn PointerActuator>,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<Self> {
        let service = ServiceThread::spawn("action-worker", move |running| {
            log::debug!("Action worker started");
            while running.load(Ordering::SeqCst) {
                match queue.recv_timeout(POLL_INTERVAL) {
                    Ok(action) => process(&action, actuator.as_ref(), handler.as_ref()),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            log::debug!("Action worker stopped");
        })?;
        Ok(Self { service })
    }

    /// Check if the worker thread is alive.
    pub fn is_running(&self) -> bool {
        self.service.is_running()
    }

    /// Stop the worker. Queued items not yet dequeued are dropped.
    pub fn stop(mut self) -> bool {
        self.service.stop(STOP_TIMEOUT)
    }
}

fn process(action: &QueuedAction, actuator: &dyn PointerActuator, handler: &dyn ActionHandler) {
    log::debug!("Processing {} action", action.kind());

    match action {
        QueuedAction::Press { key, action } => {
            actuate(actuator, *action, true);
            notify("on_mapped_key", || handler.on_mapped_key(key, *action, true));
        }
        QueuedAction::Release { key, action } => {
            actuate(actuator, *action, false);
            notify("on_mapped_key", || handler.on_mapped_key(key, *action, false));
        }
        QueuedAction::MouseActivity { device } => {
            notify("on_mouse_activity", || handler.on_mouse_activity(device.as_ref()));
        }
        QueuedAction::Unmapped { key } => {
            notify("on_unmapped_key", || handler.on_unmapped_key(key));
        }
    }
}

fn actuate(actuator: &dyn PointerActuator, action: MouseAction, pressed: bool) {
    let result = if let Some(button) = action.button() {
        if pressed {
            actuator.press(button)
        } else {
            actuator.release(button)
        }
    } else if let Some((dx, dy)) = action.scroll_delta() {
        if pressed {
            actuator.scroll(dx, dy)
        } else {
            Ok(())
        }
    } else {
        Ok(())
    };

    if let Err(e) = result {
        log::error!("Failed to perform {}: {}", action, e);
    }
}

fn notify(callback: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        log::error!("Action callback {} panicked", callback);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Actuator that records every call.
    #[derive(Default)]
    pub(crate) struct RecordingActuator {
        pub calls: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl RecordingActuator {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) -> Result<()> {
            self.calls.lock().unwrap().push(call);
            if self.fail {
                Err(Error::Actuation("device unplugged".into()))
            } else {
                Ok(())
            }
        }
    }

    impl PointerActuator for RecordingActuator {
        fn press(&self, button: Button) -> Result<()> {
            self.record(format!("press {:?}", button))
        }

        fn release(&self, button: Button) -> Result<()> {
            self.record(format!("release {:?}", button))
        }

        fn scroll(&self, dx: i32, dy: i32) -> Result<()> {
            self.record(format!("scroll {} {}", dx, dy))
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        events: Mutex<Vec<String>>,
        panic_on_unmapped: bool,
    }

    impl ActionHandler for RecordingHandler {
        fn on_mapped_key(&self, key: &str, action: MouseAction, pressed: bool) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{} {} {}", key, action, pressed));
        }

        fn on_unmapped_key(&self, key: &str) {
            if self.panic_on_unmapped {
                panic!("handler failure");
            }
            self.events.lock().unwrap().push(format!("unmapped {}", key));
        }

        fn on_mouse_activity(&self, device: Option<&DeviceIdentity>) {
            let name = device.map(|d| d.display_name.as_str()).unwrap_or("anonymous");
            self.events.lock().unwrap().push(format!("activity {}", name));
        }
    }

    pub(crate) fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn press(key: &str, action: MouseAction) -> QueuedAction {
        QueuedAction::Press {
            key: key.into(),
            action,
        }
    }

    fn release(key: &str, action: MouseAction) -> QueuedAction {
        QueuedAction::Release {
            key: key.into(),
            action,
        }
    }

    #[test]
    fn test_actions_run_in_order() {
        let actuator = Arc::new(RecordingActuator::default());
        let handler = Arc::new(RecordingHandler::default());
        let (tx, rx) = action_queue();
        let worker = ActionWorker::spawn(rx, actuator.clone(), handler.clone()).unwrap();

        tx.send(press("f", MouseAction::LeftClick));
        tx.send(release("f", MouseAction::LeftClick));
        tx.send(press("u", MouseAction::ScrollUp));
        tx.send(release("u", MouseAction::ScrollUp));
        tx.send(QueuedAction::MouseActivity { device: None });

        assert!(wait_for(Duration::from_secs(1), || {
            handler.events.lock().unwrap().len() == 5
        }));
        assert_eq!(
            actuator.calls(),
            vec!["press Left", "release Left", "scroll 0 3"]
        );
        assert_eq!(
            handler.events.lock().unwrap()[..2],
            [
                "f mouse_left_click true".to_string(),
                "f mouse_left_click false".to_string()
            ]
        );
        assert!(worker.stop());
    }

    #[test]
    fn test_failures_do_not_stop_worker() {
        let actuator = Arc::new(RecordingActuator {
            fail: true,
            ..Default::default()
        });
        let handler = Arc::new(RecordingHandler {
            panic_on_unmapped: true,
            ..Default::default()
        });
        let (tx, rx) = action_queue();
        let worker = ActionWorker::spawn(rx, actuator.clone(), handler.clone()).unwrap();

        tx.send(press("j", MouseAction::LeftClick));
        tx.send(QueuedAction::Unmapped { key: "z".into() });
        tx.send(press("k", MouseAction::RightClick));

        assert!(wait_for(Duration::from_secs(1), || actuator.calls().len() == 2));
        assert!(worker.is_running());
        assert!(worker.stop());
    }

    #[test]
    fn test_release_without_press_is_tolerated() {
        let actuator = Arc::new(RecordingActuator::default());
        let handler = Arc::new(RecordingHandler::default());
        let (tx, rx) = action_queue();
        let worker = ActionWorker::spawn(rx, actuator.clone(), handler.clone()).unwrap();

        tx.send(release("k", MouseAction::RightClick));
        assert!(wait_for(Duration::from_secs(1), || actuator.calls().len() == 1));
        assert!(worker.stop());
    }

    #[test]
    fn test_stop_is_bounded() {
        let (tx, rx) = action_queue();
        let worker = ActionWorker::spawn(
            rx,
            Arc::new(RecordingActuator::default()),
            Arc::new(RecordingHandler::default()),
        )
        .unwrap();

        let started = Instant::now();
        assert!(worker.stop());
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(!tx.send(QueuedAction::Unmapped { key: "x".into() }));
    }
}
