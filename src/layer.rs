//! Layer state machine.
//!
//! The layer is NORMAL until a pointing device shows activity, ACTIVE while
//! activity keeps arriving within the inactivity window, and LATCHED when the
//! user pins it on. All transitions go through [`LayerStateMachine`], which
//! owns a single inactivity deadline serviced by one timer thread, and
//! delivers [`StateChange`] records to listeners on a separate dispatcher
//! thread so a listener can never stall (or deadlock) the caller.

use crate::error::{Error, Result};
use crate::service::{POLL_INTERVAL, STOP_TIMEOUT, ServiceThread};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime};

/// Current mode of the mouse layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerState {
    /// Keys pass through unmodified.
    Normal,
    /// Mapped keys act as mouse buttons; expires after inactivity.
    Active,
    /// Like `Active`, but only an explicit exit ends it.
    Latched,
}

impl LayerState {
    /// Check if mapped keys are currently intercepted.
    pub fn is_active(&self) -> bool {
        matches!(self, LayerState::Active | LayerState::Latched)
    }

    /// Upper-case label, as shown in status text.
    pub fn name(&self) -> &'static str {
        match self {
            LayerState::Normal => "NORMAL",
            LayerState::Active => "ACTIVE",
            LayerState::Latched => "LATCHED",
        }
    }
}

impl fmt::Display for LayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeReason {
    MouseActivity,
    Timeout,
    UnmappedKey,
    ExplicitExit,
    Latch,
}

impl ChangeReason {
    /// The snake_case label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeReason::MouseActivity => "mouse_activity",
            ChangeReason::Timeout => "timeout",
            ChangeReason::UnmappedKey => "unmapped_key",
            ChangeReason::ExplicitExit => "explicit_exit",
            ChangeReason::Latch => "latch",
        }
    }
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An accepted state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    /// State before the transition.
    pub old_state: LayerState,
    /// State after the transition.
    pub new_state: LayerState,
    /// What caused it.
    pub reason: ChangeReason,
    /// When it happened.
    pub timestamp: SystemTime,
}

/// Handle returned by [`LayerStateMachine::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&StateChange) + Send + Sync>;

/// Convert a configured timeout into a duration; `<= 0` means never.
pub fn timeout_from_ms(timeout_ms: i64) -> Option<Duration> {
    u64::try_from(timeout_ms)
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

struct Machine {
    state: LayerState,
    timeout: Option<Duration>,
    /// Armed iff `state == Active` and a timeout is configured.
    deadline: Option<Instant>,
    changes: Sender<StateChange>,
}

impl Machine {
    fn transition(&mut self, new_state: LayerState, reason: ChangeReason) {
        if new_state == self.state {
            return;
        }

        let change = StateChange {
            old_state: self.state,
            new_state,
            reason,
            timestamp: SystemTime::now(),
        };
        log::info!("Layer {} -> {} ({})", self.state, new_state, reason);

        self.state = new_state;
        if new_state != LayerState::Active {
            self.deadline = None;
        }
        // Sent under the lock so listeners observe transitions in order.
        let _ = self.changes.send(change);
    }

    fn arm(&mut self) {
        self.deadline = self.timeout.map(|timeout| Instant::now() + timeout);
    }
}

struct Shared {
    machine: Mutex<Machine>,
    wake: Condvar,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

impl Shared {
    fn lock(&self) -> Option<MutexGuard<'_, Machine>> {
        match self.machine.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                log::error!("Layer state lock poisoned");
                None
            }
        }
    }
}

/// The authoritative layer state.
pub struct LayerStateMachine {
    shared: Arc<Shared>,
    timer: ServiceThread,
    dispatcher: ServiceThread,
}

impl LayerStateMachine {
    /// Create a state machine in NORMAL with the given inactivity timeout.
    ///
    /// A timeout `<= 0` disables expiry.
    pub fn new(timeout_ms: i64) -> Result<Self> {
        let (changes, receiver) = mpsc::channel();
        let shared = Arc::new(Shared {
            machine: Mutex::new(Machine {
                state: LayerState::Normal,
                timeout: timeout_from_ms(timeout_ms),
                deadline: None,
                changes,
            }),
            wake: Condvar::new(),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        });

        let timer_shared = shared.clone();
        let timer = ServiceThread::spawn("layer-timer", move |running| {
            run_timer(&timer_shared, || running.load(Ordering::SeqCst));
        })?;

        let dispatch_shared = shared.clone();
        let dispatcher = ServiceThread::spawn("layer-listeners", move |running| {
            run_dispatcher(&dispatch_shared, receiver, || running.load(Ordering::SeqCst));
        })?;

        Ok(Self {
            shared,
            timer,
            dispatcher,
        })
    }

    /// Pointing-device activity was observed.
    pub fn on_mouse_activity(&self) {
        let Some(mut machine) = self.shared.lock() else {
            return;
        };
        match machine.state {
            LayerState::Normal => {
                machine.transition(LayerState::Active, ChangeReason::MouseActivity);
                machine.arm();
            }
            LayerState::Active => machine.arm(),
            LayerState::Latched => return,
        }
        drop(machine);
        self.shared.wake.notify_all();
    }

    /// A mapped key was used; keeps an ACTIVE layer alive.
    pub fn on_mapped_key(&self) {
        let Some(mut machine) = self.shared.lock() else {
            return;
        };
        if machine.state == LayerState::Active {
            machine.arm();
            drop(machine);
            self.shared.wake.notify_all();
        }
    }

    /// An unmapped key was pressed; leaves an ACTIVE layer.
    pub fn on_unmapped_key(&self) {
        if let Some(mut machine) = self.shared.lock() {
            if machine.state == LayerState::Active {
                machine.deadline = None;
                machine.transition(LayerState::Normal, ChangeReason::UnmappedKey);
            }
        }
    }

    /// Pin the layer on until [`exit_layer`](Self::exit_layer).
    pub fn latch(&self) {
        if let Some(mut machine) = self.shared.lock() {
            if machine.state != LayerState::Latched {
                machine.deadline = None;
                machine.transition(LayerState::Latched, ChangeReason::Latch);
            }
        }
    }

    /// Return to NORMAL from any state.
    pub fn exit_layer(&self) {
        if let Some(mut machine) = self.shared.lock() {
            machine.deadline = None;
            machine.transition(LayerState::Normal, ChangeReason::ExplicitExit);
        }
    }

    /// The state at the time of the call.
    pub fn current_state(&self) -> LayerState {
        self.shared
            .lock()
            .map(|machine| machine.state)
            .unwrap_or(LayerState::Normal)
    }

    /// Check if the layer is ACTIVE or LATCHED.
    pub fn is_active(&self) -> bool {
        self.current_state().is_active()
    }

    /// Change the inactivity timeout; `<= 0` disables expiry.
    ///
    /// An ACTIVE layer restarts its window with the new value.
    pub fn set_timeout_ms(&self, timeout_ms: i64) {
        let Some(mut machine) = self.shared.lock() else {
            return;
        };
        machine.timeout = timeout_from_ms(timeout_ms);
        if machine.state == LayerState::Active {
            machine.arm();
        }
        drop(machine);
        self.shared.wake.notify_all();
    }

    /// The configured inactivity timeout, `None` if the layer never expires.
    pub fn timeout(&self) -> Option<Duration> {
        self.shared.lock().and_then(|machine| machine.timeout)
    }

    /// Register a listener for state changes.
    ///
    /// Listeners run on the dispatcher thread, one change at a time, in
    /// transition order.
    pub fn add_listener<F>(&self, listener: F) -> Result<ListenerId>
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        let id = ListenerId(self.shared.next_listener.fetch_add(1, Ordering::Relaxed));
        self.shared
            .listeners
            .lock()
            .map_err(|_| Error::ThreadError("mutex poisoned".into()))?
            .push((id, Arc::new(listener)));
        Ok(id)
    }

    /// Unregister a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let Ok(mut listeners) = self.shared.listeners.lock() else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }
}

impl Drop for LayerStateMachine {
    fn drop(&mut self) {
        self.timer.signal_stop();
        self.shared.wake.notify_all();
        self.timer.stop(STOP_TIMEOUT);
        self.dispatcher.stop(STOP_TIMEOUT);
    }
}

fn run_timer(shared: &Shared, running: impl Fn() -> bool) {
    let Some(mut machine) = shared.lock() else {
        return;
    };

    while running() {
        let now = Instant::now();
        let wait = match machine.deadline {
            Some(deadline) if deadline <= now => {
                machine.deadline = None;
                // Stale deadlines are cleared on every exit from ACTIVE.
                if machine.state == LayerState::Active {
                    machine.transition(LayerState::Normal, ChangeReason::Timeout);
                }
                continue;
            }
            Some(deadline) => (deadline - now).min(POLL_INTERVAL),
            None => POLL_INTERVAL,
        };

        machine = match shared.wake.wait_timeout(machine, wait) {
            Ok((guard, _)) => guard,
            Err(_) => {
                log::error!("Layer state lock poisoned; timer stopped");
                return;
            }
        };
    }
}

fn run_dispatcher(shared: &Shared, changes: Receiver<StateChange>, running: impl Fn() -> bool) {
    while running() {
        let change = match changes.recv_timeout(POLL_INTERVAL) {
            Ok(change) => change,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        // Snapshot so listeners can add or remove listeners re-entrantly.
        let listeners: Vec<Listener> = match shared.listeners.lock() {
            Ok(listeners) => listeners.iter().map(|(_, l)| l.clone()).collect(),
            Err(_) => {
                log::error!("Listener list lock poisoned");
                break;
            }
        };

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&change))).is_err() {
                log::error!(
                    "State listener panicked handling {} -> {}",
                    change.old_state,
                    change.new_state
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;
    use std::thread;

    fn recorder(machine: &LayerStateMachine) -> Arc<Mutex<Vec<StateChange>>> {
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = changes.clone();
        machine
            .add_listener(move |change| sink.lock().unwrap().push(change.clone()))
            .unwrap();
        changes
    }

    fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn transitions(changes: &Mutex<Vec<StateChange>>) -> Vec<(LayerState, LayerState, ChangeReason)> {
        changes
            .lock()
            .unwrap()
            .iter()
            .map(|c| (c.old_state, c.new_state, c.reason))
            .collect()
    }

    #[test]
    fn test_activity_burst_fires_once() {
        let machine = LayerStateMachine::new(300).unwrap();
        let changes = recorder(&machine);

        for _ in 0..10 {
            machine.on_mouse_activity();
            thread::sleep(Duration::from_millis(40));
        }

        assert_eq!(machine.current_state(), LayerState::Active);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(
            transitions(&changes),
            vec![(
                LayerState::Normal,
                LayerState::Active,
                ChangeReason::MouseActivity
            )]
        );
    }

    #[test]
    fn test_timeout_fires_exactly_once() {
        let machine = LayerStateMachine::new(100).unwrap();
        let changes = recorder(&machine);

        machine.on_mouse_activity();
        assert!(wait_until(Duration::from_secs(2), || {
            machine.current_state() == LayerState::Normal
        }));
        thread::sleep(Duration::from_millis(300));

        assert_eq!(
            transitions(&changes),
            vec![
                (
                    LayerState::Normal,
                    LayerState::Active,
                    ChangeReason::MouseActivity
                ),
                (LayerState::Active, LayerState::Normal, ChangeReason::Timeout),
            ]
        );
    }

    #[test]
    fn test_early_exit_cancels_pending_timeout() {
        let endings: [(fn(&LayerStateMachine), LayerState); 3] = [
            (|m| m.on_unmapped_key(), LayerState::Normal),
            (|m| m.exit_layer(), LayerState::Normal),
            (|m| m.latch(), LayerState::Latched),
        ];

        for (end, expected) in endings {
            let machine = LayerStateMachine::new(100).unwrap();
            let changes = recorder(&machine);

            machine.on_mouse_activity();
            thread::sleep(Duration::from_millis(30));
            end(&machine);
            thread::sleep(Duration::from_millis(300));

            assert_eq!(machine.current_state(), expected);
            let reasons: Vec<_> = transitions(&changes).into_iter().map(|t| t.2).collect();
            assert_eq!(reasons.len(), 2, "{:?}", reasons);
            assert!(!reasons.contains(&ChangeReason::Timeout), "{:?}", reasons);
        }
    }

    #[test]
    fn test_latch_never_times_out() {
        let machine = LayerStateMachine::new(500).unwrap();
        machine.on_mouse_activity();
        machine.latch();

        thread::sleep(Duration::from_millis(2000));
        assert_eq!(machine.current_state(), LayerState::Latched);

        // Activity and unmapped keys do not leave a latched layer.
        machine.on_mouse_activity();
        machine.on_unmapped_key();
        assert_eq!(machine.current_state(), LayerState::Latched);

        machine.exit_layer();
        assert_eq!(machine.current_state(), LayerState::Normal);
    }

    #[test]
    fn test_unmapped_key_only_exits_active() {
        let machine = LayerStateMachine::new(1000).unwrap();
        let changes = recorder(&machine);

        machine.on_unmapped_key();
        assert_eq!(machine.current_state(), LayerState::Normal);

        machine.on_mouse_activity();
        machine.on_unmapped_key();
        assert_eq!(machine.current_state(), LayerState::Normal);

        assert!(wait_until(Duration::from_secs(1), || changes.lock().unwrap().len() == 2));
        assert_eq!(
            transitions(&changes)[1],
            (
                LayerState::Active,
                LayerState::Normal,
                ChangeReason::UnmappedKey
            )
        );
    }

    #[test]
    fn test_mapped_key_extends_active_window() {
        let machine = LayerStateMachine::new(200).unwrap();
        machine.on_mouse_activity();
        for _ in 0..6 {
            thread::sleep(Duration::from_millis(80));
            machine.on_mapped_key();
        }
        assert_eq!(machine.current_state(), LayerState::Active);

        // Mapped keys never activate the layer on their own.
        machine.exit_layer();
        machine.on_mapped_key();
        assert_eq!(machine.current_state(), LayerState::Normal);
    }

    #[test]
    fn test_exit_is_idempotent() {
        let machine = LayerStateMachine::new(1000).unwrap();
        let changes = recorder(&machine);

        machine.exit_layer();
        machine.latch();
        machine.exit_layer();
        machine.exit_layer();

        assert!(wait_until(Duration::from_secs(1), || changes.lock().unwrap().len() == 2));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(
            transitions(&changes),
            vec![
                (LayerState::Normal, LayerState::Latched, ChangeReason::Latch),
                (
                    LayerState::Latched,
                    LayerState::Normal,
                    ChangeReason::ExplicitExit
                ),
            ]
        );
    }

    #[test]
    fn test_non_positive_timeout_never_expires() {
        let machine = LayerStateMachine::new(0).unwrap();
        assert_eq!(machine.timeout(), None);
        machine.on_mouse_activity();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(machine.current_state(), LayerState::Active);

        machine.set_timeout_ms(50);
        assert!(wait_until(Duration::from_secs(1), || {
            machine.current_state() == LayerState::Normal
        }));
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let machine = LayerStateMachine::new(1000).unwrap();
        machine.add_listener(|_| panic!("listener failure")).unwrap();
        let changes = recorder(&machine);

        machine.on_mouse_activity();
        machine.exit_layer();

        assert!(wait_until(Duration::from_secs(1), || changes.lock().unwrap().len() == 2));
        assert_eq!(machine.current_state(), LayerState::Normal);
    }

    #[test]
    fn test_removed_listener_stops_receiving() {
        let machine = LayerStateMachine::new(1000).unwrap();
        let removed = Arc::new(Mutex::new(0));
        let counter = removed.clone();
        let id = machine
            .add_listener(move |_| *counter.lock().unwrap() += 1)
            .unwrap();
        let kept = recorder(&machine);

        assert!(machine.remove_listener(id));
        assert!(!machine.remove_listener(id));
        machine.latch();

        assert!(wait_until(Duration::from_secs(1), || kept.lock().unwrap().len() == 1));
        assert_eq!(*removed.lock().unwrap(), 0);
    }

    #[test]
    fn test_listener_may_reenter() {
        let machine = Arc::new(LayerStateMachine::new(1000).unwrap());
        let weak: Weak<LayerStateMachine> = Arc::downgrade(&machine);
        machine
            .add_listener(move |change| {
                if change.new_state == LayerState::Active {
                    if let Some(machine) = weak.upgrade() {
                        machine.latch();
                    }
                }
            })
            .unwrap();

        machine.on_mouse_activity();
        assert!(wait_until(Duration::from_secs(1), || {
            machine.current_state() == LayerState::Latched
        }));
    }
}
