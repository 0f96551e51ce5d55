//! Lifecycle surface: wires the registry, the state machine, the pipeline,
//! the worker and the platform hooks together.

use crate::activity::{ActivitySink, ActivitySourceMode};
use crate::config::LayerConfig;
use crate::device::{DeviceIdentity, DeviceRegistry};
use crate::error::{Error, Result};
use crate::event::MouseAction;
use crate::layer::{LayerState, LayerStateMachine, ListenerId, StateChange};
use crate::pipeline::KeyInterceptor;
use crate::platform;
use crate::worker::{ActionHandler, ActionWorker, PointerActuator, action_queue};
use std::sync::Arc;

/// Platform hook installation.
///
/// Every method must be safe to call repeatedly and in any order; removing
/// something that is not installed is a no-op.
pub trait Backend: Send {
    /// Route physical key transitions through `interceptor`.
    fn install_key_hook(&mut self, interceptor: Arc<KeyInterceptor>) -> Result<()>;

    /// Undo [`install_key_hook`](Self::install_key_hook).
    fn remove_key_hook(&mut self);

    /// Start per-device activity reporting.
    ///
    /// Fails with [`Error::DeviceEnumeration`] when devices cannot be
    /// listed or registered.
    fn start_raw_activity(&mut self, sink: ActivitySink) -> Result<()>;

    /// Start anonymous, system-wide pointer activity reporting.
    fn start_generic_activity(&mut self, sink: ActivitySink) -> Result<()>;

    /// Stop whichever activity source is running.
    fn stop_activity(&mut self);
}

/// What [`Engine::start`] managed to install.
#[derive(Debug)]
pub struct StartReport {
    /// Which activity source is running.
    pub activity_mode: ActivitySourceMode,
    /// Why the key hook is missing, if it is; keys then pass through.
    pub key_hook_error: Option<Error>,
}

impl StartReport {
    /// Check if everything started in full-featured mode.
    pub fn is_complete(&self) -> bool {
        self.activity_mode == ActivitySourceMode::Raw && self.key_hook_error.is_none()
    }
}

/// Feeds worker callbacks into the state machine.
struct LayerDriver {
    layer: Arc<LayerStateMachine>,
}

impl ActionHandler for LayerDriver {
    fn on_mapped_key(&self, _key: &str, _action: MouseAction, _pressed: bool) {
        self.layer.on_mapped_key();
    }

    fn on_unmapped_key(&self, key: &str) {
        log::debug!("Unmapped key {} pressed", key);
        self.layer.on_unmapped_key();
    }

    fn on_mouse_activity(&self, _device: Option<&DeviceIdentity>) {
        self.layer.on_mouse_activity();
    }
}

struct Running {
    interceptor: Arc<KeyInterceptor>,
    worker: ActionWorker,
    listener: ListenerId,
    activity_mode: ActivitySourceMode,
}

/// The mouse layer.
pub struct Engine {
    config: LayerConfig,
    registry: Arc<DeviceRegistry>,
    layer: Arc<LayerStateMachine>,
    backend: Box<dyn Backend>,
    actuator: Arc<dyn PointerActuator>,
    running: Option<Running>,
}

impl Engine {
    /// Create an engine using the native hooks and pointer actuator.
    pub fn new(config: LayerConfig) -> Result<Self> {
        let actuator = platform::native_actuator()?;
        Self::with_backend(config, Box::new(platform::NativeBackend::new()), actuator)
    }

    /// Create an engine on top of a custom backend and actuator.
    pub fn with_backend(
        config: LayerConfig,
        backend: Box<dyn Backend>,
        actuator: Arc<dyn PointerActuator>,
    ) -> Result<Self> {
        let registry = Arc::new(DeviceRegistry::new());
        registry.apply_known(config.devices())?;
        let layer = Arc::new(LayerStateMachine::new(config.timeout_ms)?);

        Ok(Self {
            config,
            registry,
            layer,
            backend,
            actuator,
            running: None,
        })
    }

    /// Install the hooks and start processing.
    ///
    /// Anything left over from a previous start is torn down first. A
    /// missing key hook or a fallback to generic activity is reported in the
    /// returned [`StartReport`]; only the absence of any activity source is
    /// an error.
    pub fn start(&mut self) -> Result<StartReport> {
        self.teardown();

        let (queue, receiver) = action_queue();
        let interceptor = Arc::new(KeyInterceptor::new(
            self.config.key_mapping(),
            self.config.exit_on_unmapped,
            queue.clone(),
        ));
        interceptor.set_layer_active(self.layer.is_active());

        let worker = ActionWorker::spawn(
            receiver,
            self.actuator.clone(),
            Arc::new(LayerDriver {
                layer: self.layer.clone(),
            }),
        )?;

        let follower = interceptor.clone();
        let listener = match self
            .layer
            .add_listener(move |change| follower.set_layer_active(change.new_state.is_active()))
        {
            Ok(id) => id,
            Err(e) => {
                worker.stop();
                return Err(e);
            }
        };

        let key_hook_error = match self.backend.install_key_hook(interceptor.clone()) {
            Ok(()) => None,
            Err(e) => {
                log::warn!("Keyboard hook unavailable, keys will pass through: {}", e);
                Some(e)
            }
        };

        let sink = ActivitySink::new(self.registry.clone(), queue);
        let activity_mode = match self.backend.start_raw_activity(sink.clone()) {
            Ok(()) => ActivitySourceMode::Raw,
            Err(raw_error) => {
                log::warn!(
                    "Per-device input unavailable, device filtering disabled: {}",
                    raw_error
                );
                self.backend.stop_activity();
                match self.backend.start_generic_activity(sink) {
                    Ok(()) => ActivitySourceMode::Generic,
                    Err(generic_error) => {
                        self.backend.stop_activity();
                        self.backend.remove_key_hook();
                        self.layer.remove_listener(listener);
                        worker.stop();
                        return Err(Error::NoActivitySource(format!(
                            "raw: {}; generic: {}",
                            raw_error, generic_error
                        )));
                    }
                }
            }
        };

        log::info!(
            "Mouse layer started (activity: {}, key hook: {})",
            activity_mode,
            if key_hook_error.is_none() { "installed" } else { "missing" }
        );

        self.running = Some(Running {
            interceptor,
            worker,
            listener,
            activity_mode,
        });

        Ok(StartReport {
            activity_mode,
            key_hook_error,
        })
    }

    /// Remove the hooks and stop processing.
    pub fn stop(&mut self) -> Result<()> {
        if self.running.is_none() {
            return Err(Error::NotRunning);
        }
        self.teardown();
        log::info!("Mouse layer stopped");
        Ok(())
    }

    fn teardown(&mut self) {
        self.backend.stop_activity();
        self.backend.remove_key_hook();

        if let Some(running) = self.running.take() {
            self.layer.remove_listener(running.listener);
            running.interceptor.set_layer_active(false);
            running.worker.stop();
        }
        self.layer.exit_layer();
    }

    /// Apply a new configuration in one step.
    pub fn reload(&mut self, config: LayerConfig) -> Result<()> {
        self.registry.apply_known(config.devices())?;
        self.layer.set_timeout_ms(config.timeout_ms);
        if let Some(running) = &self.running {
            running
                .interceptor
                .reload(config.key_mapping(), config.exit_on_unmapped);
        }
        self.config = config;
        Ok(())
    }

    /// Stop everything and release the engine.
    pub fn quit(mut self) {
        self.teardown();
        log::info!("Mouse layer shut down");
    }

    /// Pin the layer on.
    pub fn latch(&self) {
        self.layer.latch();
    }

    /// Return the layer to NORMAL.
    pub fn exit_layer(&self) {
        self.layer.exit_layer();
    }

    /// Current layer state.
    pub fn state(&self) -> LayerState {
        self.layer.current_state()
    }

    /// Register a state change listener.
    pub fn add_listener<F>(&self, listener: F) -> Result<ListenerId>
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.layer.add_listener(listener)
    }

    /// Unregister a state change listener.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.layer.remove_listener(id)
    }

    /// Check if the hooks are installed.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// The activity source in use, `Unavailable` when stopped.
    pub fn activity_mode(&self) -> ActivitySourceMode {
        self.running
            .as_ref()
            .map(|running| running.activity_mode)
            .unwrap_or(ActivitySourceMode::Unavailable)
    }

    /// The device registry.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// The configuration in effect, with the registry's devices merged in
    /// so it can be saved.
    pub fn export_config(&self) -> LayerConfig {
        let mut config = self.config.clone();
        config.known_devices = self.registry.export();
        config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.running.is_some() {
            self.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceId;
    use crate::event::Decision;
    use crate::worker::tests::{RecordingActuator, wait_for};
    use std::sync::Mutex;
    use std::time::Duration;

    /// What the scripted backend currently has installed.
    #[derive(Default)]
    struct Installed {
        interceptor: Option<Arc<KeyInterceptor>>,
        sink: Option<ActivitySink>,
        raw: bool,
        calls: Vec<&'static str>,
    }

    #[derive(Clone, Default)]
    struct ScriptedBackend {
        installed: Arc<Mutex<Installed>>,
        deny_key_hook: bool,
        deny_raw: bool,
        deny_generic: bool,
    }

    impl ScriptedBackend {
        fn key(&self, id: &str, pressed: bool) -> Decision {
            let interceptor = self.installed.lock().unwrap().interceptor.clone();
            interceptor
                .map(|i| i.classify(id, pressed))
                .unwrap_or(Decision::PassThrough)
        }

        fn sink(&self) -> ActivitySink {
            self.installed.lock().unwrap().sink.clone().unwrap()
        }

        fn calls(&self) -> Vec<&'static str> {
            self.installed.lock().unwrap().calls.clone()
        }
    }

    impl Backend for ScriptedBackend {
        fn install_key_hook(&mut self, interceptor: Arc<KeyInterceptor>) -> Result<()> {
            let mut installed = self.installed.lock().unwrap();
            installed.calls.push("install_key_hook");
            if self.deny_key_hook {
                return Err(Error::HookUnavailable("access denied".into()));
            }
            installed.interceptor = Some(interceptor);
            Ok(())
        }

        fn remove_key_hook(&mut self) {
            let mut installed = self.installed.lock().unwrap();
            installed.calls.push("remove_key_hook");
            installed.interceptor = None;
        }

        fn start_raw_activity(&mut self, sink: ActivitySink) -> Result<()> {
            let mut installed = self.installed.lock().unwrap();
            installed.calls.push("start_raw");
            if self.deny_raw {
                return Err(Error::DeviceEnumeration("no raw input".into()));
            }
            installed.sink = Some(sink);
            installed.raw = true;
            Ok(())
        }

        fn start_generic_activity(&mut self, sink: ActivitySink) -> Result<()> {
            let mut installed = self.installed.lock().unwrap();
            installed.calls.push("start_generic");
            if self.deny_generic {
                return Err(Error::HookUnavailable("no mouse hook".into()));
            }
            installed.sink = Some(sink);
            installed.raw = false;
            Ok(())
        }

        fn stop_activity(&mut self) {
            let mut installed = self.installed.lock().unwrap();
            installed.calls.push("stop_activity");
            installed.sink = None;
        }
    }

    fn engine(backend: &ScriptedBackend, config: LayerConfig) -> (Engine, Arc<RecordingActuator>) {
        let actuator = Arc::new(RecordingActuator::default());
        let engine =
            Engine::with_backend(config, Box::new(backend.clone()), actuator.clone()).unwrap();
        (engine, actuator)
    }

    fn activate(backend: &ScriptedBackend, engine: &Engine) {
        backend.sink().anonymous_activity();
        assert!(wait_for(Duration::from_secs(1), || engine.state() == LayerState::Active));
        // The pipeline follows the state through the listener thread.
        assert!(wait_for(Duration::from_secs(1), || {
            backend
                .installed
                .lock()
                .unwrap()
                .interceptor
                .as_ref()
                .is_some_and(|i| i.is_layer_active())
        }));
    }

    #[test]
    fn test_mapped_key_clicks_while_active() {
        let backend = ScriptedBackend::default();
        let (mut engine, actuator) = engine(&backend, LayerConfig::default());
        let report = engine.start().unwrap();
        assert!(report.is_complete());

        assert_eq!(backend.key("j", true), Decision::PassThrough);
        activate(&backend, &engine);

        assert_eq!(backend.key("j", true), Decision::Suppress);
        assert_eq!(backend.key("j", true), Decision::Suppress);
        assert_eq!(backend.key("j", false), Decision::Suppress);
        assert_eq!(backend.key("shift_left", true), Decision::PassThrough);

        assert!(wait_for(Duration::from_secs(1), || actuator.calls().len() == 2));
        assert_eq!(actuator.calls(), vec!["press Left", "release Left"]);
        engine.quit();
    }

    #[test]
    fn test_unmapped_key_exits_layer() {
        let backend = ScriptedBackend::default();
        let (mut engine, _actuator) = engine(&backend, LayerConfig::default());
        engine.start().unwrap();
        activate(&backend, &engine);

        assert_eq!(backend.key("z", true), Decision::PassThrough);
        assert!(wait_for(Duration::from_secs(1), || engine.state() == LayerState::Normal));
        engine.stop().unwrap();
    }

    #[test]
    fn test_layer_times_out() {
        let backend = ScriptedBackend::default();
        let config = LayerConfig {
            timeout_ms: 100,
            ..Default::default()
        };
        let (mut engine, _actuator) = engine(&backend, config);
        engine.start().unwrap();
        activate(&backend, &engine);

        assert!(wait_for(Duration::from_secs(2), || engine.state() == LayerState::Normal));
        assert_eq!(backend.key("j", true), Decision::PassThrough);
    }

    #[test]
    fn test_disabled_device_does_not_activate() {
        let backend = ScriptedBackend::default();
        let mut config = LayerConfig::default();
        config.known_devices.insert(
            "093A:2510".into(),
            crate::device::KnownDevice {
                name: "Touchpad".into(),
                enabled: false,
            },
        );
        let (mut engine, _actuator) = engine(&backend, config);
        engine.start().unwrap();

        backend.sink().device_activity(DeviceId::new(0x093A, 0x2510), "Touchpad");
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(engine.state(), LayerState::Normal);

        backend.sink().device_activity(DeviceId::new(0x046D, 0xC52B), "Trackball");
        assert!(wait_for(Duration::from_secs(1), || engine.state() == LayerState::Active));
        assert_eq!(engine.registry().devices().len(), 2);
        assert_eq!(engine.export_config().known_devices.len(), 2);
    }

    #[test]
    fn test_degraded_modes_are_reported() {
        let backend = ScriptedBackend {
            deny_key_hook: true,
            deny_raw: true,
            ..Default::default()
        };
        let (mut engine, _actuator) = engine(&backend, LayerConfig::default());
        let report = engine.start().unwrap();

        assert_eq!(report.activity_mode, ActivitySourceMode::Generic);
        assert!(matches!(report.key_hook_error, Some(Error::HookUnavailable(_))));
        assert!(!report.is_complete());
        assert_eq!(engine.activity_mode(), ActivitySourceMode::Generic);
    }

    #[test]
    fn test_no_activity_source_fails_start() {
        let backend = ScriptedBackend {
            deny_raw: true,
            deny_generic: true,
            ..Default::default()
        };
        let (mut engine, _actuator) = engine(&backend, LayerConfig::default());

        assert!(matches!(engine.start(), Err(Error::NoActivitySource(_))));
        assert!(!engine.is_running());
        assert!(backend.installed.lock().unwrap().interceptor.is_none());
        assert!(matches!(engine.stop(), Err(Error::NotRunning)));
    }

    #[test]
    fn test_restart_tears_down_first() {
        let backend = ScriptedBackend::default();
        let (mut engine, _actuator) = engine(&backend, LayerConfig::default());

        engine.start().unwrap();
        engine.start().unwrap();
        engine.stop().unwrap();
        engine.start().unwrap();

        let calls = backend.calls();
        let installs = calls.iter().filter(|c| **c == "install_key_hook").count();
        let removals = calls.iter().filter(|c| **c == "remove_key_hook").count();
        // Every start removes first, plus the explicit stop.
        assert_eq!(installs, 3);
        assert_eq!(removals, 4);
        assert!(engine.is_running());
        assert!(backend.installed.lock().unwrap().raw);
    }

    #[test]
    fn test_reload_swaps_mapping() {
        let backend = ScriptedBackend::default();
        let (mut engine, actuator) = engine(&backend, LayerConfig::default());
        engine.start().unwrap();

        let mut config = LayerConfig::default();
        config.mappings.clear();
        config
            .mappings
            .insert("f".into(), "mouse_scroll_down".into());
        config.exit_on_unmapped = false;
        engine.reload(config).unwrap();

        activate(&backend, &engine);
        assert_eq!(backend.key("j", true), Decision::PassThrough);
        assert_eq!(backend.key("f", true), Decision::Suppress);
        assert_eq!(backend.key("f", false), Decision::Suppress);

        assert!(wait_for(Duration::from_secs(1), || actuator.calls().len() == 1));
        assert_eq!(actuator.calls(), vec!["scroll 0 -3"]);
        assert_eq!(engine.state(), LayerState::Active);
    }

    #[test]
    fn test_latch_and_exit() {
        let backend = ScriptedBackend::default();
        let (mut engine, _actuator) = engine(&backend, LayerConfig::default());
        engine.start().unwrap();

        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = changes.clone();
        engine
            .add_listener(move |change| sink.lock().unwrap().push(change.reason))
            .unwrap();

        engine.latch();
        assert_eq!(engine.state(), LayerState::Latched);
        engine.exit_layer();
        assert_eq!(engine.state(), LayerState::Normal);

        assert!(wait_for(Duration::from_secs(1), || changes.lock().unwrap().len() == 2));
    }
}
