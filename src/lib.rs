//! # mouselayer
//!
//! Turns a block of keyboard keys into mouse buttons and scroll notches
//! while a pointing device is in use.
//!
//! Moving a configured mouse or trackball activates the layer. While it is
//! active, mapped keys (by default `j`/`k` for left/right click and
//! `u`/`i` for scrolling) are swallowed and replayed as pointer actions.
//! The layer drops back to normal after a period without pointer activity,
//! when an unmapped key is typed, or on request. It can also be latched so
//! that it stays on until explicitly exited.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mouselayer::{Engine, LayerConfig, config_path};
//!
//! let config = LayerConfig::load(&config_path()?)?;
//! let mut engine = Engine::new(config)?;
//!
//! engine.add_listener(|change| {
//!     println!("{} -> {} ({})", change.old_state, change.new_state, change.reason);
//! })?;
//!
//! let report = engine.start()?;
//! if !report.is_complete() {
//!     eprintln!("running degraded: {:?}", report);
//! }
//! # Ok::<(), mouselayer::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`device`]: stable device identities and the enabled/disabled policy.
//! - [`activity`]: turns platform pointer reports into queue entries.
//! - [`pipeline`]: the synchronous keep-or-swallow decision made inside the
//!   keyboard hook.
//! - [`worker`]: a single background thread that actuates the pointer and
//!   feeds the layer.
//! - [`layer`]: the NORMAL / ACTIVE / LATCHED state machine and its timer.
//! - [`engine`]: start, stop, reload and quit.
//!
//! Platform hooks never block: they classify, enqueue and return.

pub mod activity;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod event;
pub mod keycode;
pub mod layer;
pub mod pipeline;
pub mod service;
pub mod worker;

mod platform;

// Re-exports
pub use activity::{ActivitySink, ActivitySourceMode};
pub use config::{DEFAULT_TIMEOUT_MS, LayerConfig, config_path};
pub use device::{DeviceId, DeviceIdentity, DeviceRegistry, KnownDevice};
pub use engine::{Backend, Engine, StartReport};
pub use error::{Error, Result};
pub use event::{Button, Decision, MouseAction, QueuedAction};
pub use keycode::Key;
pub use layer::{ChangeReason, LayerState, LayerStateMachine, ListenerId, StateChange};
pub use pipeline::{KeyInterceptor, KeyMapping};
pub use worker::{ActionHandler, ActionSender, ActionWorker, PointerActuator, action_queue};

// Native backend for the current platform
pub use platform::{NativeBackend, native_actuator};
