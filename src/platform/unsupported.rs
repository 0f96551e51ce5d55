//! Stand-ins for targets without a native backend.

use crate::activity::ActivitySink;
use crate::engine::Backend;
use crate::error::{Error, Result};
use crate::pipeline::KeyInterceptor;
use crate::worker::PointerActuator;
use std::sync::Arc;

fn unsupported<T>() -> Result<T> {
    Err(Error::NotSupported(
        "no input backend for this platform; on Linux enable the 'evdev' feature".into(),
    ))
}

pub fn native_actuator() -> Result<Arc<dyn PointerActuator>> {
    unsupported()
}

/// A backend that fails every install.
#[derive(Debug, Default)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for NativeBackend {
    fn install_key_hook(&mut self, _interceptor: Arc<KeyInterceptor>) -> Result<()> {
        unsupported()
    }

    fn remove_key_hook(&mut self) {}

    fn start_raw_activity(&mut self, _sink: ActivitySink) -> Result<()> {
        unsupported()
    }

    fn start_generic_activity(&mut self, _sink: ActivitySink) -> Result<()> {
        unsupported()
    }

    fn stop_activity(&mut self) {}
}
