//! Owned background threads with a cooperative, bounded shutdown.

use crate::error::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often long-lived loops check their stop flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long `stop()` waits for a thread before detaching it.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Granularity of the wait in `stop()`.
const STOP_POLL: Duration = Duration::from_millis(2);

/// A named background thread driven by a shared `running` flag.
///
/// The body must return soon after the flag goes false. Stopping waits at
/// most the given timeout; a thread that overruns it is detached.
pub struct ServiceThread {
    name: String,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ServiceThread {
    /// Spawn `body` on a new thread named `name`.
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(flag))
            .map_err(|e| Error::ThreadError(format!("failed to spawn {}: {}", name, e)))?;

        Ok(Self {
            name: name.to_string(),
            running,
            handle: Some(handle),
        })
    }

    /// Check if the thread body is still expected to run.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Ask the body to return without waiting for it.
    pub fn signal_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Stop the thread, waiting at most `timeout`.
    ///
    /// Returns `true` if the thread exited in time.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.signal_stop();
        let Some(handle) = self.handle.take() else {
            return true;
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            let now = Instant::now();
            if now >= deadline {
                log::warn!(
                    "{} thread did not stop within {:?}; detaching it",
                    self.name,
                    timeout
                );
                return false;
            }
            thread::sleep(STOP_POLL.min(deadline - now));
        }

        if handle.join().is_err() {
            log::error!("{} thread panicked", self.name);
        }
        true
    }
}

impl Drop for ServiceThread {
    fn drop(&mut self) {
        self.stop(STOP_TIMEOUT);
    }
}
