//! A polled set of `/dev/input/event*` nodes.

use crate::error::{Error, Result};
use evdev::Device;
use std::fs;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// How often new nodes are looked for.
pub(super) const RESCAN_INTERVAL: Duration = Duration::from_secs(2);

/// Prefix of the virtual devices this crate creates; never read back.
pub(super) const VIRTUAL_DEVICE_PREFIX: &str = "mouselayer";

/// Open input nodes selected by a filter.
pub(super) struct NodeSet {
    nodes: Vec<(PathBuf, Device)>,
    poll_fds: Vec<libc::pollfd>,
    last_scan: Option<Instant>,
}

impl NodeSet {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            poll_fds: Vec::new(),
            last_scan: None,
        }
    }

    /// Check if the rescan interval has elapsed.
    pub fn rescan_due(&self) -> bool {
        self.last_scan
            .is_none_or(|last| last.elapsed() >= RESCAN_INTERVAL)
    }

    /// Open nodes not yet in the set that pass `accept`.
    ///
    /// `accept` may also prepare the device (e.g. grab it); returning
    /// `false` drops it. Returns the number of nodes added.
    pub fn rescan(&mut self, mut accept: impl FnMut(&mut Device) -> bool) -> Result<usize> {
        self.last_scan = Some(Instant::now());

        let dir = fs::read_dir("/dev/input").map_err(|e| {
            Error::DeviceEnumeration(format!(
                "Cannot access /dev/input: {}. Make sure you're in the 'input' group.",
                e
            ))
        })?;

        let mut added = 0;
        for entry in dir.flatten() {
            let path = entry.path();
            let is_event_node = path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with("event"));
            if !is_event_node || self.nodes.iter().any(|(known, _)| *known == path) {
                continue;
            }

            match Device::open(&path) {
                Ok(mut device) => {
                    if device
                        .name()
                        .is_some_and(|name| name.starts_with(VIRTUAL_DEVICE_PREFIX))
                    {
                        continue;
                    }
                    if accept(&mut device) {
                        log::debug!(
                            "Opened {} ({})",
                            path.display(),
                            device.name().unwrap_or("unnamed")
                        );
                        self.nodes.push((path, device));
                        added += 1;
                    }
                }
                Err(e) => {
                    log::debug!("Failed to open {}: {}", path.display(), e);
                }
            }
        }

        if added > 0 {
            self.rebuild_poll_fds();
        }
        Ok(added)
    }

    fn rebuild_poll_fds(&mut self) {
        self.poll_fds = self
            .nodes
            .iter()
            .map(|(_, d)| libc::pollfd {
                fd: d.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();
    }

    /// Wait up to `timeout` and return the indices of readable nodes.
    pub fn poll(&mut self, timeout: Duration) -> io::Result<Vec<usize>> {
        if self.poll_fds.is_empty() {
            std::thread::sleep(timeout);
            return Ok(Vec::new());
        }

        let ret = unsafe {
            libc::poll(
                self.poll_fds.as_mut_ptr(),
                self.poll_fds.len() as _,
                timeout.as_millis() as _,
            )
        };

        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(err);
        }

        Ok(self
            .poll_fds
            .iter()
            .enumerate()
            .filter(|(_, pfd)| pfd.revents & (libc::POLLIN | libc::POLLERR | libc::POLLHUP) != 0)
            .map(|(i, _)| i)
            .collect())
    }

    pub fn device_mut(&mut self, index: usize) -> Option<&mut Device> {
        self.nodes.get_mut(index).map(|(_, d)| d)
    }

    /// Drop nodes whose device went away.
    pub fn remove(&mut self, mut indices: Vec<usize>) -> Vec<Device> {
        indices.sort_unstable();
        indices.dedup();
        let mut removed = Vec::new();
        for index in indices.into_iter().rev() {
            if index < self.nodes.len() {
                let (path, device) = self.nodes.remove(index);
                log::info!("Input device {} disconnected", path.display());
                removed.push(device);
            }
        }
        self.rebuild_poll_fds();
        removed
    }

    /// Take every open device out of the set.
    pub fn drain(&mut self) -> Vec<Device> {
        self.poll_fds.clear();
        self.nodes.drain(..).map(|(_, d)| d).collect()
    }
}
