//! Device source - OS-facing enumeration and event streams
//!
//! The liveness loop never talks to evdev directly. It goes through
//! [`DeviceSource`] for listing and opening devices, and reads from the opened
//! [`InputStream`] handles. [`EvdevSource`] is the production implementation
//! backed by the `evdev` crate; tests substitute in-memory fakes.

use evdev::{Device, InputEvent};
use std::collections::HashMap;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use tracing::{debug, warn};

/// Identity of an input device as reported by the OS
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawDeviceDescriptor {
    /// Device node, e.g. `/dev/input/event3`. Unique per connected instance.
    pub path: String,
    /// Product name. Empty if the device does not report one.
    pub name: String,
}

impl RawDeviceDescriptor {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }
}

// Per-device errors; never fatal for the watcher
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Failed to open device {path}: {source}")]
    OpenError { path: String, source: io::Error },

    #[error("Failed to configure device {path}: {source}")]
    ConfigureError { path: String, source: io::Error },
}

/// An open, pollable stream of raw input events.
///
/// Implementations must be non-blocking: `fetch` returns
/// `ErrorKind::WouldBlock` once nothing is pending.
pub trait InputStream: AsRawFd {
    fn fetch(&mut self) -> io::Result<Vec<InputEvent>>;
}

/// The OS device-enumeration service
pub trait DeviceSource {
    /// Lists all currently present input devices.
    fn enumerate(&mut self) -> Vec<RawDeviceDescriptor>;

    /// Opens a device for non-blocking reading.
    fn open(&mut self, descriptor: &RawDeviceDescriptor)
        -> Result<Box<dyn InputStream>, DeviceError>;

    /// Called once discovery has opened everything it wants. Sources that
    /// keep nodes open from `enumerate` drop the rest here.
    fn release_unclaimed(&mut self) {}
}

/// [`DeviceSource`] backed by `/dev/input/event*`
///
/// `evdev::enumerate` already opens every node to read its name. Those
/// devices are kept until discovery finishes, so an accepted gamepad is
/// handed over without opening its node a second time.
#[derive(Default)]
pub struct EvdevSource {
    enumerated: HashMap<String, Device>,
}

impl EvdevSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceSource for EvdevSource {
    fn enumerate(&mut self) -> Vec<RawDeviceDescriptor> {
        self.enumerated.clear();

        let mut descriptors = Vec::new();
        for (path, device) in evdev::enumerate() {
            let descriptor =
                RawDeviceDescriptor::new(path_string(&path), device.name().unwrap_or(""));
            self.enumerated
                .entry(descriptor.path.clone())
                .or_insert(device);
            descriptors.push(descriptor);
        }

        descriptors.sort_by(|a, b| a.path.cmp(&b.path));
        debug!("evdev reported {} input devices", descriptors.len());
        descriptors
    }

    fn open(
        &mut self,
        descriptor: &RawDeviceDescriptor,
    ) -> Result<Box<dyn InputStream>, DeviceError> {
        let device = match self.enumerated.remove(&descriptor.path) {
            Some(device) => device,
            None => Device::open(&descriptor.path).map_err(|source| DeviceError::OpenError {
                path: descriptor.path.clone(),
                source,
            })?,
        };

        // The multiplexer drains until WouldBlock
        device
            .set_nonblocking(true)
            .map_err(|source| DeviceError::ConfigureError {
                path: descriptor.path.clone(),
                source,
            })?;

        debug!("Opened {} ({})", descriptor.path, descriptor.name);
        Ok(Box::new(EvdevStream { device }))
    }

    fn release_unclaimed(&mut self) {
        if !self.enumerated.is_empty() {
            debug!("Closing {} unclaimed input devices", self.enumerated.len());
            self.enumerated.clear();
        }
    }
}

struct EvdevStream {
    device: Device,
}

impl AsRawFd for EvdevStream {
    fn as_raw_fd(&self) -> RawFd {
        self.device.as_raw_fd()
    }
}

impl InputStream for EvdevStream {
    fn fetch(&mut self) -> io::Result<Vec<InputEvent>> {
        let events = self.device.fetch_events()?;
        Ok(events.collect())
    }
}

fn path_string(path: &Path) -> String {
    match path.to_str() {
        Some(s) => s.to_string(),
        None => {
            warn!("Device path is not valid UTF-8: {}", path.display());
            path.to_string_lossy().into_owned()
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_node_fails_to_open() {
        let mut source = EvdevSource::new();
        let descriptor =
            RawDeviceDescriptor::new("/dev/input/padwatch-missing", "Stadia Controller");

        let result = source.open(&descriptor);
        assert!(matches!(
            result,
            Err(DeviceError::OpenError { ref path, .. }) if path == "/dev/input/padwatch-missing"
        ));
    }

    #[test]
    fn release_drops_unclaimed_devices() {
        let mut source = EvdevSource::new();
        source.enumerate();
        source.release_unclaimed();
        assert!(source.enumerated.is_empty());
    }
}
