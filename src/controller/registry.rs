//! Device registry
//!
//! Owns the set of live gamepad handles. Discovery rebuilds the set from the
//! device source; the watcher evicts handles whose reads fail.

use super::classifier::GamepadClassifier;
use super::device::{DeviceSource, InputStream, RawDeviceDescriptor};
use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::io;
use tracing::{debug, warn};

/// An open handle to a device that passed classification
pub struct LiveDeviceHandle {
    descriptor: RawDeviceDescriptor,
    stream: Box<dyn InputStream>,
}

impl LiveDeviceHandle {
    pub fn new(descriptor: RawDeviceDescriptor, stream: Box<dyn InputStream>) -> Self {
        Self { descriptor, stream }
    }

    pub fn path(&self) -> &str {
        &self.descriptor.path
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn stream(&self) -> &dyn InputStream {
        self.stream.as_ref()
    }

    pub fn fetch(&mut self) -> io::Result<Vec<evdev::InputEvent>> {
        self.stream.fetch()
    }
}

impl fmt::Debug for LiveDeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveDeviceHandle")
            .field("path", &self.descriptor.path)
            .field("name", &self.descriptor.name)
            .finish()
    }
}

/// Live handles keyed by device path, iterated in path order
#[derive(Debug, Default)]
pub struct LiveDeviceSet {
    devices: BTreeMap<String, LiveDeviceHandle>,
}

impl LiveDeviceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handle. Returns false, and drops `handle`, if the path is
    /// already present.
    pub fn insert(&mut self, handle: LiveDeviceHandle) -> bool {
        match self.devices.entry(handle.path().to_string()) {
            btree_map::Entry::Vacant(entry) => {
                entry.insert(handle);
                true
            }
            btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn remove(&mut self, path: &str) -> Option<LiveDeviceHandle> {
        self.devices.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.devices.contains_key(path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut LiveDeviceHandle> {
        self.devices.get_mut(path)
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[cfg(test)]
    pub fn paths(&self) -> Vec<&str> {
        self.devices.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiveDeviceHandle> {
        self.devices.values()
    }
}

impl fmt::Display for LiveDeviceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .iter()
            .map(|handle| format!("{} ({})", handle.path(), handle.name()))
            .collect();
        write!(f, "[{}]", entries.join(", "))
    }
}

/// Discovers and opens supported gamepads
pub struct DeviceRegistry {
    source: Box<dyn DeviceSource>,
    classifier: GamepadClassifier,
}

impl DeviceRegistry {
    pub fn new(source: Box<dyn DeviceSource>, classifier: GamepadClassifier) -> Self {
        Self { source, classifier }
    }

    /// Enumerates all input devices and opens the ones the classifier accepts.
    ///
    /// Devices that pass classification but cannot be opened are skipped.
    pub fn discover_devices(&mut self) -> LiveDeviceSet {
        let descriptors = self.source.enumerate();
        let names: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
        debug!("Found devices: {:?}", names);

        let classifier = &self.classifier;
        let mut devices = LiveDeviceSet::new();
        for descriptor in descriptors
            .iter()
            .filter(|d| classifier.is_supported_gamepad(&d.name))
        {
            if devices.contains(&descriptor.path) {
                warn!("Device {} reported twice, ignoring duplicate", descriptor.path);
                continue;
            }

            match self.source.open(descriptor) {
                Ok(stream) => {
                    devices.insert(LiveDeviceHandle::new(descriptor.clone(), stream));
                }
                Err(e) => warn!("Skipping gamepad {}: {}", descriptor.name, e),
            }
        }

        self.source.release_unclaimed();

        debug!("Gamepads: {}", devices);
        devices
    }
}
