//! Event multiplexer
//!
//! One round = block in `poll(2)` on every live device until at least one is
//! readable, then drain each ready device and hand decoded events to the sink
//! in arrival order. Devices whose reads fail are reported back; the
//! multiplexer never changes set membership itself.

use super::decoder::{decode, DecodedEvent};
use super::output::EventSink;
use super::registry::{LiveDeviceHandle, LiveDeviceSet};
use std::io;
use tracing::{debug, warn};

// Anything but plain POLLIN means the device is gone or broken
const HANGUP_EVENTS: libc::c_short = libc::POLLHUP | libc::POLLERR | libc::POLLNVAL;

#[derive(Debug, thiserror::Error)]
pub enum MultiplexerError {
    #[error("Readiness wait failed: {0}")]
    PollError(#[source] io::Error),
}

/// Outcome of one dispatch round
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Devices that had pending input or hung up, in path order
    pub ready: Vec<String>,
    /// Devices whose read failed; the caller must evict them
    pub failed: Vec<String>,
    /// Number of semantic events emitted this round
    pub decoded: usize,
}

#[derive(Debug, Default)]
pub struct EventMultiplexer {
    rounds: u64,
}

struct Readiness {
    path: String,
    hung_up: bool,
}

impl EventMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of readiness waits performed so far
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Waits without timeout for input on `devices` and dispatches it.
    ///
    /// A signal interrupting the wait yields an empty report.
    pub fn wait_and_dispatch(
        &mut self,
        devices: &mut LiveDeviceSet,
        sink: &mut dyn EventSink,
    ) -> Result<DispatchReport, MultiplexerError> {
        self.rounds += 1;

        let mut report = DispatchReport::default();
        let ready = match wait_ready(devices) {
            Ok(ready) => ready,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                debug!("Readiness wait interrupted");
                return Ok(report);
            }
            Err(e) => return Err(MultiplexerError::PollError(e)),
        };

        for Readiness { path, hung_up } in ready {
            let Some(handle) = devices.get_mut(&path) else {
                continue;
            };

            match drain(handle, sink) {
                Ok(decoded) if hung_up => {
                    warn!("Device {} hung up after {} events", path, decoded);
                    report.decoded += decoded;
                    report.failed.push(path.clone());
                }
                Ok(decoded) => {
                    debug!("Drained {} events from {}", decoded, path);
                    report.decoded += decoded;
                }
                Err(e) => {
                    warn!("Read from {} failed: {}", path, e);
                    report.failed.push(path.clone());
                }
            }
            report.ready.push(path);
        }

        Ok(report)
    }
}

fn wait_ready(devices: &LiveDeviceSet) -> io::Result<Vec<Readiness>> {
    let mut fds: Vec<libc::pollfd> = devices
        .iter()
        .map(|handle| libc::pollfd {
            fd: handle.stream().as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();

    // SAFETY: `fds` is a valid, exclusively borrowed array of `fds.len()`
    // pollfd structs for the duration of the call.
    let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(devices
        .iter()
        .zip(fds.iter())
        .filter(|(_, fd)| fd.revents & (libc::POLLIN | HANGUP_EVENTS) != 0)
        .map(|(handle, fd)| Readiness {
            path: handle.path().to_string(),
            hung_up: fd.revents & HANGUP_EVENTS != 0,
        })
        .collect())
}

// Reads until the device has nothing buffered
fn drain(handle: &mut LiveDeviceHandle, sink: &mut dyn EventSink) -> io::Result<usize> {
    let mut decoded = 0;
    loop {
        match handle.fetch() {
            Ok(events) if events.is_empty() => return Ok(decoded),
            Ok(events) => {
                for raw in &events {
                    if let Some(event) = decode(raw) {
                        sink.emit(&DecodedEvent::new(handle.path(), event));
                        decoded += 1;
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(decoded),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
