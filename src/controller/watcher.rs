//! Liveness loop
//!
//! The watcher alternates between two states:
//!
//! ```text
//!            discovery finds gamepads
//! Searching ─────────────────────────► Watching
//!     ▲  │ sleep backoff, rediscover       │ poll, dispatch, evict failed
//!     │  └──────────┘                      │
//!     └────────────────────────────────────┘
//!              last device evicted
//! ```
//!
//! It runs for the lifetime of the process. Device churn never ends the loop;
//! only a failure of the readiness wait itself does.

use super::classifier::{ClassifierConfig, GamepadClassifier};
use super::device::{DeviceSource, EvdevSource};
use super::multiplexer::{EventMultiplexer, MultiplexerError};
use super::output::{ConsoleSink, EventSink};
use super::registry::{DeviceRegistry, LiveDeviceSet};
use statum::{machine, state};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

// Watcher settings
#[derive(Clone, Debug, PartialEq)]
pub struct WatcherSettings {
    /// Pause between discovery attempts while no gamepad is present
    pub backoff: Duration,
    pub classifier: ClassifierConfig,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(5),
            classifier: ClassifierConfig::default(),
        }
    }
}

// Watcher errors
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("Multiplexer error: {0}")]
    MultiplexerError(#[from] MultiplexerError),

    #[error("Failed to start watcher thread: {0}")]
    SpawnError(#[source] std::io::Error),

    #[error("Watcher thread stopped: {0}")]
    ThreadError(String),
}

#[state]
#[derive(Debug, Clone)]
pub enum WatchState {
    Searching,
    Watching,
}

#[machine]
pub struct DeviceWatcher<S: WatchState> {
    // Discovery and classification
    registry: DeviceRegistry,

    // Readiness wait and dispatch
    multiplexer: EventMultiplexer,

    // Live handles, owned only by the watcher
    devices: LiveDeviceSet,

    // Where decoded events go
    sink: Box<dyn EventSink>,

    settings: WatcherSettings,

    // Backoff sleep, replaceable for tests
    sleeper: Box<dyn FnMut(Duration)>,
}

/// The watcher in whichever state it is currently in
pub enum Phase {
    Searching(DeviceWatcher<Searching>),
    Watching(DeviceWatcher<Watching>),
}

impl Phase {
    /// Runs one iteration of the loop.
    pub fn step(self) -> Result<Phase, WatcherError> {
        match self {
            Phase::Searching(watcher) => Ok(watcher.search()),
            Phase::Watching(watcher) => watcher.watch(),
        }
    }

    #[cfg(test)]
    pub fn devices(&self) -> &LiveDeviceSet {
        match self {
            Phase::Searching(watcher) => watcher.devices(),
            Phase::Watching(watcher) => watcher.devices(),
        }
    }
}

// Inspection helpers for tests, available in all states
#[cfg(test)]
impl<S: WatchState> DeviceWatcher<S> {
    pub fn devices(&self) -> &LiveDeviceSet {
        &self.devices
    }

    pub fn multiplexer(&self) -> &EventMultiplexer {
        &self.multiplexer
    }
}

impl DeviceWatcher<Searching> {
    pub fn create(
        source: Box<dyn DeviceSource>,
        sink: Box<dyn EventSink>,
        settings: WatcherSettings,
    ) -> Self {
        debug!("Creating device watcher with settings: {:?}", settings);
        let registry = DeviceRegistry::new(source, GamepadClassifier::new(&settings.classifier));

        Self::new(
            registry,
            EventMultiplexer::new(),
            LiveDeviceSet::new(),
            sink,
            settings,
            Box::new(std::thread::sleep),
        )
    }

    #[cfg(test)]
    pub fn with_sleeper(mut self, sleeper: impl FnMut(Duration) + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Initial discovery, without waiting first.
    pub fn start(mut self) -> Phase {
        info!("Starting device watcher");
        self.devices = self.registry.discover_devices();
        self.settle()
    }

    /// Sleeps for the backoff interval and discovers again.
    pub fn search(mut self) -> Phase {
        info!("No gamepads found. Waiting for gamepads to be connected...");
        (self.sleeper)(self.settings.backoff);
        self.devices = self.registry.discover_devices();
        self.settle()
    }

    fn settle(self) -> Phase {
        if self.devices.is_empty() {
            return Phase::Searching(self);
        }

        info!("Watching {} gamepad(s): {}", self.devices.len(), self.devices);
        Phase::Watching(self.transition())
    }
}

impl DeviceWatcher<Watching> {
    /// One readiness round. Failed devices are evicted here.
    pub fn watch(mut self) -> Result<Phase, WatcherError> {
        debug!("Waiting for events from devices: {}", self.devices);
        let report = self
            .multiplexer
            .wait_and_dispatch(&mut self.devices, self.sink.as_mut())?;
        debug!(
            "Round {}: {} events from {:?}",
            self.multiplexer.rounds(),
            report.decoded,
            report.ready
        );

        if report.failed.is_empty() {
            return Ok(Phase::Watching(self));
        }

        for path in &report.failed {
            if let Some(handle) = self.devices.remove(path) {
                warn!("Gamepad {} ({}) disconnected", path, handle.name());
            }
        }

        if self.devices.is_empty() {
            info!("Lost all gamepads");
            return Ok(Phase::Searching(self.transition()));
        }

        info!("Still watching: {}", self.devices);
        Ok(Phase::Watching(self))
    }
}

/// Runs the watcher until the readiness wait fails.
pub fn run(watcher: DeviceWatcher<Searching>) -> Result<Infallible, WatcherError> {
    let mut phase = watcher.start();
    loop {
        phase = phase.step()?;
    }
}

// Public interface for starting the watcher on its own thread
pub struct WatcherHandle {
    stopped: oneshot::Receiver<WatcherError>,
}

impl WatcherHandle {
    /// Starts the evdev-backed watcher on a dedicated thread.
    ///
    /// The loop blocks in `poll(2)`, so it does not run on the async runtime.
    pub fn spawn(settings: WatcherSettings) -> Result<Self, WatcherError> {
        info!("Spawning device watcher with settings: {:?}", settings);
        let (stopped_tx, stopped_rx) = oneshot::channel();

        let thread = std::thread::Builder::new()
            .name("padwatch-watcher".to_string())
            .spawn(move || {
                let watcher = DeviceWatcher::create(
                    Box::new(EvdevSource::new()),
                    Box::new(ConsoleSink::stdout()),
                    settings,
                );

                let e = match run(watcher) {
                    Ok(never) => match never {},
                    Err(e) => e,
                };
                error!("Device watcher terminated: {}", e);
                if stopped_tx.send(e).is_err() {
                    debug!("Nobody is waiting for the watcher result");
                }
            })
            .map_err(WatcherError::SpawnError)?;

        debug!("Watcher thread started: {:?}", thread.thread().name());
        Ok(Self {
            stopped: stopped_rx,
        })
    }

    /// Resolves when the watcher thread stops.
    pub async fn stopped(self) -> WatcherError {
        match self.stopped.await {
            Ok(e) => e,
            Err(_) => WatcherError::ThreadError("watcher thread exited without a result".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::decoder::tests::{abs, key};
    use crate::controller::device::fake::FakeSource;
    use crate::controller::output::tests::RecordingSink;
    use evdev::{AbsoluteAxisCode, KeyCode};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Harness {
        source: FakeSource,
        sink: RecordingSink,
        sleeps: Rc<RefCell<Vec<Duration>>>,
    }

    fn watcher(devices: &[(&str, &str)]) -> (Harness, DeviceWatcher<Searching>) {
        let harness = Harness {
            source: FakeSource::with_devices(devices),
            sink: RecordingSink::default(),
            sleeps: Rc::new(RefCell::new(Vec::new())),
        };

        let sleeps = harness.sleeps.clone();
        let watcher = DeviceWatcher::create(
            Box::new(harness.source.clone()),
            Box::new(harness.sink.clone()),
            WatcherSettings::default(),
        )
        .with_sleeper(move |d| sleeps.borrow_mut().push(d));

        (harness, watcher)
    }

    fn is_searching(phase: &Phase) -> bool {
        matches!(phase, Phase::Searching(_))
    }

    #[test]
    fn empty_set_backs_off_instead_of_polling() {
        let (harness, watcher) = watcher(&[("/dev/input/event1", "Power Button")]);

        let phase = watcher.start();
        assert!(is_searching(&phase));
        assert_eq!(harness.source.enumerate_calls(), 1);

        let phase = phase.step().unwrap();
        let phase = phase.step().unwrap();
        assert!(is_searching(&phase));
        assert_eq!(harness.source.enumerate_calls(), 3);
        assert_eq!(
            *harness.sleeps.borrow(),
            vec![Duration::from_secs(5), Duration::from_secs(5)]
        );

        let Phase::Searching(watcher) = phase else {
            panic!("expected searching state");
        };
        assert_eq!(watcher.multiplexer().rounds(), 0);
    }

    #[test]
    fn hotplugged_gamepad_is_picked_up() {
        let (harness, watcher) = watcher(&[]);

        let phase = watcher.start();
        assert!(is_searching(&phase));

        harness.source.plug("/dev/input/event9", "Stadia Controller");
        let phase = phase.step().unwrap();
        assert!(!is_searching(&phase));
        assert_eq!(phase.devices().paths(), vec!["/dev/input/event9"]);
    }

    #[test]
    fn discovery_ignores_auxiliary_devices() {
        let (_harness, watcher) = watcher(&[
            ("/dev/input/event3", "Stadia Controller"),
            ("/dev/input/event5", "Wireless Controller Touchpad"),
        ]);

        let phase = watcher.start();
        assert!(matches!(phase, Phase::Watching(_)));
        assert_eq!(phase.devices().paths(), vec!["/dev/input/event3"]);
    }

    #[test]
    fn failed_device_is_evicted_and_others_keep_polling() {
        let (harness, watcher) = watcher(&[
            ("/dev/input/event3", "Stadia Controller"),
            ("/dev/input/event4", "Wireless Controller"),
        ]);
        let phase = watcher.start();

        harness.source.unplug("/dev/input/event3");
        harness
            .source
            .push_events("/dev/input/event4", &[key(KeyCode::BTN_TL, 1)]);
        let phase = phase.step().unwrap();
        assert!(matches!(phase, Phase::Watching(_)));
        assert_eq!(phase.devices().paths(), vec!["/dev/input/event4"]);

        // The survivor is polled in the next round
        harness.source.push_events(
            "/dev/input/event4",
            &[abs(AbsoluteAxisCode::ABS_HAT0Y, -1)],
        );
        let phase = phase.step().unwrap();
        assert_eq!(phase.devices().paths(), vec!["/dev/input/event4"]);
        assert_eq!(
            harness.sink.lines(),
            vec![
                "/dev/input/event4 - BTN_TL pressed",
                "/dev/input/event4 - D-pad Y moved to Up",
            ]
        );
        assert!(harness.sleeps.borrow().is_empty());
    }

    #[test]
    fn losing_every_device_returns_to_searching() {
        let (harness, watcher) = watcher(&[
            ("/dev/input/event3", "Stadia Controller"),
            ("/dev/input/event4", "Wireless Controller"),
        ]);
        let phase = watcher.start();

        harness.source.unplug("/dev/input/event3");
        harness.source.unplug("/dev/input/event4");
        let phase = phase.step().unwrap();
        assert!(is_searching(&phase));
        assert!(phase.devices().is_empty());

        // Replug: the next search rediscovers it after one backoff
        harness.source.plug("/dev/input/event4", "Wireless Controller");
        let phase = phase.step().unwrap();
        assert_eq!(phase.devices().paths(), vec!["/dev/input/event4"]);
        assert_eq!(harness.sleeps.borrow().len(), 1);
    }

    #[test]
    fn custom_backoff_is_used() {
        let sleeps = Rc::new(RefCell::new(Vec::new()));
        let recorded = sleeps.clone();
        let settings = WatcherSettings {
            backoff: Duration::from_millis(250),
            ..WatcherSettings::default()
        };
        let watcher = DeviceWatcher::create(
            Box::new(FakeSource::default()),
            Box::new(RecordingSink::default()),
            settings,
        )
        .with_sleeper(move |d| recorded.borrow_mut().push(d));

        let phase = watcher.start().step().unwrap();
        assert!(is_searching(&phase));
        assert_eq!(*sleeps.borrow(), vec![Duration::from_millis(250)]);
    }
}
