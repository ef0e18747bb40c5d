//! Controller subsystem for gamepad discovery and event reading
//!
//! Implements the device liveness loop:
//!
//! 1. [`classifier`] - Decides which input devices are gamepads
//! 2. [`registry`] - Discovers, opens and owns the live gamepad handles
//! 3. [`multiplexer`] - Waits on all handles at once and drains ready ones
//! 4. [`decoder`] - Turns raw evdev events into semantic actions
//! 5. [`watcher`] - Ties it together and recovers from hotplug
//!
//! # Architecture
//!
//! ```text
//! evdev ──► Registry ──► Multiplexer ──► Decoder ──► EventSink (stdout)
//!             ▲              │
//!             └── failed ────┘
//! ```
//!
//! Everything runs on one dedicated thread; `poll(2)` lets it watch any
//! number of controllers without a thread per device.

pub mod classifier;
pub mod decoder;
pub mod device;
pub mod multiplexer;
pub mod output;
pub mod registry;
pub mod watcher;

// Types used outside the controller module
pub use crate::controller::classifier::ClassifierConfig;
pub use crate::controller::watcher::{WatcherHandle, WatcherSettings};
