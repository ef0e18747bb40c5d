//! Raw evdev event decoding
//!
//! Turns `evdev::InputEvent`s into [`SemanticEvent`]s. Only buttons, the six
//! analog stick/trigger axes and the HAT0 d-pad axes are decoded; everything
//! else a controller reports (sync frames, misc scancodes, extra axes) is
//! dropped without comment.

use chrono::{DateTime, Local};
use evdev::{AbsoluteAxisCode, EventSummary, InputEvent, KeyCode};
use std::fmt;

// Kernel key state values
const KEY_RELEASED: i32 = 0;
const KEY_PRESSED: i32 = 1;

/// Stick and trigger axes reported with their raw value
const ANALOG_AXES: [AbsoluteAxisCode; 6] = [
    AbsoluteAxisCode::ABS_X,
    AbsoluteAxisCode::ABS_Y,
    AbsoluteAxisCode::ABS_RX,
    AbsoluteAxisCode::ABS_RY,
    AbsoluteAxisCode::ABS_Z,
    AbsoluteAxisCode::ABS_RZ,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DPadAxis {
    X,
    Y,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DPadDirection {
    Left,
    Right,
    Up,
    Down,
    Center,
}

impl DPadDirection {
    /// Maps a HAT0 value to a direction. Anything but -1/1 is center.
    pub fn from_hat(axis: DPadAxis, value: i32) -> Self {
        match (axis, value) {
            (DPadAxis::X, 1) => DPadDirection::Right,
            (DPadAxis::X, -1) => DPadDirection::Left,
            (DPadAxis::Y, 1) => DPadDirection::Down,
            (DPadAxis::Y, -1) => DPadDirection::Up,
            _ => DPadDirection::Center,
        }
    }
}

/// A decoded gamepad action
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SemanticEvent {
    Key { code: KeyCode, pressed: bool },
    Axis { axis: AbsoluteAxisCode, value: i32 },
    DPad { axis: DPadAxis, direction: DPadDirection },
}

impl fmt::Display for SemanticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticEvent::Key { code, pressed } => {
                let verb = if *pressed { "pressed" } else { "released" };
                write!(f, "{:?} {}", code, verb)
            }
            SemanticEvent::Axis { axis, value } => write!(f, "{:?} moved to {}", axis, value),
            SemanticEvent::DPad { axis, direction } => {
                write!(f, "D-pad {:?} moved to {:?}", axis, direction)
            }
        }
    }
}

/// A semantic event tagged with the device it came from
#[derive(Clone, Debug)]
pub struct DecodedEvent {
    pub path: String,
    pub event: SemanticEvent,
    pub timestamp: DateTime<Local>,
}

impl DecodedEvent {
    pub fn new(path: &str, event: SemanticEvent) -> Self {
        Self {
            path: path.to_string(),
            event,
            timestamp: Local::now(),
        }
    }
}

impl fmt::Display for DecodedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.path, self.event)
    }
}

/// Decodes one raw event, or `None` if it is not one we report.
pub fn decode(event: &InputEvent) -> Option<SemanticEvent> {
    match event.destructure() {
        EventSummary::Key(_, code, KEY_PRESSED) => Some(SemanticEvent::Key {
            code,
            pressed: true,
        }),
        EventSummary::Key(_, code, KEY_RELEASED) => Some(SemanticEvent::Key {
            code,
            pressed: false,
        }),
        // Autorepeat (2) carries no new state
        EventSummary::Key(..) => None,
        EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_HAT0X, value) => {
            Some(SemanticEvent::DPad {
                axis: DPadAxis::X,
                direction: DPadDirection::from_hat(DPadAxis::X, value),
            })
        }
        EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_HAT0Y, value) => {
            Some(SemanticEvent::DPad {
                axis: DPadAxis::Y,
                direction: DPadDirection::from_hat(DPadAxis::Y, value),
            })
        }
        EventSummary::AbsoluteAxis(_, axis, value) if ANALOG_AXES.contains(&axis) => {
            Some(SemanticEvent::Axis { axis, value })
        }
        _ => None,
    }
}
