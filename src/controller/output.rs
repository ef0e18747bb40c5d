//! Event output
//!
//! Decoded events leave the watcher through an [`EventSink`]. The console
//! sink prints one `"<path> - <event>"` line per event, which is the only
//! user-visible artifact of a run.

use super::decoder::DecodedEvent;
use std::io::{self, Write};
use tracing::{debug, error};

pub trait EventSink {
    fn emit(&mut self, event: &DecodedEvent);
}

/// Writes each event as a line of text
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> EventSink for ConsoleSink<W> {
    fn emit(&mut self, event: &DecodedEvent) {
        debug!(
            "Decoded {:?} from {} at {}",
            event.event,
            event.path,
            event.timestamp.format("%H:%M:%S.%3f")
        );

        // Flush per line so output is not held back while the watcher blocks
        if let Err(e) = writeln!(self.out, "{}", event).and_then(|_| self.out.flush()) {
            error!("Failed to write event: {}", e);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::controller::decoder::{DPadAxis, DPadDirection, SemanticEvent};
    use evdev::KeyCode;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Sink that keeps every event for later inspection
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSink {
        pub events: Rc<RefCell<Vec<DecodedEvent>>>,
    }

    impl RecordingSink {
        pub fn lines(&self) -> Vec<String> {
            self.events.borrow().iter().map(|e| e.to_string()).collect()
        }
    }

    impl EventSink for RecordingSink {
        fn emit(&mut self, event: &DecodedEvent) {
            self.events.borrow_mut().push(event.clone());
        }
    }

    #[test]
    fn console_sink_writes_one_line_per_event() {
        let mut sink = ConsoleSink::new(Vec::new());
        sink.emit(&DecodedEvent::new(
            "/dev/input/event3",
            SemanticEvent::Key {
                code: KeyCode::BTN_TL,
                pressed: true,
            },
        ));
        sink.emit(&DecodedEvent::new(
            "/dev/input/event4",
            SemanticEvent::DPad {
                axis: DPadAxis::X,
                direction: DPadDirection::Center,
            },
        ));

        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            text,
            "/dev/input/event3 - BTN_TL pressed\n/dev/input/event4 - D-pad X moved to Center\n"
        );
    }
}
