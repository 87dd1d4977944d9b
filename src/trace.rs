//! Observation of matcher entry and exit.
//!
//! A [`Tracer`] is handed to a strategy when it is built. It sees every
//! attempt but cannot influence its outcome.

use std::sync::Mutex;

use crate::matcher::MatchResult;

pub trait Tracer: Send + Sync {
    fn enter(&self, label: &str, position: usize, end: usize);
    fn exit(&self, label: &str, result: &MatchResult);
}

/// Forwards events to the `log` facade at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn enter(&self, label: &str, position: usize, end: usize) {
        log::debug!(target: "crunching::trace", "START {label} start={position} end={end}");
    }

    fn exit(&self, label: &str, result: &MatchResult) {
        match result {
            Ok(success) => log::debug!(
                target: "crunching::trace",
                "SUCCESS {label} position={} result={}",
                success.position,
                success.value
            ),
            Err(no_match) => log::debug!(target: "crunching::trace", "FAILED {label} at={}", no_match.position),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Enter { label: String, position: usize },
    Success { label: String, position: usize },
    Failure { label: String, position: usize },
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    fn push(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Tracer for Recorder {
    fn enter(&self, label: &str, position: usize, _end: usize) {
        self.push(Event::Enter { label: label.to_owned(), position });
    }

    fn exit(&self, label: &str, result: &MatchResult) {
        let label = label.to_owned();
        self.push(match result {
            Ok(success) => Event::Success { label, position: success.position },
            Err(no_match) => Event::Failure { label, position: no_match.position },
        });
    }
}
