use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::frame::Frame;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warn,
}

/// One diagnostic record.
///
/// `kind` is a stable dotted tag (`"feature.skipped"`, `"tracking.failed"`)
/// so callers can filter without parsing messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub frame_index: u64,
    pub severity: Severity,
    pub kind: &'static str,
    pub message: String,
}

/// Shared diagnostics channel.
///
/// Recoverable problems (a skipped feature, a dropped tracking request) are
/// reported here instead of being returned as errors. Every event is also
/// logged through `tracing`. The buffer is bounded: the oldest events are
/// discarded once `capacity` is reached.
#[derive(Debug)]
pub struct EventBus {
    events: VecDeque<Event>,
    capacity: usize,
    dropped: u64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(1024)
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    pub fn emit(
        &mut self,
        frame: Option<Frame>,
        severity: Severity,
        kind: &'static str,
        message: impl Into<String>,
    ) {
        let message = message.into();
        let frame_index = frame.map(|f| f.index).unwrap_or(0);
        match severity {
            Severity::Debug => debug!(kind, frame = frame_index, "{message}"),
            Severity::Info => info!(kind, frame = frame_index, "{message}"),
            Severity::Warn => warn!(kind, frame = frame_index, "{message}"),
        }

        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(Event {
            frame_index,
            severity,
            kind,
            message,
        });
    }

    pub fn warn(&mut self, frame: Option<Frame>, kind: &'static str, message: impl Into<String>) {
        self.emit(frame, Severity::Warn, kind, message);
    }

    pub fn info(&mut self, frame: Option<Frame>, kind: &'static str, message: impl Into<String>) {
        self.emit(frame, Severity::Info, kind, message);
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    /// Events discarded because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn drain(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }
}
