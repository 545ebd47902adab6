//! Event sink implementations

use super::{Event, EventKind, EventPayload, EventSink};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Renders events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, kind: EventKind, payload: EventPayload) {
        match kind {
            EventKind::Error => tracing::error!("{}", payload),
            EventKind::Warn => tracing::warn!("{}", payload),
            EventKind::Progress => tracing::debug!("Progress: {}%", payload),
            EventKind::Complete => tracing::info!("Run complete"),
            EventKind::Count | EventKind::Details => tracing::info!("{}", payload),
            EventKind::Data => tracing::info!("[data] {}", payload),
        }
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _kind: EventKind, _payload: EventPayload) {}
}

/// Forwards events into an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, kind: EventKind, payload: EventPayload) {
        // A dropped receiver means nobody is listening any more
        let _ = self.tx.send(Event::new(kind, payload));
    }
}

/// Creates a [`ChannelSink`] and the receiver for its events
pub fn channel() -> (ChannelSink, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink::new(tx), rx)
}

/// Delivers each event to several sinks in order
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, kind: EventKind, payload: EventPayload) {
        for sink in &self.sinks {
            sink.emit(kind, payload.clone());
        }
    }
}

/// Convenience wrapper that emits typed events to a sink
#[derive(Clone)]
pub struct EventReporter {
    sink: Arc<dyn EventSink>,
}

impl EventReporter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> Arc<dyn EventSink> {
        self.sink.clone()
    }

    pub fn details(&self, message: impl Into<String>) {
        self.sink
            .emit(EventKind::Details, EventPayload::Text(message.into()));
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.sink
            .emit(EventKind::Warn, EventPayload::Text(message.into()));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.sink
            .emit(EventKind::Error, EventPayload::Text(message.into()));
    }

    pub fn count(&self, message: impl Into<String>) {
        self.sink
            .emit(EventKind::Count, EventPayload::Text(message.into()));
    }

    /// Emits a progress percentage, clamped to `0..=100`
    pub fn progress(&self, percent: f64) {
        self.sink.emit(
            EventKind::Progress,
            EventPayload::Number(percent.clamp(0.0, 100.0)),
        );
    }

    pub fn data(&self, payload: EventPayload) {
        self.sink.emit(EventKind::Data, payload);
    }

    pub fn complete(&self) {
        self.sink.emit(EventKind::Complete, EventPayload::Flag(true));
    }
}
