//! Event sink trait and implementations.

use super::EventType;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, Level};

/// Receives lifecycle events from jobs, steps and chunks.
///
/// Emission never fails a run; sinks that can fail must log and swallow
/// their own errors.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event.
    ///
    /// # Arguments
    ///
    /// * `event` - The event type
    /// * `data` - The event payload, a JSON object
    async fn emit(&self, event: EventType, data: Value);
}

/// A no-op event sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: EventType, _data: Value) {}
}

/// An event sink that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    ///
    /// Levels other than DEBUG log at INFO.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Creates an info-level logging sink.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: EventType, data: Value) {
        if self.level == Level::DEBUG {
            debug!(event_type = %event, event_data = %data, "Event: {}", event);
        } else {
            info!(event_type = %event, event_data = %data, "Event: {}", event);
        }
    }
}

/// A collecting event sink for tests and in-process reporting.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<(EventType, Value)>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<(EventType, Value)> {
        self.events.read().clone()
    }

    /// Returns the collected event types in emission order.
    #[must_use]
    pub fn types(&self) -> Vec<EventType> {
        self.events.read().iter().map(|(t, _)| *t).collect()
    }

    /// Returns the payloads of every event of one type.
    #[must_use]
    pub fn payloads_of(&self, event: EventType) -> Vec<Value> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| *t == event)
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Returns the number of events of one type.
    #[must_use]
    pub fn count_of(&self, event: EventType) -> usize {
        self.events.read().iter().filter(|(t, _)| *t == event).count()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: EventType, data: Value) {
        self.events.write().push((event, data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_noop_sink() {
        NoOpEventSink.emit(EventType::JobStarted, json!({})).await;
    }

    #[tokio::test]
    async fn test_logging_sink() {
        let sink = LoggingEventSink::debug();
        sink.emit(EventType::ChunkCommitted, json!({"items": 3})).await;
        LoggingEventSink::default()
            .emit(EventType::StepStarted, json!({"step": "load"}))
            .await;
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(EventType::StepStarted, json!({"step": "load"})).await;
        sink.emit(EventType::ItemSkipped, json!({"ordinal": 3})).await;
        sink.emit(EventType::ItemSkipped, json!({"ordinal": 5})).await;

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.count_of(EventType::ItemSkipped), 2);
        assert_eq!(sink.payloads_of(EventType::ItemSkipped)[1]["ordinal"], 5);
        assert_eq!(sink.types()[0], EventType::StepStarted);

        sink.clear();
        assert!(sink.is_empty());
    }
}
