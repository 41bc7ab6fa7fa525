//! Pool lifecycle events.
//!
//! Events are fanned out over a `tokio::sync::broadcast` channel so that
//! monitors can observe the pool. Sending never blocks and never fails the
//! operation that produced the event: with no subscribers the event is only
//! traced.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Something that happened to the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PoolEvent {
    /// A new physical connection was opened.
    ConnectionCreated { connection_number: u64 },
    /// Opening or using a connection failed.
    ConnectionErrored { message: String },
    /// A connection was checked out.
    Acquired { in_use: u32, max: u32 },
    /// An acquire gave up.
    Exhausted { waited_ms: u64 },
    /// An idle connection was closed by the reaper.
    IdleReaped { idle: usize },
    /// The pool was shut down.
    Closed,
}

/// Emitter shared by the pool and its connect hook.
#[derive(Debug, Clone)]
pub struct PoolEvents {
    sender: broadcast::Sender<PoolEvent>,
    created: Arc<AtomicU64>,
}

impl PoolEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sender,
            created: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.sender.subscribe()
    }

    /// Total number of physical connections opened so far.
    pub fn connections_created(&self) -> u64 {
        self.created.load(Ordering::Acquire)
    }

    pub(crate) fn connection_created(&self) {
        let connection_number = self.created.fetch_add(1, Ordering::AcqRel) + 1;
        info!(connection_number, "New store connection");
        self.emit(PoolEvent::ConnectionCreated { connection_number });
    }

    pub(crate) fn connection_errored(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(error = %message, "Store connection error");
        self.emit(PoolEvent::ConnectionErrored { message });
    }

    pub(crate) fn emit(&self, event: PoolEvent) {
        debug!(?event, "Pool event");
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }
}

impl Default for PoolEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let events = PoolEvents::new();
        events.emit(PoolEvent::Closed);
        events.connection_created();
        assert_eq!(events.connections_created(), 1);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let events = PoolEvents::new();
        let mut rx = events.subscribe();

        events.connection_created();
        events.connection_errored("refused");

        assert_eq!(
            rx.recv().await.unwrap(),
            PoolEvent::ConnectionCreated {
                connection_number: 1
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            PoolEvent::ConnectionErrored {
                message: "refused".to_string()
            }
        );
    }

    #[test]
    fn test_event_serialization() {
        let value = serde_json::to_value(PoolEvent::Exhausted { waited_ms: 250 }).unwrap();
        assert_eq!(value["event"], "exhausted");
        assert_eq!(value["waited_ms"], 250);
    }
}
