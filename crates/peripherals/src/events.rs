//! Fire-and-forget notification of peripheral events.
//!
//! Every listener of a kind runs on its own task when an event of that kind
//! is published. There is no ordering between listeners and no backpressure.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use supervisor_link::{Command, Message, MessageType};
use tracing::{debug, warn};

/// Kinds of peripheral events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Watchdog heartbeat received.
    Watchdog,
    /// Enclosure opened or closed.
    Tamper,
    /// Buzzer state changed or a buzzer command completed.
    Buzzer,
    /// Power source changed.
    PowerSource,
    /// Firmware update progress.
    FirmwareUpdate,
}

/// A published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Kind the event was published under.
    pub kind: EventKind,
    /// Type of the message that caused the event.
    pub message_type: MessageType,
    /// Command of the message that caused the event.
    pub command: Command,
    /// Payload of the message that caused the event.
    pub payload: String,
}

impl Event {
    /// Event describing an inbound message.
    #[must_use]
    pub fn from_message(kind: EventKind, message: &Message) -> Self {
        Self {
            kind,
            message_type: message.message_type,
            command: message.command,
            payload: message.payload.clone(),
        }
    }
}

/// Receives published events.
#[async_trait]
pub trait EventListener: Send + Sync + 'static {
    /// Handle one event.
    async fn on_event(&self, event: Event);
}

#[async_trait]
impl<F, Fut> EventListener for F
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn on_event(&self, event: Event) {
        self(event).await;
    }
}

type Listeners = RwLock<HashMap<EventKind, Vec<Arc<dyn EventListener>>>>;

/// Registry of event listeners. Clones share the registry.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Listeners>,
}

/// Non-owning handle to an [`EventBus`], for listeners that publish.
#[derive(Clone)]
pub struct WeakEventBus {
    listeners: Weak<Listeners>,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for events of `kind`.
    pub fn subscribe(&self, kind: EventKind, listener: impl EventListener) {
        self.listeners
            .write()
            .entry(kind)
            .or_default()
            .push(Arc::new(listener));
    }

    /// Number of listeners registered for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }

    /// Run every listener of the event's kind on its own task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn publish(&self, event: Event) {
        let listeners = self
            .listeners
            .read()
            .get(&event.kind)
            .cloned()
            .unwrap_or_default();

        debug!(
            "Publishing {:?} event to {} listener(s)",
            event.kind,
            listeners.len()
        );

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime to publish {:?} event on, dropping it", event.kind);
            return;
        };

        for listener in listeners {
            let event = event.clone();
            runtime.spawn(async move { listener.on_event(event).await });
        }
    }

    /// Handle that does not keep the bus alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakEventBus {
        WeakEventBus {
            listeners: Arc::downgrade(&self.listeners),
        }
    }
}

impl WeakEventBus {
    /// The bus, if it still exists.
    #[must_use]
    pub fn upgrade(&self) -> Option<EventBus> {
        self.listeners
            .upgrade()
            .map(|listeners| EventBus { listeners })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event(kind: EventKind, payload: &str) -> Event {
        Event {
            kind,
            message_type: MessageType::Set,
            command: Command::TAMPER_EVENT,
            payload: payload.to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_every_listener_of_kind() {
        let bus = EventBus::new();
        let (tx, rx) = flume::unbounded();

        for name in ["first", "second"] {
            let tx = tx.clone();
            bus.subscribe(EventKind::Tamper, move |event: Event| {
                let tx = tx.clone();
                async move {
                    tx.send((name, event.payload)).unwrap();
                }
            });
        }
        let other = tx.clone();
        bus.subscribe(EventKind::Buzzer, move |_: Event| {
            let other = other.clone();
            async move {
                other.send(("buzzer", String::new())).unwrap();
            }
        });

        bus.publish(event(EventKind::Tamper, "Open"));

        let mut received = Vec::new();
        for _ in 0..2 {
            received.push(
                tokio::time::timeout(Duration::from_secs(1), rx.recv_async())
                    .await
                    .unwrap()
                    .unwrap(),
            );
        }
        received.sort();
        assert_eq!(
            received,
            [("first", "Open".to_string()), ("second", "Open".to_string())]
        );
        assert!(
            tokio::time::timeout(Duration::from_millis(50), rx.recv_async())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_publish_without_listeners() {
        let bus = EventBus::new();

        bus.publish(event(EventKind::FirmwareUpdate, "50%"));
        assert_eq!(bus.listener_count(EventKind::FirmwareUpdate), 0);
    }

    #[test]
    fn test_weak_handle() {
        let bus = EventBus::new();
        let weak = bus.downgrade();

        assert!(weak.upgrade().is_some());
        drop(bus);
        assert!(weak.upgrade().is_none());
    }
}
