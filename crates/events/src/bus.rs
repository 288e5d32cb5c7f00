//! Multi-producer, single-consumer status-event bus.
//!
//! Workers submit [`StatusEvent`]s through an [`EventSender`]; any number of
//! observers subscribe through [`EventBus::subscribe`] and each receives every
//! event via tokio's broadcast channel. Consecutive events reporting the same
//! `(task_id, new_state)` pair are coalesced before fan-out, so a status
//! renderer never sees duplicate "still in this state" noise.

use crate::event::StatusEvent;
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc};

/// Default channel capacity for the broadcast channel.
const DEFAULT_BROADCAST_CAPACITY: usize = 1000;

/// Multi-subscriber status-event bus.
#[derive(Debug)]
pub struct EventBus {
    sender: Mutex<Option<mpsc::UnboundedSender<StatusEvent>>>,
    broadcast_tx: broadcast::Sender<StatusEvent>,
}

impl EventBus {
    /// Create a new event bus with the default broadcast capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BROADCAST_CAPACITY)
    }

    /// Create a new event bus with a specific broadcast capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<StatusEvent>();
        let (broadcast_tx, _) = broadcast::channel(capacity);

        let broadcast_tx_clone = broadcast_tx.clone();
        tokio::spawn(async move {
            let mut last: Option<(u64, String)> = None;
            while let Some(event) = receiver.recv().await {
                let key = (event.task_id, event.new_state.to_string());
                if last.as_ref() == Some(&key) {
                    continue;
                }
                last = Some(key);
                let _ = broadcast_tx_clone.send(event);
            }
        });

        Self {
            sender: Mutex::new(Some(sender)),
            broadcast_tx,
        }
    }

    /// Get a sender for submitting events to the bus, or `None` if shut down.
    #[must_use]
    pub fn sender(&self) -> Option<EventSender> {
        self.sender
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| EventSender { inner: s.clone() }))
    }

    /// Shut down the event bus. Safe to call multiple times.
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.sender.lock() {
            let _ = guard.take();
        }
    }

    /// Subscribe to events sent after this call.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            inner: self.broadcast_tx.subscribe(),
        }
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.broadcast_tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Sender handle for submitting events to an [`EventBus`].
#[derive(Debug, Clone)]
pub struct EventSender {
    inner: mpsc::UnboundedSender<StatusEvent>,
}

impl EventSender {
    /// Send an event to the bus.
    ///
    /// # Errors
    /// Returns an error if the bus has been shut down.
    pub fn send(&self, event: StatusEvent) -> Result<(), SendError> {
        self.inner.send(event).map_err(|_| SendError::Closed)
    }

    /// Whether the bus has been shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Receiver handle for receiving events from an [`EventBus`].
#[derive(Debug)]
pub struct EventReceiver {
    inner: broadcast::Receiver<StatusEvent>,
}

impl EventReceiver {
    /// Receive the next event, skipping over any the receiver fell behind on.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        loop {
            match self.inner.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "status event receiver lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without waiting.
    pub fn try_recv(&mut self) -> Option<StatusEvent> {
        loop {
            match self.inner.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "status event receiver lagged, skipped events");
                }
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }
}

/// Error returned when sending to a closed bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The event bus has been closed.
    Closed,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "event bus is closed"),
        }
    }
}

impl std::error::Error for SendError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TaskState;

    fn make_test_event(task_id: u64, state: TaskState) -> StatusEvent {
        StatusEvent::new(
            task_id,
            "acme/widgets",
            "",
            TaskState::Queued,
            state,
            None,
        )
    }

    #[tokio::test]
    async fn send_and_receive() {
        let bus = EventBus::new();
        let sender = bus.sender().expect("sender should be available");
        let mut receiver = bus.subscribe();

        let event = make_test_event(1, TaskState::Initializing);
        sender.send(event).unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.task_id, 1);
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive() {
        let bus = EventBus::new();
        let sender = bus.sender().expect("sender should be available");
        let mut r1 = bus.subscribe();
        let mut r2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        sender.send(make_test_event(7, TaskState::Done)).unwrap();

        assert_eq!(r1.recv().await.unwrap().task_id, 7);
        assert_eq!(r2.recv().await.unwrap().task_id, 7);
    }

    #[tokio::test]
    async fn consecutive_same_state_updates_are_coalesced() {
        let bus = EventBus::new();
        let sender = bus.sender().expect("sender should be available");
        let mut receiver = bus.subscribe();

        sender
            .send(make_test_event(1, TaskState::Step { index: 0 }))
            .unwrap();
        sender
            .send(make_test_event(1, TaskState::Step { index: 0 }))
            .unwrap();
        sender
            .send(make_test_event(1, TaskState::Step { index: 1 }))
            .unwrap();

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.new_state, TaskState::Step { index: 0 });
        let second = receiver.recv().await.unwrap();
        assert_eq!(second.new_state, TaskState::Step { index: 1 });

        assert!(receiver.try_recv().is_none());
    }

    #[tokio::test]
    async fn shutdown_drops_sender() {
        let bus = EventBus::new();
        assert!(bus.sender().is_some());
        bus.shutdown();
        assert!(bus.sender().is_none());
    }

    #[test]
    fn send_error_display() {
        assert_eq!(format!("{}", SendError::Closed), "event bus is closed");
    }
}
