//! Model lifecycle notifications

use tokio::sync::broadcast;

use crate::device::Side;

/// Broadcast when a controller's render model appears or goes away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelEvent {
    Ready(Side),
    Removed(Side),
}

impl ModelEvent {
    pub fn side(&self) -> Side {
        match self {
            ModelEvent::Ready(side) | ModelEvent::Removed(side) => *side,
        }
    }
}

pub type ModelEventReceiver = broadcast::Receiver<ModelEvent>;

/// Per-controller event channel. Dropping a receiver unsubscribes it.
#[derive(Debug, Clone)]
pub struct ModelEvents {
    sender: broadcast::Sender<ModelEvent>,
}

impl ModelEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> ModelEventReceiver {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Send to current subscribers; with none, the event is dropped
    pub fn emit(&self, event: ModelEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for ModelEvents {
    fn default() -> Self {
        Self::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_and_drop() {
        let events = ModelEvents::default();
        events.emit(ModelEvent::Ready(Side::Left));

        let mut rx = events.subscribe();
        assert_eq!(events.subscriber_count(), 1);
        events.emit(ModelEvent::Removed(Side::Right));
        assert_eq!(rx.try_recv().unwrap(), ModelEvent::Removed(Side::Right));
        assert!(rx.try_recv().is_err());

        drop(rx);
        assert_eq!(events.subscriber_count(), 0);
    }
}
