use super::BatchEvent;
use tokio::sync::broadcast;

/// Fan-out of batch progress events to any number of listeners.
#[derive(Debug)]
pub struct EventHub {
    sender: broadcast::Sender<BatchEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    /// A receiver that falls more than `capacity` events behind skips ahead.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Having nobody listening is not an error.
    pub fn publish(&self, event: BatchEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
