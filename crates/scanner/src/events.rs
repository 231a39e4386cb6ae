//! Ordered notifications for the presentation layer

use shared::ScanEvent;
use tokio::sync::broadcast::{self, error::RecvError};

const EVENT_CAPACITY: usize = 64;

/// Fan-out channel of [`ScanEvent`]s.
///
/// Subscribers see events in emission order. A subscriber that falls more
/// than the channel capacity behind loses the oldest events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ScanEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; having no subscribers is not an error
    pub fn emit(&self, event: ScanEvent) {
        tracing::debug!(?event, "emit");
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Feed every received event to `handle` until the bus is gone.
///
/// Falling behind skips the lost events and keeps going.
pub async fn for_each_event(
    mut rx: broadcast::Receiver<ScanEvent>,
    mut handle: impl FnMut(ScanEvent),
) {
    loop {
        match rx.recv().await {
            Ok(event) => handle(event),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Event subscriber lagged, {skipped} events dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
