//! Typed fan-out of supervision events.
//!
//! Every observer (the UI bridge, the CLI printer, tests) subscribes to its
//! own receiver. Nothing is global: the composition root creates one
//! broadcaster and hands clones of it to the components.

use std::sync::Arc;

use scry_core::AppEvent;
use scry_core::ports::AppEventEmitter;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Broadcast channel capacity for events. Token streams are chatty.
const CHANNEL_CAPACITY: usize = 1024;

/// Broadcaster for application events.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<AppEvent>,
}

impl EventBroadcaster {
    /// Create a new broadcaster
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast an event to all subscribers
    pub fn broadcast(&self, event: AppEvent) {
        if self.sender.receiver_count() > 0 {
            trace!(event = event.event_name(), "Broadcasting event");
            if self.sender.send(event).is_err() {
                debug!("All event subscribers dropped");
            }
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Shareable emitter handle.
    pub fn emitter(&self) -> Arc<dyn AppEventEmitter> {
        Arc::new(self.clone())
    }
}

/// Next event for a subscriber. Overruns are logged and skipped past;
/// `None` once every sender is gone.
pub async fn next_event(rx: &mut broadcast::Receiver<AppEvent>) -> Option<AppEvent> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event subscriber fell behind, events lost");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl AppEventEmitter for EventBroadcaster {
    fn emit(&self, event: AppEvent) {
        self.broadcast(event);
    }

    fn clone_box(&self) -> Box<dyn AppEventEmitter> {
        Box::new(self.clone())
    }
}
