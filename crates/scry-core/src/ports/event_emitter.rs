//! Event emitter trait for cross-crate event broadcasting.
//!
//! Implementations handle transport details (broadcast channels, stdout,
//! a desktop shell's IPC bridge).

use crate::events::AppEvent;

/// Trait for emitting application events.
///
/// This abstraction keeps channel types out of the public API surface of the
/// supervisors.
///
/// # Implementations
///
/// - `NoopEmitter` - For tests and one-shot commands that don't need events
/// - `EventBroadcaster` in the runtime crate - fan-out to any number of observers
pub trait AppEventEmitter: Send + Sync {
    /// Emit an application event. Must not block.
    fn emit(&self, event: AppEvent);

    /// Clone this emitter into a boxed trait object.
    fn clone_box(&self) -> Box<dyn AppEventEmitter>;
}

/// A no-op event emitter.
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    /// Create a new no-op emitter.
    pub const fn new() -> Self {
        Self
    }
}

impl AppEventEmitter for NoopEmitter {
    fn emit(&self, _event: AppEvent) {
        // Intentionally do nothing
    }

    fn clone_box(&self) -> Box<dyn AppEventEmitter> {
        Box::new(self.clone())
    }
}
