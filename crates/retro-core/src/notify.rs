use crate::event::BoardEvent;

/// Receives board events after each successful mutation.
///
/// Implementations must not block; delivery is fire-and-forget.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: BoardEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl NotificationSink for NoopSink {
    fn notify(&self, _event: BoardEvent) {}
}

#[cfg(any(test, feature = "test-utils"))]
pub use recording::RecordingSink;

#[cfg(any(test, feature = "test-utils"))]
mod recording {
    use std::sync::Mutex;

    use super::*;

    /// Sink that keeps every event for later inspection.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<BoardEvent>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<BoardEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn kinds(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().iter().map(|e| e.kind()).collect()
        }

        pub fn clear(&self) {
            self.events.lock().unwrap().clear();
        }
    }

    impl NotificationSink for RecordingSink {
        fn notify(&self, event: BoardEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}
