use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use retro_core::{BoardEvent, BoardId, NotificationSink};

const CHANNEL_CAPACITY: usize = 256;

/// Fans board events out to WebSocket subscribers.
///
/// One broadcast channel per board, created on first subscribe. Events for
/// boards nobody watches are dropped.
#[derive(Default)]
pub struct EventHub {
    channels: DashMap<BoardId, broadcast::Sender<BoardEvent>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, board_id: BoardId) -> broadcast::Receiver<BoardEvent> {
        self.channels
            .entry(board_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn subscriber_count(&self, board_id: BoardId) -> usize {
        self.channels
            .get(&board_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Drop channels whose subscribers have all gone away.
    pub fn cleanup(&self) {
        self.channels.retain(|_, tx| tx.receiver_count() > 0);
    }
}

impl NotificationSink for EventHub {
    fn notify(&self, event: BoardEvent) {
        let board_id = event.board_id();
        let deleted = matches!(event, BoardEvent::BoardDeleted { .. });

        if let Some(tx) = self.channels.get(&board_id) {
            let kind = event.kind();
            // no receivers is not an error
            let delivered = tx.send(event).unwrap_or(0);
            debug!(board = %board_id, kind, delivered, "Event published");
        }

        if deleted {
            self.channels.remove(&board_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_board_events() {
        let hub = EventHub::new();
        let board_id = BoardId::generate();
        let other = BoardId::generate();
        let mut rx = hub.subscribe(board_id);

        hub.notify(BoardEvent::BoardDeleted { board_id: other });
        hub.notify(BoardEvent::BoardDeleted { board_id });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.board_id(), board_id);
        assert_eq!(hub.subscriber_count(board_id), 0);
    }

    #[test]
    fn test_unwatched_board_is_dropped() {
        let hub = EventHub::new();
        hub.notify(BoardEvent::BoardDeleted {
            board_id: BoardId::generate(),
        });
        assert!(hub.channels.is_empty());
    }

    #[test]
    fn test_cleanup_removes_idle_channels() {
        let hub = EventHub::new();
        let board_id = BoardId::generate();
        let rx = hub.subscribe(board_id);
        hub.cleanup();
        assert_eq!(hub.subscriber_count(board_id), 1);

        drop(rx);
        hub.cleanup();
        assert!(hub.channels.is_empty());
    }
}
