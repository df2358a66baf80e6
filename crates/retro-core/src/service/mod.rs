//! Board and card commands for the API layer.
//!
//! Each command resolves the board, runs the lifecycle gate and quota checks,
//! and then either writes directly or hands off to the [`CardEngine`] and
//! [`CascadeCoordinator`].

mod boards;
mod cards;

use std::sync::Arc;

use chrono::Duration;

use crate::cascade::CascadeCoordinator;
use crate::engine::CardEngine;
use crate::notify::NotificationSink;
use crate::quota::QuotaEvaluator;
use crate::storage::Storage;

/// Sessions seen within this window count as active.
pub const DEFAULT_ACTIVE_WINDOW_SECS: i64 = 120;

pub struct RetroService<S, N> {
    storage: Arc<S>,
    sink: Arc<N>,
    engine: CardEngine<S, N>,
    quota: QuotaEvaluator<S>,
    cascade: CascadeCoordinator<S>,
    active_window: Duration,
}

impl<S: Storage, N: NotificationSink> RetroService<S, N> {
    pub fn new(storage: Arc<S>, sink: Arc<N>) -> Self {
        Self {
            engine: CardEngine::new(storage.clone(), sink.clone()),
            quota: QuotaEvaluator::new(storage.clone()),
            cascade: CascadeCoordinator::new(storage.clone()),
            storage,
            sink,
            active_window: Duration::seconds(DEFAULT_ACTIVE_WINDOW_SECS),
        }
    }

    pub fn with_active_window(mut self, window: Duration) -> Self {
        self.active_window = window;
        self
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn engine(&self) -> &CardEngine<S, N> {
        &self.engine
    }
}
