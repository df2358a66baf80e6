use std::sync::Arc;

use retro_core::{IdentityResolver, RetroService, Sha256Identity, UserHash};
use retro_db::RedbStorage;

use crate::config::Config;
use crate::hub::EventHub;
use crate::middleware::{write_limiter, RateLimiter};
use crate::routes::error::ApiError;

pub type Service = RetroService<RedbStorage, EventHub>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<Service>,
    pub hub: Arc<EventHub>,
    pub identity: Arc<dyn IdentityResolver>,
    pub write_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: &Config, storage: Arc<RedbStorage>) -> Self {
        let hub = Arc::new(EventHub::new());
        let window = chrono::Duration::seconds(config.active_window.as_secs() as i64);
        let service = RetroService::new(storage, hub.clone()).with_active_window(window);

        Self {
            service: Arc::new(service),
            hub,
            identity: Arc::new(Sha256Identity::new(config.identity_salt.clone())),
            write_limiter: Arc::new(write_limiter(config.write_limit_per_sec)),
        }
    }

    /// Charge one mutating request to the caller.
    pub fn check_write(&self, caller: &UserHash) -> Result<(), ApiError> {
        self.write_limiter
            .check(caller)
            .map_err(ApiError::RateLimited)
    }
}
