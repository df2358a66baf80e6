//! Retro Server - Axum HTTP API and WebSocket event stream for retro boards.

pub mod config;
pub mod hub;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::Config;
pub use hub::EventHub;
pub use routes::create_router;
pub use state::AppState;
