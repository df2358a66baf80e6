use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use retro_core::{BoardId, Storage};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Ready once the database answers a read.
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let probe = state
        .service
        .storage()
        .read()
        .and_then(|reader| reader.get_board(BoardId(uuid::Uuid::nil())));

    match probe {
        Ok(_) => (StatusCode::OK, Json(HealthResponse { status: "ok" })),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "unavailable" }),
        ),
    }
}
