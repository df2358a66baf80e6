use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use retro_core::{BoardEvent, BoardId};

use super::error::ApiError;
use super::extract::Path;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/boards/{id}/events", get(subscribe))
}

async fn subscribe(
    State(state): State<AppState>,
    Path(board_id): Path<BoardId>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    state.service.get_board(board_id)?;
    let rx = state.hub.subscribe(board_id);
    Ok(ws.on_upgrade(move |socket| forward_events(socket, board_id, rx)))
}

/// Relay board events to the socket as JSON text frames until either side
/// goes away.
async fn forward_events(
    mut socket: WebSocket,
    board_id: BoardId,
    mut rx: broadcast::Receiver<BoardEvent>,
) {
    debug!(board = %board_id, "Event subscriber connected");

    loop {
        tokio::select! {
            result = rx.recv() => {
                let event = match result {
                    Ok(event) => event,
                    Err(RecvError::Lagged(n)) => {
                        warn!(board = %board_id, skipped = n, "Event subscriber lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode event");
                        continue;
                    }
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!(board = %board_id, "Event subscriber disconnected");
}
