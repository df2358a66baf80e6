use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Router,
};
use serde::Deserialize;

use retro_core::{
    BoardId, CardDeletion, CardId, CardPatch, CardView, LinkOutcome, LinkType, NewCard,
    PublicCard, ReactionOutcome,
};

use super::error::ApiError;
use super::extract::{Json, Path};
use crate::middleware::Caller;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/boards/{id}/cards", get(list_cards).post(create_card))
        .route(
            "/cards/{id}",
            get(get_card).patch(update_card).delete(delete_card),
        )
        .route("/cards/{id}/link", post(link_cards))
        .route("/cards/{id}/unlink", post(unlink_cards))
        .route(
            "/cards/{id}/reactions",
            post(add_reaction).delete(remove_reaction),
        )
}

#[derive(Deserialize)]
pub struct LinkRequest {
    target_card_id: CardId,
    link_type: LinkType,
}

#[derive(Deserialize, Default)]
pub struct ReactionRequest {
    #[serde(default)]
    reaction_type: Option<String>,
}

async fn list_cards(
    State(state): State<AppState>,
    Path(board_id): Path<BoardId>,
) -> Result<Json<Vec<CardView>>, ApiError> {
    Ok(Json(state.service.list_cards(board_id)?))
}

async fn create_card(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(board_id): Path<BoardId>,
    Json(new_card): Json<NewCard>,
) -> Result<Response, ApiError> {
    state.check_write(&caller)?;
    let card = state.service.create_card(&caller, board_id, new_card)?;
    Ok((StatusCode::CREATED, Json(PublicCard::from(&card))).into_response())
}

async fn get_card(
    State(state): State<AppState>,
    Path(id): Path<CardId>,
) -> Result<Json<CardView>, ApiError> {
    Ok(Json(state.service.get_card(id)?))
}

async fn update_card(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<CardId>,
    Json(patch): Json<CardPatch>,
) -> Result<Response, ApiError> {
    state.check_write(&caller)?;
    let card = state.service.update_card(&caller, id, patch)?;
    Ok(Json(PublicCard::from(&card)).into_response())
}

async fn delete_card(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<CardId>,
) -> Result<Json<CardDeletion>, ApiError> {
    state.check_write(&caller)?;
    Ok(Json(state.service.delete_card(&caller, id)?))
}

async fn link_cards(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<CardId>,
    Json(req): Json<LinkRequest>,
) -> Result<Json<LinkOutcome>, ApiError> {
    state.check_write(&caller)?;
    Ok(Json(state.service.link(
        &caller,
        id,
        req.target_card_id,
        req.link_type,
    )?))
}

async fn unlink_cards(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<CardId>,
    Json(req): Json<LinkRequest>,
) -> Result<Json<LinkOutcome>, ApiError> {
    state.check_write(&caller)?;
    Ok(Json(state.service.unlink(
        &caller,
        id,
        req.target_card_id,
        req.link_type,
    )?))
}

async fn add_reaction(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<CardId>,
    body: Option<Json<ReactionRequest>>,
) -> Result<Json<ReactionOutcome>, ApiError> {
    state.check_write(&caller)?;
    let Json(req) = body.unwrap_or_default();
    Ok(Json(state.service.add_reaction(&caller, id, req.reaction_type)?))
}

async fn remove_reaction(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<CardId>,
) -> Result<Json<ReactionOutcome>, ApiError> {
    state.check_write(&caller)?;
    Ok(Json(state.service.remove_reaction(&caller, id)?))
}
