use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};

use retro_core::{
    ActiveUser, Board, BoardId, CardType, CascadeReport, NewBoard, QuotaCheck, UserHash,
    UserSession,
};

use super::error::ApiError;
use super::extract::{Json, Path, Query};
use crate::middleware::Caller;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/boards", post(create_board))
        .route(
            "/boards/{id}",
            get(get_board).patch(rename_board).delete(delete_board),
        )
        .route("/share/{token}", get(get_board_by_share_token))
        .route("/boards/{id}/close", post(close_board))
        .route("/boards/{id}/join", post(join_board))
        .route("/boards/{id}/alias", patch(update_alias))
        .route("/boards/{id}/heartbeat", post(heartbeat))
        .route("/boards/{id}/users", get(active_users))
        .route("/boards/{id}/admins", post(add_admin))
        .route("/boards/{id}/columns/{column_id}", patch(rename_column))
        .route("/boards/{id}/quota", get(card_quota))
        .route("/boards/{id}/quota/reactions", get(reaction_quota))
}

#[derive(Deserialize)]
pub struct CreateBoardRequest {
    alias: String,
    #[serde(flatten)]
    board: NewBoard,
}

#[derive(Serialize)]
struct CreateBoardResponse {
    board: Board,
    session: UserSession,
}

#[derive(Deserialize)]
pub struct NameRequest {
    name: String,
}

#[derive(Deserialize)]
pub struct AliasRequest {
    alias: String,
}

#[derive(Deserialize)]
pub struct AddAdminRequest {
    user_hash: UserHash,
}

#[derive(Deserialize)]
pub struct CardQuotaQuery {
    card_type: Option<CardType>,
}

async fn create_board(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(req): Json<CreateBoardRequest>,
) -> Result<(StatusCode, Json<CreateBoardResponse>), ApiError> {
    state.check_write(&caller)?;
    let (board, session) = state.service.create_board(&caller, &req.alias, req.board)?;
    Ok((StatusCode::CREATED, Json(CreateBoardResponse { board, session })))
}

async fn get_board(
    State(state): State<AppState>,
    Path(id): Path<BoardId>,
) -> Result<Json<Board>, ApiError> {
    Ok(Json(state.service.get_board(id)?))
}

async fn get_board_by_share_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<Board>, ApiError> {
    Ok(Json(state.service.get_board_by_share_token(&token)?))
}

async fn rename_board(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<BoardId>,
    Json(req): Json<NameRequest>,
) -> Result<Json<Board>, ApiError> {
    state.check_write(&caller)?;
    Ok(Json(state.service.rename_board(&caller, id, &req.name)?))
}

async fn close_board(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<BoardId>,
) -> Result<Json<Board>, ApiError> {
    state.check_write(&caller)?;
    Ok(Json(state.service.close_board(&caller, id)?))
}

async fn delete_board(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<BoardId>,
) -> Result<Json<CascadeReport>, ApiError> {
    state.check_write(&caller)?;
    Ok(Json(state.service.delete_board(&caller, id)?))
}

async fn join_board(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<BoardId>,
    Json(req): Json<AliasRequest>,
) -> Result<Json<UserSession>, ApiError> {
    state.check_write(&caller)?;
    Ok(Json(state.service.join_board(&caller, id, &req.alias)?))
}

async fn update_alias(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<BoardId>,
    Json(req): Json<AliasRequest>,
) -> Result<Json<UserSession>, ApiError> {
    state.check_write(&caller)?;
    Ok(Json(state.service.update_alias(&caller, id, &req.alias)?))
}

// Heartbeats are not rate limited; clients send them on a timer.
async fn heartbeat(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<BoardId>,
) -> Result<Json<UserSession>, ApiError> {
    Ok(Json(state.service.heartbeat(&caller, id)?))
}

async fn active_users(
    State(state): State<AppState>,
    Path(id): Path<BoardId>,
) -> Result<Json<Vec<ActiveUser>>, ApiError> {
    Ok(Json(state.service.active_users(id)?))
}

async fn add_admin(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<BoardId>,
    Json(req): Json<AddAdminRequest>,
) -> Result<Json<Board>, ApiError> {
    state.check_write(&caller)?;
    Ok(Json(state.service.add_admin(&caller, id, &req.user_hash)?))
}

async fn rename_column(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path((id, column_id)): Path<(BoardId, String)>,
    Json(req): Json<NameRequest>,
) -> Result<Json<Board>, ApiError> {
    state.check_write(&caller)?;
    Ok(Json(
        state
            .service
            .rename_column(&caller, id, &column_id, &req.name)?,
    ))
}

async fn card_quota(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<BoardId>,
    Query(query): Query<CardQuotaQuery>,
) -> Result<Json<QuotaCheck>, ApiError> {
    let card_type = query.card_type.unwrap_or(CardType::Feedback);
    Ok(Json(state.service.can_create_card(&caller, id, card_type)?))
}

async fn reaction_quota(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<BoardId>,
) -> Result<Json<QuotaCheck>, ApiError> {
    Ok(Json(state.service.can_add_reaction(&caller, id)?))
}
