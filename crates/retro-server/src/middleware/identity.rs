use axum::{
    extract::{Query, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use serde::Deserialize;

use retro_core::UserHash;

use crate::routes::error::ApiError;
use crate::state::AppState;

/// The hashed identity of the caller, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct Caller(pub UserHash);

/// Resolve the bearer token into a [`Caller`].
///
/// Browsers cannot set headers on a WebSocket upgrade, so a `token` query
/// parameter is accepted as a fallback.
pub async fn require_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&req)
        .or_else(|| query_token(&req))
        .ok_or(ApiError::Unauthorized)?;

    let caller = Caller(state.identity.resolve(&token));
    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

fn bearer_token(req: &Request) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn query_token(req: &Request) -> Option<String> {
    let Query(query) = Query::<TokenQuery>::try_from_uri(req.uri()).ok()?;
    query.token.filter(|t| !t.is_empty())
}
