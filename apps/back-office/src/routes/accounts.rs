//! Account routes. Deletion deactivates and releases the token.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use kasse_core::{Account, AccountDraft, Money};
use kasse_db::BalanceChange;
use serde::Deserialize;

use super::products::ListQuery;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult<Json<Vec<Account>>> {
    Ok(Json(state.db.accounts().list(query.all).await?))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Account>> {
    state
        .db
        .accounts()
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Account", id))
}

pub async fn create(
    State(state): State<AppState>,
    Json(draft): Json<AccountDraft>,
) -> ApiResult<(StatusCode, Json<Account>)> {
    let account = state.db.accounts().insert(&draft).await?;
    state.content_changed();
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(draft): Json<AccountDraft>,
) -> ApiResult<Json<Account>> {
    let account = state.db.accounts().update(id, &draft).await?;
    state.content_changed();
    Ok(Json(account))
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<StatusCode> {
    state.db.accounts().soft_delete(id).await?;
    state.content_changed();
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct TopupRequest {
    /// Minor units.
    pub amount: Money,
}

pub async fn topup(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<TopupRequest>,
) -> ApiResult<Json<BalanceChange>> {
    let change = state.ledger.top_up(id, body.amount).await?;
    state.content_changed();
    Ok(Json(change))
}
