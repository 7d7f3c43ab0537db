//! Product catalog routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use kasse_core::{Product, ProductDraft};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Include deactivated rows.
    #[serde(default)]
    pub all: bool,
}

pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult<Json<Vec<Product>>> {
    let repo = state.db.products();
    let products = if query.all {
        repo.list_all().await?
    } else {
        repo.list_active().await?
    };
    Ok(Json(products))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Product>> {
    state
        .db
        .products()
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Product", id))
}

pub async fn create(
    State(state): State<AppState>,
    Json(draft): Json<ProductDraft>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    let product = state.db.products().insert(&draft).await?;
    state.content_changed();
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(draft): Json<ProductDraft>,
) -> ApiResult<Json<Product>> {
    let product = state.db.products().update(id, &draft).await?;
    state.content_changed();
    Ok(Json(product))
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<StatusCode> {
    state.db.products().soft_delete(id).await?;
    state.content_changed();
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct StockCorrection {
    /// Signed change, e.g. from an inventory count.
    pub delta: i64,
}

#[derive(Debug, Serialize)]
pub struct StockLevel {
    pub product_id: i64,
    pub stock: i64,
}

pub async fn restock(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<RestockRequest>,
) -> ApiResult<Json<StockLevel>> {
    let stock = state.ledger.record_restock(id, body.quantity).await?;
    Ok(Json(StockLevel { product_id: id, stock }))
}

pub async fn correct_stock(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<StockCorrection>,
) -> ApiResult<Json<StockLevel>> {
    if body.delta == 0 {
        return Err(ApiError::validation("delta must not be 0"));
    }
    let stock = state.ledger.adjust_stock(id, body.delta).await?;
    info!(product_id = id, delta = body.delta, stock, "Stock corrected");
    Ok(Json(StockLevel { product_id: id, stock }))
}
