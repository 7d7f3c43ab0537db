//! Settings, log views, and terminal control.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use kasse_core::SettingKey;
use kasse_db::{RestockEntry, TopupEntry, TransactionEntry};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_LOG_LIMIT: i64 = 100;
const MAX_LOG_LIMIT: i64 = 1000;

// =============================================================================
// Health
// =============================================================================

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub store: bool,
}

pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        store: state.db.health_check().await,
    })
}

// =============================================================================
// Settings
// =============================================================================

pub async fn settings(State(state): State<AppState>) -> ApiResult<Json<BTreeMap<String, String>>> {
    let all = state.db.settings().all().await?;
    Ok(Json(
        all.into_iter()
            .map(|(key, value)| (key.as_str().to_string(), value))
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct SettingValue {
    pub value: String,
}

pub async fn put_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<SettingValue>,
) -> ApiResult<StatusCode> {
    let key = SettingKey::parse(&key).ok_or_else(|| ApiError::not_found("Setting", &key))?;
    state.db.settings().set(key, &body.value).await?;
    state.content_changed();
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Logs
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    pub limit: Option<i64>,
}

impl LogQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT)
    }
}

pub async fn transactions(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<Vec<TransactionEntry>>> {
    Ok(Json(state.db.logs().recent_transactions(query.limit()).await?))
}

pub async fn topups(State(state): State<AppState>, Query(query): Query<LogQuery>) -> ApiResult<Json<Vec<TopupEntry>>> {
    Ok(Json(state.db.logs().recent_topups(query.limit()).await?))
}

pub async fn restocks(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<Vec<RestockEntry>>> {
    Ok(Json(state.db.logs().recent_restocks(query.limit()).await?))
}

// =============================================================================
// Terminal Control
// =============================================================================

pub async fn refresh(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state.markers.touch_refresh()?;
    info!("Terminal refresh requested");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn stop(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state.markers.raise_exit()?;
    info!("Terminal stop requested");
    Ok(StatusCode::ACCEPTED)
}
