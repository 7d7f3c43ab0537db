//! # Sessions
//!
//! `POST /login` exchanges the administrator secret for a signed session
//! token (HS256). Every protected route passes through
//! [`require_session`], which expects `Authorization: Bearer <token>`.
//!
//! ```text
//!  POST /login {password} ──► AdminSecret::verify ──► SessionKeys::issue ──► {token}
//!  GET /products  + Bearer ──► require_session ──► SessionKeys::validate ──► handler
//! ```

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use kasse_db::AccessError;
use kasse_sync::BackOfficeSettings;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const SUBJECT: &str = "admin";

/// JWT claims of a back-office session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Signing key and lifetime for session tokens.
pub struct SessionKeys {
    secret: Vec<u8>,
    lifetime_secs: i64,
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("lifetime_secs", &self.lifetime_secs)
            .finish_non_exhaustive()
    }
}

impl SessionKeys {
    pub fn new(secret: impl Into<Vec<u8>>, lifetime_secs: i64) -> Self {
        SessionKeys {
            secret: secret.into(),
            lifetime_secs,
        }
    }

    /// Uses the configured secret, or a random one when it is empty.
    pub fn from_settings(settings: &BackOfficeSettings) -> Self {
        let lifetime = i64::try_from(settings.session_lifetime_secs).unwrap_or(i64::MAX);
        if settings.session_secret.is_empty() {
            info!("No session secret configured; sessions end on restart");
            SessionKeys::new(rand::random::<[u8; 32]>().to_vec(), lifetime)
        } else {
            SessionKeys::new(settings.session_secret.as_bytes(), lifetime)
        }
    }

    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime_secs
    }

    pub fn issue(&self) -> ApiResult<String> {
        let now = Utc::now();
        let expires = Duration::try_seconds(self.lifetime_secs)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| ApiError::internal(format!("session lifetime out of range: {}s", self.lifetime_secs)))?;
        let claims = Claims {
            sub: SUBJECT.to_string(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret)).map_err(ApiError::internal)
    }

    pub fn validate(&self, token: &str) -> ApiResult<Claims> {
        let data = decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &Validation::default())
            .map_err(|e| {
                debug!(error = %e, "Session token rejected");
                ApiError::unauthorized("Session invalid or expired")
            })?;
        Ok(data.claims)
    }
}

/// Rejects requests without a valid bearer token.
pub async fn require_session(State(state): State<AppState>, request: Request, next: Next) -> ApiResult<Response> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("Login required"))?;

    state.sessions.validate(token.trim())?;
    Ok(next.run(request).await)
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: i64,
}

pub async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> ApiResult<Json<LoginResponse>> {
    let secret = state.secret.clone();
    let ok = tokio::task::spawn_blocking(move || secret.verify(&body.password))
        .await
        .map_err(ApiError::internal)??;

    if !ok {
        warn!("Back-office login failed");
        return Err(ApiError::unauthorized("Wrong password"));
    }

    info!("Back-office login");
    Ok(Json(LoginResponse {
        token: state.sessions.issue()?,
        expires_in: state.sessions.lifetime_secs(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct PasswordChange {
    pub old: String,
    pub new: String,
    pub confirm: String,
}

pub async fn change_password(
    State(state): State<AppState>,
    Json(body): Json<PasswordChange>,
) -> ApiResult<StatusCode> {
    if body.new.is_empty() {
        return Err(ApiError::validation("New password must not be empty"));
    }
    if body.new != body.confirm {
        return Err(ApiError::validation("New password and confirmation differ"));
    }

    let secret = state.secret.clone();
    tokio::task::spawn_blocking(move || -> Result<ApiResult<()>, AccessError> {
        if !secret.verify(&body.old)? {
            return Ok(Err(ApiError::unauthorized("Wrong password")));
        }
        secret.set(&body.new).map(Ok)
    })
    .await
    .map_err(ApiError::internal)???;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_token_validates() {
        let keys = SessionKeys::new(b"test-secret".to_vec(), 60);
        let token = keys.issue().unwrap();
        let claims = keys.validate(&token).unwrap();
        assert_eq!(claims.sub, "admin");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_token_from_other_key_is_rejected() {
        let token = SessionKeys::new(b"one".to_vec(), 60).issue().unwrap();
        let err = SessionKeys::new(b"two".to_vec(), 60).validate(&token).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Unauthorized);
    }

    #[test]
    fn test_out_of_range_lifetime_is_an_error() {
        let settings = BackOfficeSettings {
            session_lifetime_secs: u64::MAX,
            ..BackOfficeSettings::default()
        };
        let err = SessionKeys::from_settings(&settings).issue().unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Internal);
    }

    #[test]
    fn test_empty_secret_generates_key() {
        let keys = SessionKeys::from_settings(&BackOfficeSettings::default());
        assert_eq!(keys.secret.len(), 32);
        assert_eq!(keys.lifetime_secs(), 8 * 60 * 60);
    }
}
