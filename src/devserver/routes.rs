//! Auth route handlers

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::jwt::TokenKind;
use super::server::SharedState;
use crate::auth::models::User;
use crate::client::{AuthResponse, ErrorBody, LoginRequest, RefreshRequest};

type Reply<T> = Result<Json<T>, (StatusCode, Json<ErrorBody>)>;

fn reject(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        status,
        Json(ErrorBody {
            message: Some(message.into()),
            error: None,
        }),
    )
}

/// Extract the bearer token from the Authorization header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub accounts: usize,
}

pub async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(Health {
        status: "healthy",
        accounts: state.users.len(),
    })
}

pub async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Reply<AuthResponse> {
    let Some(user) = state.users.authenticate(&req.email, &req.password) else {
        warn!(email = %req.email, "Rejected login");
        return Err(reject(StatusCode::UNAUTHORIZED, "Invalid email or password"));
    };

    let sid = uuid::Uuid::new_v4().to_string();
    let issued = state
        .issuer
        .issue_pair(user, &sid)
        .map_err(|e| reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!(user_id = %user.id, sid = %sid, "Issued session");
    Ok(Json(AuthResponse {
        user: user.clone(),
        access_token: issued.tokens.access_token,
        refresh_token: issued.tokens.refresh_token,
        expires_in: issued.expires_in,
    }))
}

pub async fn refresh(
    State(state): State<SharedState>,
    Json(req): Json<RefreshRequest>,
) -> Reply<AuthResponse> {
    let claims = state
        .issuer
        .validate(&req.refresh_token, TokenKind::Refresh)
        .map_err(|_| reject(StatusCode::UNAUTHORIZED, "Invalid refresh token"))?;

    if state.is_revoked(&claims.sid).await {
        return Err(reject(StatusCode::UNAUTHORIZED, "Session has been logged out"));
    }

    // Rotation: every refresh token is good for exactly one exchange
    if !state.mark_refresh_used(&claims.jti, claims.exp).await {
        warn!(sid = %claims.sid, "Refresh token replayed, revoking session");
        state.revoke_session(&claims.sid).await;
        return Err(reject(StatusCode::UNAUTHORIZED, "Refresh token already used"));
    }

    let user = state
        .users
        .find(&claims.sub)
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Unknown user"))?;

    let issued = state
        .issuer
        .issue_pair(user, &claims.sid)
        .map_err(|e| reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    debug!(user_id = %user.id, sid = %claims.sid, "Refreshed session");
    Ok(Json(AuthResponse {
        user: user.clone(),
        access_token: issued.tokens.access_token,
        refresh_token: issued.tokens.refresh_token,
        expires_in: issued.expires_in,
    }))
}

/// Always succeeds; a recognisable token revokes its session
pub async fn logout(State(state): State<SharedState>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = bearer_token(&headers) {
        match state.issuer.validate_allow_expired(token, TokenKind::Access) {
            Ok(claims) => {
                info!(user_id = %claims.sub, sid = %claims.sid, "Session logged out");
                state.revoke_session(&claims.sid).await;
            }
            Err(e) => debug!(error = %e, "Logout with unrecognised token"),
        }
    }
    StatusCode::NO_CONTENT
}

pub async fn me(State(state): State<SharedState>, headers: HeaderMap) -> Reply<User> {
    let token = bearer_token(&headers)
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Missing bearer token"))?;

    let claims = state
        .issuer
        .validate(token, TokenKind::Access)
        .map_err(|_| reject(StatusCode::UNAUTHORIZED, "Invalid or expired token"))?;

    if state.is_revoked(&claims.sid).await {
        return Err(reject(StatusCode::UNAUTHORIZED, "Session has been logged out"));
    }

    state
        .users
        .find(&claims.sub)
        .cloned()
        .map(Json)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, "Unknown user"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
