use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use time::OffsetDateTime;
use tracing::{error, warn};
use uuid::Uuid;

use super::jwt::JwtKeys;
use crate::state::AppState;

/// Authenticated caller: a valid access token whose session is still active.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub session_id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Missing Authorization header".to_string(),
            ))?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization header".to_string(),
            ))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify_access(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            (
                StatusCode::UNAUTHORIZED,
                "Invalid or expired token".to_string(),
            )
        })?;

        let session = state.repo.get_session(claims.sid).await.map_err(|e| {
            error!(error = %e, session_id = %claims.sid, "session lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

        match session {
            Some(s) if s.user_id == claims.sub && s.is_active(OffsetDateTime::now_utc()) => {
                Ok(AuthUser {
                    user_id: claims.sub,
                    session_id: claims.sid,
                })
            }
            _ => {
                warn!(user_id = %claims.sub, session_id = %claims.sid, "session inactive");
                Err((StatusCode::UNAUTHORIZED, "Session expired".to_string()))
            }
        }
    }
}
