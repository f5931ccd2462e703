use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, PasswordResetConfirm, PasswordResetRequest, PublicUser,
            RefreshRequest, RegisterRequest,
        },
        extractors::AuthUser,
        jwt::JwtKeys,
        password::{hash_password, verify_password, MIN_PASSWORD_LEN},
        services::{
            confirm_password_reset, is_valid_email, issue_password_reset, normalize_email,
            normalize_name, start_session, ResetError,
        },
    },
    repo::Session,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/session", get(current_session))
        .route("/auth/password-reset", post(request_password_reset))
        .route("/auth/password-reset/confirm", post(confirm_reset))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), (StatusCode, String)> {
    payload.email = normalize_email(&payload.email);

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    match state.repo.find_user_by_email(&payload.email).await {
        Ok(Some(_)) => {
            warn!(email = %payload.email, "email already registered");
            return Err((StatusCode::CONFLICT, "Email already registered".into()));
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "find_user_by_email failed");
            return Err(internal(e));
        }
    }

    let hash = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        internal(e)
    })?;
    let full_name = normalize_name(payload.full_name.as_deref());

    let user = state
        .repo
        .create_user(&payload.email, &hash, full_name.as_deref())
        .await
        .map_err(|e| {
            error!(error = %e, "create user failed");
            internal(e)
        })?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    let resp = start_session(&state, user).await.map_err(|e| {
        error!(error = %e, "start_session failed");
        internal(e)
    })?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    payload.email = normalize_email(&payload.email);

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    let user = match state.repo.find_user_by_email(&payload.email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(email = %payload.email, "login unknown email");
            return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
        }
        Err(e) => {
            error!(error = %e, "find_user_by_email failed");
            return Err(internal(e));
        }
    };

    let ok = verify_password(&payload.password, &user.password_hash).map_err(|e| {
        error!(error = %e, "verify_password failed");
        internal(e)
    })?;

    if !ok {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    let resp = start_session(&state, user).await.map_err(|e| {
        error!(error = %e, "start_session failed");
        internal(e)
    })?;
    Ok(Json(resp))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    let session = state.repo.get_session(claims.sid).await.map_err(internal)?;
    let active = session
        .map(|s| s.user_id == claims.sub && s.is_active(OffsetDateTime::now_utc()))
        .unwrap_or(false);
    if !active {
        warn!(user_id = %claims.sub, session_id = %claims.sid, "refresh on inactive session");
        return Err((StatusCode::UNAUTHORIZED, "Session expired".into()));
    }

    let user = state
        .repo
        .find_user_by_id(claims.sub)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;

    // Same session, fresh pair
    let access_token = keys.sign_access(user.id, claims.sid).map_err(internal)?;
    let refresh_token = keys.sign_refresh(user.id, claims.sid).map_err(internal)?;

    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: PublicUser::from(user),
    }))
}

#[instrument(skip(state))]
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<StatusCode, (StatusCode, String)> {
    state.repo.sign_out(auth.session_id).await.map_err(|e| {
        error!(error = %e, session_id = %auth.session_id, "sign_out failed");
        internal(e)
    })?;
    info!(user_id = %auth.user_id, session_id = %auth.session_id, "user signed out");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn current_session(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Session>, (StatusCode, String)> {
    state
        .repo
        .get_session(auth.session_id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or((StatusCode::UNAUTHORIZED, "Session not found".to_string()))
}

/// Always 202 for a well-formed email, whether or not an account exists.
#[instrument(skip(state, payload))]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    match state.repo.find_user_by_email(&email).await {
        Ok(Some(user)) => match issue_password_reset(&state, &user).await {
            Ok(token) => {
                info!(user_id = %user.id, reset_id = %token.reset_id, "password reset issued");
                // no mail transport; the token is only surfaced in debug logs
                debug!(user_id = %user.id, token = %token, "password reset token");
            }
            Err(e) => error!(error = %e, user_id = %user.id, "issue_password_reset failed"),
        },
        Ok(None) => info!(email = %email, "password reset for unknown email"),
        Err(e) => error!(error = %e, "find_user_by_email failed"),
    }
    Ok(StatusCode::ACCEPTED)
}

#[instrument(skip(state, payload))]
pub async fn confirm_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetConfirm>,
) -> Result<StatusCode, (StatusCode, String)> {
    if payload.new_password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    match confirm_password_reset(&state, &payload.token, &payload.new_password).await {
        Ok(user_id) => {
            info!(user_id = %user_id, "password changed; sessions revoked");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(ResetError::InvalidToken) => {
            warn!("password reset with invalid token");
            Err((StatusCode::BAD_REQUEST, ResetError::InvalidToken.to_string()))
        }
        Err(ResetError::Other(e)) => {
            error!(error = %e, "confirm_password_reset failed");
            Err(internal(e))
        }
    }
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let user = state
        .repo
        .find_user_by_id(auth.user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            error!(user_id = %auth.user_id, "user not found");
            (StatusCode::UNAUTHORIZED, "User not found".to_string())
        })?;

    Ok(Json(PublicUser::from(user)))
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
