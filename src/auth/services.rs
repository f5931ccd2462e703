use std::fmt;

use anyhow::Context;
use axum::extract::FromRef;
use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::info;
use uuid::Uuid;

use super::{
    dto::{AuthResponse, PublicUser},
    jwt::JwtKeys,
    password::{hash_password, verify_password},
};
use crate::{repo::User, state::AppState};

const RESET_SECRET_LEN: usize = 43;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn normalize_name(name: Option<&str>) -> Option<String> {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

/// Password reset token as handed to the user: `<reset id>.<secret>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResetToken {
    pub reset_id: Uuid,
    pub secret: String,
}

impl ResetToken {
    fn generate() -> Self {
        let secret = OsRng
            .sample_iter(&Alphanumeric)
            .take(RESET_SECRET_LEN)
            .map(char::from)
            .collect();
        Self {
            reset_id: Uuid::new_v4(),
            secret,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (id, secret) = raw.trim().split_once('.')?;
        if secret.is_empty() {
            return None;
        }
        Some(Self {
            reset_id: id.parse().ok()?,
            secret: secret.to_string(),
        })
    }
}

impl fmt::Display for ResetToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.reset_id, self.secret)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    #[error("Invalid or expired reset token")]
    InvalidToken,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Store a new reset for `user` and return the token to deliver.
pub async fn issue_password_reset(state: &AppState, user: &User) -> anyhow::Result<ResetToken> {
    let token = ResetToken::generate();
    let secret_hash = hash_password(&token.secret)?;
    let expires_at =
        OffsetDateTime::now_utc() + Duration::minutes(state.config.password_reset_ttl_minutes);

    state
        .repo
        .create_password_reset(token.reset_id, user.id, &secret_hash, expires_at)
        .await
        .context("create password reset")?;
    Ok(token)
}

/// Check `raw_token`, set the new password and revoke the user's sessions.
pub async fn confirm_password_reset(
    state: &AppState,
    raw_token: &str,
    new_password: &str,
) -> Result<Uuid, ResetError> {
    let token = ResetToken::parse(raw_token).ok_or(ResetError::InvalidToken)?;
    let now = OffsetDateTime::now_utc();

    let reset = state
        .repo
        .get_password_reset(token.reset_id)
        .await
        .context("get password reset")?
        .filter(|r| r.is_usable(now))
        .ok_or(ResetError::InvalidToken)?;
    if !verify_password(&token.secret, &reset.secret_hash)? {
        return Err(ResetError::InvalidToken);
    }

    let password_hash = hash_password(new_password)?;
    let completed = state
        .repo
        .complete_password_reset(reset.id, &password_hash, now)
        .await
        .context("complete password reset")?;
    if !completed {
        return Err(ResetError::InvalidToken);
    }
    info!(user_id = %reset.user_id, reset_id = %reset.id, "password reset completed");
    Ok(reset.user_id)
}

/// Open a new session for `user` and sign an access/refresh pair bound to it.
pub async fn start_session(state: &AppState, user: User) -> anyhow::Result<AuthResponse> {
    let keys = JwtKeys::from_ref(state);
    let session = state
        .repo
        .create_session(user.id, keys.session_expiry())
        .await
        .context("create session")?;

    let access_token = keys.sign_access(user.id, session.id)?;
    let refresh_token = keys.sign_refresh(user.id, session.id)?;

    info!(user_id = %user.id, session_id = %session.id, "session started");
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: PublicUser::from(user),
    })
}
