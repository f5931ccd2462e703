use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::glucose::{NewReading, Reading};

#[cfg(test)]
pub mod memory;
pub mod postgres;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Login session. Tokens carry its id; revoking it invalidates them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
}

impl Session {
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Pending password reset. The emailed token is `<id>.<secret>`; only an
/// Argon2 hash of the secret is stored.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordReset {
    pub id: Uuid,
    pub user_id: Uuid,
    pub secret_hash: String,
    pub expires_at: OffsetDateTime,
    pub used_at: Option<OffsetDateTime>,
}

impl PasswordReset {
    pub fn is_usable(&self, now: OffsetDateTime) -> bool {
        self.used_at.is_none() && self.expires_at > now
    }
}

/// Persistence and auth provider. Injected through `AppState`.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_user_by_id(&self, user_id: Uuid) -> anyhow::Result<Option<User>>;
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        full_name: Option<&str>,
    ) -> anyhow::Result<User>;

    async fn create_session(&self, user_id: Uuid, expires_at: OffsetDateTime) -> anyhow::Result<Session>;
    async fn get_session(&self, session_id: Uuid) -> anyhow::Result<Option<Session>>;
    /// Revoke a session. Revoking twice is not an error.
    async fn sign_out(&self, session_id: Uuid) -> anyhow::Result<()>;

    async fn create_password_reset(
        &self,
        reset_id: Uuid,
        user_id: Uuid,
        secret_hash: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()>;
    async fn get_password_reset(&self, reset_id: Uuid) -> anyhow::Result<Option<PasswordReset>>;
    /// Consume a usable reset: mark it used, store the new hash and revoke
    /// every session of its user. Returns `false` when the reset was already
    /// used or has expired.
    async fn complete_password_reset(
        &self,
        reset_id: Uuid,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool>;

    /// All readings of a user, newest first.
    async fn list_readings(&self, user_id: Uuid) -> anyhow::Result<Vec<Reading>>;
    async fn list_readings_page(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Reading>>;
    async fn insert_reading(&self, user_id: Uuid, reading: NewReading) -> anyhow::Result<Reading>;
}
