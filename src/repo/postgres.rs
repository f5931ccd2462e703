use anyhow::Context;
use async_trait::async_trait;
use sqlx::{migrate::Migrator, postgres::PgPoolOptions, FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{PasswordReset, Repository, Session, User};
use crate::glucose::{NewReading, Reading, ReadingType};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, FromRow)]
struct ReadingRow {
    id: Uuid,
    value: f64,
    #[sqlx(rename = "type")]
    kind: String,
    timestamp: OffsetDateTime,
    notes: Option<String>,
    meal: Option<String>,
    medication: Option<String>,
}

impl From<ReadingRow> for Reading {
    fn from(r: ReadingRow) -> Self {
        Self {
            id: r.id,
            value: r.value,
            kind: ReadingType::from(r.kind),
            timestamp: r.timestamp,
            notes: r.notes,
            meal: r.meal,
            medication: r.medication,
        }
    }
}

#[derive(Clone)]
pub struct PgRepository {
    db: PgPool,
}

impl PgRepository {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { db })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        MIGRATOR
            .run(&self.db)
            .await
            .context("run migrations")?;
        Ok(())
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, full_name, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"SELECT id, email, full_name, password_hash, created_at FROM users WHERE id = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        full_name: Option<&str>,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, full_name)
            VALUES ($1, $2, $3)
            RETURNING id, email, full_name, password_hash, created_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(full_name)
        .fetch_one(&self.db)
        .await
        .context("insert user")?;
        Ok(user)
    }

    async fn create_session(&self, user_id: Uuid, expires_at: OffsetDateTime) -> anyhow::Result<Session> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (user_id, expires_at)
            VALUES ($1, $2)
            RETURNING id, user_id, created_at, expires_at, revoked_at
            "#,
        )
        .bind(user_id)
        .bind(expires_at)
        .fetch_one(&self.db)
        .await
        .context("insert session")?;
        Ok(session)
    }

    async fn get_session(&self, session_id: Uuid) -> anyhow::Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, user_id, created_at, expires_at, revoked_at
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.db)
        .await
        .context("get session")?;
        Ok(session)
    }

    async fn sign_out(&self, session_id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE sessions
               SET revoked_at = now()
             WHERE id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(session_id)
        .execute(&self.db)
        .await
        .context("revoke session")?;
        Ok(())
    }

    async fn create_password_reset(
        &self,
        reset_id: Uuid,
        user_id: Uuid,
        secret_hash: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO password_resets (id, user_id, secret_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(reset_id)
        .bind(user_id)
        .bind(secret_hash)
        .bind(expires_at)
        .execute(&self.db)
        .await
        .context("insert password reset")?;
        Ok(())
    }

    async fn get_password_reset(&self, reset_id: Uuid) -> anyhow::Result<Option<PasswordReset>> {
        let reset = sqlx::query_as::<_, PasswordReset>(
            r#"
            SELECT id, user_id, secret_hash, expires_at, used_at
              FROM password_resets
             WHERE id = $1
            "#,
        )
        .bind(reset_id)
        .fetch_optional(&self.db)
        .await
        .context("get password reset")?;
        Ok(reset)
    }

    async fn complete_password_reset(
        &self,
        reset_id: Uuid,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let mut tx = self.db.begin().await.context("begin password reset")?;

        let user_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE password_resets
               SET used_at = $2
             WHERE id = $1 AND used_at IS NULL AND expires_at > $2
         RETURNING user_id
            "#,
        )
        .bind(reset_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .context("consume password reset")?;

        let Some(user_id) = user_id else {
            return Ok(false);
        };

        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&mut *tx)
            .await
            .context("update password")?;

        sqlx::query(
            r#"
            UPDATE sessions
               SET revoked_at = $2
             WHERE user_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("revoke user sessions")?;

        tx.commit().await.context("commit password reset")?;
        Ok(true)
    }

    async fn list_readings(&self, user_id: Uuid) -> anyhow::Result<Vec<Reading>> {
        let rows = sqlx::query_as::<_, ReadingRow>(
            r#"
            SELECT id, value, type, timestamp, notes, meal, medication
              FROM blood_sugar_readings
             WHERE user_id = $1
             ORDER BY timestamp DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list readings")?;
        Ok(rows.into_iter().map(Reading::from).collect())
    }

    async fn list_readings_page(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Reading>> {
        let rows = sqlx::query_as::<_, ReadingRow>(
            r#"
            SELECT id, value, type, timestamp, notes, meal, medication
              FROM blood_sugar_readings
             WHERE user_id = $1
             ORDER BY timestamp DESC
             LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("list readings page")?;
        Ok(rows.into_iter().map(Reading::from).collect())
    }

    async fn insert_reading(&self, user_id: Uuid, reading: NewReading) -> anyhow::Result<Reading> {
        let row = sqlx::query_as::<_, ReadingRow>(
            r#"
            INSERT INTO blood_sugar_readings (user_id, value, type, timestamp, notes, meal, medication)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, value, type, timestamp, notes, meal, medication
            "#,
        )
        .bind(user_id)
        .bind(reading.value)
        .bind(reading.kind.as_str())
        .bind(reading.timestamp)
        .bind(reading.notes)
        .bind(reading.meal)
        .bind(reading.medication)
        .fetch_one(&self.db)
        .await
        .context("insert reading")?;
        Ok(row.into())
    }
}

#[cfg(test)]
mod tests {
    use super::MIGRATOR;

    #[test]
    fn embedded_migrations_carry_reading_constraints() {
        let sql: String = MIGRATOR.iter().map(|m| m.sql.to_string()).collect();
        assert!(sql.contains("value > 0 AND value <> 'NaN'"));
        assert!(sql.contains("CHECK (value <= 1000)"));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS password_resets"));
    }

    #[test]
    fn migrations_are_ordered() {
        let versions: Vec<i64> = MIGRATOR.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 2]);
    }
}
