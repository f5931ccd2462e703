use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{PasswordReset, Repository, Session, User};
use crate::glucose::{NewReading, Reading};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    sessions: Vec<Session>,
    resets: Vec<PasswordReset>,
    readings: Vec<(Uuid, Reading)>,
}

/// In-process repository backing router tests.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> anyhow::Result<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        full_name: Option<&str>,
    ) -> anyhow::Result<User> {
        let mut t = self.tables.write().await;
        anyhow::ensure!(
            t.users.iter().all(|u| u.email != email),
            "duplicate email {email}"
        );
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            full_name: full_name.map(str::to_string),
            password_hash: password_hash.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        t.users.push(user.clone());
        Ok(user)
    }

    async fn create_session(&self, user_id: Uuid, expires_at: OffsetDateTime) -> anyhow::Result<Session> {
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            created_at: OffsetDateTime::now_utc(),
            expires_at,
            revoked_at: None,
        };
        self.tables.write().await.sessions.push(session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: Uuid) -> anyhow::Result<Option<Session>> {
        let t = self.tables.read().await;
        Ok(t.sessions.iter().find(|s| s.id == session_id).cloned())
    }

    async fn sign_out(&self, session_id: Uuid) -> anyhow::Result<()> {
        let mut t = self.tables.write().await;
        if let Some(s) = t
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id && s.revoked_at.is_none())
        {
            s.revoked_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn create_password_reset(
        &self,
        reset_id: Uuid,
        user_id: Uuid,
        secret_hash: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        self.tables.write().await.resets.push(PasswordReset {
            id: reset_id,
            user_id,
            secret_hash: secret_hash.to_string(),
            expires_at,
            used_at: None,
        });
        Ok(())
    }

    async fn get_password_reset(&self, reset_id: Uuid) -> anyhow::Result<Option<PasswordReset>> {
        let t = self.tables.read().await;
        Ok(t.resets.iter().find(|r| r.id == reset_id).cloned())
    }

    async fn complete_password_reset(
        &self,
        reset_id: Uuid,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let mut t = self.tables.write().await;
        let Some(reset) = t
            .resets
            .iter_mut()
            .find(|r| r.id == reset_id && r.is_usable(now))
        else {
            return Ok(false);
        };
        reset.used_at = Some(now);
        let user_id = reset.user_id;

        let user = t
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| anyhow::anyhow!("user {user_id} not found"))?;
        user.password_hash = password_hash.to_string();

        for s in t
            .sessions
            .iter_mut()
            .filter(|s| s.user_id == user_id && s.revoked_at.is_none())
        {
            s.revoked_at = Some(now);
        }
        Ok(true)
    }

    async fn list_readings(&self, user_id: Uuid) -> anyhow::Result<Vec<Reading>> {
        let t = self.tables.read().await;
        let mut out: Vec<Reading> = t
            .readings
            .iter()
            .filter(|(owner, _)| *owner == user_id)
            .map(|(_, r)| r.clone())
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(out)
    }

    async fn list_readings_page(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Reading>> {
        let all = self.list_readings(user_id).await?;
        Ok(all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn insert_reading(&self, user_id: Uuid, reading: NewReading) -> anyhow::Result<Reading> {
        let stored = Reading {
            id: Uuid::new_v4(),
            value: reading.value,
            kind: reading.kind,
            timestamp: reading.timestamp,
            notes: reading.notes,
            meal: reading.meal,
            medication: reading.medication,
        };
        self.tables.write().await.readings.push((user_id, stored.clone()));
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glucose::ReadingType;
    use time::{macros::datetime, Duration};

    fn new_reading(value: f64, timestamp: OffsetDateTime) -> NewReading {
        NewReading {
            value,
            kind: ReadingType::Random,
            timestamp,
            notes: None,
            meal: None,
            medication: None,
        }
    }

    #[tokio::test]
    async fn readings_are_scoped_and_newest_first() {
        let repo = MemoryRepository::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let t0 = datetime!(2026-10-16 08:00 UTC);

        repo.insert_reading(alice, new_reading(100.0, t0)).await.unwrap();
        repo.insert_reading(alice, new_reading(120.0, t0 + Duration::hours(2))).await.unwrap();
        repo.insert_reading(bob, new_reading(300.0, t0)).await.unwrap();

        let list = repo.list_readings(alice).await.unwrap();
        assert_eq!(list.iter().map(|r| r.value).collect::<Vec<_>>(), vec![120.0, 100.0]);

        let page = repo.list_readings_page(alice, 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].value, 100.0);
    }

    #[tokio::test]
    async fn sign_out_revokes_session() {
        let repo = MemoryRepository::new();
        let now = OffsetDateTime::now_utc();
        let session = repo
            .create_session(Uuid::new_v4(), now + Duration::hours(1))
            .await
            .unwrap();
        assert!(session.is_active(now));

        repo.sign_out(session.id).await.unwrap();
        repo.sign_out(session.id).await.unwrap();
        let stored = repo.get_session(session.id).await.unwrap().unwrap();
        assert!(!stored.is_active(now));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let repo = MemoryRepository::new();
        repo.create_user("a@b.co", "hash", Some("Ann")).await.unwrap();
        assert!(repo.create_user("a@b.co", "hash", None).await.is_err());
        let found = repo.find_user_by_email("a@b.co").await.unwrap().unwrap();
        assert_eq!(found.full_name.as_deref(), Some("Ann"));
    }

    #[tokio::test]
    async fn password_reset_is_single_use_and_revokes_sessions() {
        let repo = MemoryRepository::new();
        let now = OffsetDateTime::now_utc();
        let user = repo.create_user("r@b.co", "old", None).await.unwrap();
        let session = repo
            .create_session(user.id, now + Duration::hours(1))
            .await
            .unwrap();

        let reset_id = Uuid::new_v4();
        repo.create_password_reset(reset_id, user.id, "secret-hash", now + Duration::minutes(30))
            .await
            .unwrap();

        assert!(repo.complete_password_reset(reset_id, "new", now).await.unwrap());
        assert!(!repo.complete_password_reset(reset_id, "newer", now).await.unwrap());

        let stored = repo.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "new");
        let session = repo.get_session(session.id).await.unwrap().unwrap();
        assert!(!session.is_active(now));
    }

    #[tokio::test]
    async fn expired_password_reset_is_refused() {
        let repo = MemoryRepository::new();
        let now = OffsetDateTime::now_utc();
        let user = repo.create_user("x@b.co", "old", None).await.unwrap();
        let reset_id = Uuid::new_v4();
        repo.create_password_reset(reset_id, user.id, "h", now - Duration::minutes(1))
            .await
            .unwrap();

        assert!(!repo.complete_password_reset(reset_id, "new", now).await.unwrap());
        let stored = repo.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "old");
    }
}
