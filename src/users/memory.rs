use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::repo::{RepoError, RepoResult, UserRepo};
use super::repo_types::{
    AuthType, NewUser, OneTimeKind, RefreshTokenRecord, Role, User, DEFAULT_PHOTO,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    refresh_tokens: HashMap<Uuid, RefreshTokenRecord>,
}

/// In-process `UserRepo` mirroring the Postgres constraints.
#[derive(Default)]
pub struct MemoryUserRepo {
    tables: Mutex<Tables>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn refresh_token_count(&self, user_id: Uuid) -> usize {
        let t = self.tables.lock().await;
        t.refresh_tokens.values().filter(|r| r.user_id == user_id).count()
    }

    pub async fn refresh_token(&self, user_id: Uuid) -> Option<RefreshTokenRecord> {
        self.tables.lock().await.refresh_tokens.get(&user_id).cloned()
    }

    pub async fn set_role(&self, user_id: Uuid, role: Role) {
        let mut t = self.tables.lock().await;
        if let Some(u) = t.users.get_mut(&user_id) {
            u.role = role;
        }
    }

    pub async fn user_count(&self) -> usize {
        self.tables.lock().await.users.len()
    }
}

fn token_slots(user: &mut User, kind: OneTimeKind) -> (&mut Option<String>, &mut Option<OffsetDateTime>) {
    match kind {
        OneTimeKind::VerifyEmail => (&mut user.verify_email_token, &mut user.verify_email_expires),
        OneTimeKind::PasswordReset => (
            &mut user.password_reset_token,
            &mut user.password_reset_expires,
        ),
    }
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn insert_user(&self, new: NewUser) -> RepoResult<User> {
        let mut t = self.tables.lock().await;
        if t.users.values().any(|u| u.email == new.email) {
            return Err(RepoError::Duplicate("email"));
        }
        if t.users.values().any(|u| u.name == new.name) {
            return Err(RepoError::Duplicate("name"));
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            role: Role::User,
            auth_type: new.auth_type,
            email_verified: false,
            active: true,
            photo: DEFAULT_PHOTO.to_string(),
            password_changed_at: None,
            verify_email_token: None,
            verify_email_expires: None,
            password_reset_token: None,
            password_reset_expires: None,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_name(&self, name: &str) -> RepoResult<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.values().find(|u| u.name == name).cloned())
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        let t = self.tables.lock().await;
        let mut users: Vec<User> = t.users.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn set_one_time_token(
        &self,
        user_id: Uuid,
        kind: OneTimeKind,
        token_hash: Option<String>,
        expires_at: Option<OffsetDateTime>,
    ) -> RepoResult<()> {
        let mut t = self.tables.lock().await;
        if let Some(u) = t.users.get_mut(&user_id) {
            let (token, expires) = token_slots(u, kind);
            *token = token_hash;
            *expires = expires_at;
        }
        Ok(())
    }

    async fn consume_one_time_token(
        &self,
        kind: OneTimeKind,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> RepoResult<Option<User>> {
        let mut t = self.tables.lock().await;
        for u in t.users.values_mut() {
            let (token, expires) = token_slots(u, kind);
            let live = token.as_deref() == Some(token_hash) && expires.is_some_and(|e| e > now);
            if live {
                *token = None;
                *expires = None;
                return Ok(Some(u.clone()));
            }
        }
        Ok(None)
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> RepoResult<()> {
        let mut t = self.tables.lock().await;
        if let Some(u) = t.users.get_mut(&user_id) {
            u.password_hash = password_hash.to_string();
            u.password_changed_at = Some(changed_at);
            u.password_reset_token = None;
            u.password_reset_expires = None;
        }
        Ok(())
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> RepoResult<Option<User>> {
        let mut t = self.tables.lock().await;
        Ok(t.users.get_mut(&user_id).map(|u| {
            u.email_verified = true;
            u.clone()
        }))
    }

    async fn update_name(&self, user_id: Uuid, name: &str) -> RepoResult<Option<User>> {
        let mut t = self.tables.lock().await;
        if t.users.values().any(|u| u.name == name && u.id != user_id) {
            return Err(RepoError::Duplicate("name"));
        }
        Ok(t.users.get_mut(&user_id).map(|u| {
            u.name = name.to_string();
            u.clone()
        }))
    }

    async fn update_photo(&self, user_id: Uuid, photo: &str) -> RepoResult<Option<User>> {
        let mut t = self.tables.lock().await;
        Ok(t.users.get_mut(&user_id).map(|u| {
            u.photo = photo.to_string();
            u.clone()
        }))
    }

    async fn set_active(&self, user_id: Uuid, active: bool) -> RepoResult<bool> {
        let mut t = self.tables.lock().await;
        Ok(t.users
            .get_mut(&user_id)
            .map(|u| u.active = active)
            .is_some())
    }

    async fn delete_user(&self, user_id: Uuid) -> RepoResult<Option<User>> {
        let mut t = self.tables.lock().await;
        t.refresh_tokens.remove(&user_id);
        Ok(t.users.remove(&user_id))
    }

    async fn delete_refresh_tokens(&self, user_id: Uuid) -> RepoResult<()> {
        self.tables.lock().await.refresh_tokens.remove(&user_id);
        Ok(())
    }

    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> RepoResult<()> {
        let mut t = self.tables.lock().await;
        t.refresh_tokens.insert(record.user_id, record);
        Ok(())
    }

    async fn take_refresh_token(&self, user_id: Uuid, token_hash: &str) -> RepoResult<bool> {
        let mut t = self.tables.lock().await;
        match t.refresh_tokens.get(&user_id) {
            Some(row) if row.token_hash == token_hash => {
                t.refresh_tokens.remove(&user_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn new_user(name: &str, email: &str) -> NewUser {
        NewUser {
            name: name.into(),
            email: email.into(),
            password_hash: "hash".into(),
            auth_type: AuthType::Email,
        }
    }

    #[tokio::test]
    async fn insert_enforces_unique_email_and_name() {
        let repo = MemoryUserRepo::new();
        repo.insert_user(new_user("alice", "a@example.com")).await.unwrap();
        let dup_email = repo.insert_user(new_user("alice2", "a@example.com")).await;
        assert!(matches!(dup_email, Err(RepoError::Duplicate("email"))));
        let dup_name = repo.insert_user(new_user("alice", "b@example.com")).await;
        assert!(matches!(dup_name, Err(RepoError::Duplicate("name"))));
    }

    #[tokio::test]
    async fn consume_ignores_expired_tokens() {
        let repo = MemoryUserRepo::new();
        let user = repo.insert_user(new_user("bob1", "b@example.com")).await.unwrap();
        let now = OffsetDateTime::now_utc();
        repo.set_one_time_token(
            user.id,
            OneTimeKind::PasswordReset,
            Some("h".into()),
            Some(now - Duration::seconds(1)),
        )
        .await
        .unwrap();
        let got = repo
            .consume_one_time_token(OneTimeKind::PasswordReset, "h", now)
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn delete_user_drops_refresh_row() {
        let repo = MemoryUserRepo::new();
        let user = repo.insert_user(new_user("carol", "c@example.com")).await.unwrap();
        repo.insert_refresh_token(RefreshTokenRecord {
            user_id: user.id,
            token_hash: "x".into(),
            expires_at: OffsetDateTime::now_utc(),
        })
        .await
        .unwrap();
        assert!(repo.delete_user(user.id).await.unwrap().is_some());
        assert_eq!(repo.refresh_token_count(user.id).await, 0);
    }
}
