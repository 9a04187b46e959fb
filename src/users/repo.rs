use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{NewUser, OneTimeKind, RefreshTokenRecord, User};

#[derive(Debug, Error)]
pub enum RepoError {
    /// A unique index rejected the write; carries the offending field.
    #[error("duplicate {0}")]
    Duplicate(&'static str),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.code().is_some_and(|code| code.as_ref() == "23505") {
                let field = match db.constraint() {
                    Some(c) if c.contains("name") => "name",
                    _ => "email",
                };
                return RepoError::Duplicate(field);
            }
        }
        RepoError::Other(anyhow::Error::new(e))
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence for users and their refresh-token row.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn insert_user(&self, new: NewUser) -> RepoResult<User>;
    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn find_by_name(&self, name: &str) -> RepoResult<Option<User>>;
    async fn list_users(&self) -> RepoResult<Vec<User>>;

    async fn set_one_time_token(
        &self,
        user_id: Uuid,
        kind: OneTimeKind,
        token_hash: Option<String>,
        expires_at: Option<OffsetDateTime>,
    ) -> RepoResult<()>;
    /// Clears and returns the user whose unexpired token matches `token_hash`.
    async fn consume_one_time_token(
        &self,
        kind: OneTimeKind,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> RepoResult<Option<User>>;

    async fn update_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> RepoResult<()>;
    async fn mark_email_verified(&self, user_id: Uuid) -> RepoResult<Option<User>>;
    async fn update_name(&self, user_id: Uuid, name: &str) -> RepoResult<Option<User>>;
    async fn update_photo(&self, user_id: Uuid, photo: &str) -> RepoResult<Option<User>>;
    async fn set_active(&self, user_id: Uuid, active: bool) -> RepoResult<bool>;
    async fn delete_user(&self, user_id: Uuid) -> RepoResult<Option<User>>;

    async fn delete_refresh_tokens(&self, user_id: Uuid) -> RepoResult<()>;
    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> RepoResult<()>;
    /// Deletes the user's row only if it holds `token_hash`; true when it did.
    async fn take_refresh_token(&self, user_id: Uuid, token_hash: &str) -> RepoResult<bool>;
}

const USER_COLUMNS: &str = r#"
    id, name, email, password_hash, role, auth_type, email_verified, active, photo,
    password_changed_at, verify_email_token, verify_email_expires,
    password_reset_token, password_reset_expires, created_at, updated_at
"#;

fn token_columns(kind: OneTimeKind) -> (&'static str, &'static str) {
    match kind {
        OneTimeKind::VerifyEmail => ("verify_email_token", "verify_email_expires"),
        OneTimeKind::PasswordReset => ("password_reset_token", "password_reset_expires"),
    }
}

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn insert_user(&self, new: NewUser) -> RepoResult<User> {
        let sql = format!(
            "INSERT INTO users (name, email, password_hash, auth_type) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(&new.name)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(new.auth_type)
            .fetch_one(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn find_by_name(&self, name: &str) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE name = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(name)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC");
        Ok(sqlx::query_as::<_, User>(&sql).fetch_all(&self.db).await?)
    }

    async fn set_one_time_token(
        &self,
        user_id: Uuid,
        kind: OneTimeKind,
        token_hash: Option<String>,
        expires_at: Option<OffsetDateTime>,
    ) -> RepoResult<()> {
        let (token_col, expires_col) = token_columns(kind);
        let sql = format!(
            "UPDATE users SET {token_col} = $2, {expires_col} = $3, updated_at = now() WHERE id = $1"
        );
        sqlx::query(&sql)
            .bind(user_id)
            .bind(token_hash)
            .bind(expires_at)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn consume_one_time_token(
        &self,
        kind: OneTimeKind,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> RepoResult<Option<User>> {
        let (token_col, expires_col) = token_columns(kind);
        // single statement so two concurrent consumers cannot both win
        let sql = format!(
            "UPDATE users SET {token_col} = NULL, {expires_col} = NULL, updated_at = now() \
             WHERE {token_col} = $1 AND {expires_col} > $2 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> RepoResult<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $2, password_changed_at = $3,
                   password_reset_token = NULL, password_reset_expires = NULL,
                   updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(password_hash)
        .bind(changed_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> RepoResult<Option<User>> {
        let sql = format!(
            "UPDATE users SET email_verified = TRUE, updated_at = now() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn update_name(&self, user_id: Uuid, name: &str) -> RepoResult<Option<User>> {
        let sql = format!(
            "UPDATE users SET name = $2, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(name)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn update_photo(&self, user_id: Uuid, photo: &str) -> RepoResult<Option<User>> {
        let sql = format!(
            "UPDATE users SET photo = $2, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(photo)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn set_active(&self, user_id: Uuid, active: bool) -> RepoResult<bool> {
        let res = sqlx::query("UPDATE users SET active = $2, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .bind(active)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn delete_user(&self, user_id: Uuid) -> RepoResult<Option<User>> {
        // refresh_tokens rows go with it via ON DELETE CASCADE
        let sql = format!("DELETE FROM users WHERE id = $1 RETURNING {USER_COLUMNS}");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn delete_refresh_tokens(&self, user_id: Uuid) -> RepoResult<()> {
        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id)
            DO UPDATE SET token_hash = EXCLUDED.token_hash, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.expires_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn take_refresh_token(&self, user_id: Uuid, token_hash: &str) -> RepoResult<bool> {
        let taken: Option<Uuid> = sqlx::query_scalar(
            r#"
            DELETE FROM refresh_tokens
             WHERE user_id = $1 AND token_hash = $2
            RETURNING user_id
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .fetch_optional(&self.db)
        .await?;
        Ok(taken.is_some())
    }
}
