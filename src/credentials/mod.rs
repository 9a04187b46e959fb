//! Owner of all persisted user and refresh-token state.
//!
//! Every write that touches a password runs the same pipeline:
//! validate, hash, persist.

pub mod one_time;
pub mod password;

use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::users::repo::{RepoError, UserRepo};
use crate::users::repo_types::{AuthType, NewUser, OneTimeKind, RefreshTokenRecord, User};

pub const VERIFY_EMAIL_TTL: Duration = Duration::hours(24);
pub const PASSWORD_RESET_TTL: Duration = Duration::minutes(10);

const NAME_MIN: usize = 4;
const NAME_MAX: usize = 50;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn validate_name(name: &str) -> AppResult<()> {
    let len = name.chars().count();
    if len < NAME_MIN {
        return Err(AppError::validation(format!(
            "Name can not be less than {NAME_MIN} characters"
        )));
    }
    if len > NAME_MAX {
        return Err(AppError::validation(format!(
            "Name can not be more than {NAME_MAX} characters"
        )));
    }
    Ok(())
}

/// Checks a raw password and its confirmation before anything is hashed.
pub(crate) fn validate_new_password(raw: &str, confirm: &str) -> AppResult<()> {
    password::check_length(raw).map_err(AppError::Validation)?;
    if raw != confirm {
        return Err(AppError::validation("Passwords do not match"));
    }
    Ok(())
}

fn conflict(err: RepoError) -> AppError {
    match err {
        RepoError::Duplicate("name") => AppError::conflict("Name already taken"),
        RepoError::Duplicate(_) => AppError::conflict("Email already registered"),
        RepoError::Other(e) => AppError::Unexpected(e),
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Duplicate(field) => AppError::conflict(format!("Duplicate {field}")),
            RepoError::Other(e) => AppError::Unexpected(e),
        }
    }
}

#[derive(Clone)]
pub struct CredentialStore {
    repo: Arc<dyn UserRepo>,
    clock: Arc<dyn Clock>,
    cost: u32,
}

impl FromRef<AppState> for CredentialStore {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.repo.clone(), state.clock.clone(), state.config.bcrypt_cost)
    }
}

impl CredentialStore {
    pub fn new(repo: Arc<dyn UserRepo>, clock: Arc<dyn Clock>, cost: u32) -> Self {
        Self { repo, clock, cost }
    }

    async fn hash(&self, raw: &str) -> AppResult<String> {
        let raw = raw.to_owned();
        let cost = self.cost;
        let hash = tokio::task::spawn_blocking(move || password::hash_password(&raw, cost))
            .await
            .context("join password hasher")??;
        Ok(hash)
    }

    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        raw_password: &str,
        raw_password_confirm: &str,
        auth_type: AuthType,
    ) -> AppResult<User> {
        let name = name.trim();
        let email = normalize_email(email);
        validate_name(name)?;
        if !is_valid_email(&email) {
            return Err(AppError::validation("Please provide a valid email"));
        }
        validate_new_password(raw_password, raw_password_confirm)?;

        if self.repo.find_by_email(&email).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(AppError::conflict("Email already registered"));
        }
        if self.repo.find_by_name(name).await?.is_some() {
            warn!(name = %name, "name already taken");
            return Err(AppError::conflict("Name already taken"));
        }

        let password_hash = self.hash(raw_password).await?;
        // the unique indexes still decide when two signups race
        let user = self
            .repo
            .insert_user(NewUser {
                name: name.to_string(),
                email,
                password_hash,
                auth_type,
            })
            .await
            .map_err(conflict)?;
        info!(user_id = %user.id, "user created");
        Ok(user)
    }

    pub async fn verify_password(&self, hash: &str, raw: &str) -> AppResult<bool> {
        let (hash, raw) = (hash.to_owned(), raw.to_owned());
        let ok = tokio::task::spawn_blocking(move || password::verify_password(&raw, &hash))
            .await
            .context("join password verifier")??;
        Ok(ok)
    }

    async fn issue(&self, user: &User, kind: OneTimeKind, ttl: Duration) -> AppResult<String> {
        let token = one_time::generate_token();
        let expires = self.clock.now() + ttl;
        self.repo
            .set_one_time_token(user.id, kind, Some(one_time::hash_token(&token)), Some(expires))
            .await?;
        debug!(user_id = %user.id, kind = ?kind, "one-time token issued");
        Ok(token)
    }

    pub async fn issue_email_verification_token(&self, user: &User) -> AppResult<String> {
        self.issue(user, OneTimeKind::VerifyEmail, VERIFY_EMAIL_TTL).await
    }

    pub async fn issue_password_reset_token(&self, user: &User) -> AppResult<String> {
        self.issue(user, OneTimeKind::PasswordReset, PASSWORD_RESET_TTL)
            .await
    }

    pub async fn clear_password_reset_token(&self, user: &User) -> AppResult<()> {
        self.repo
            .set_one_time_token(user.id, OneTimeKind::PasswordReset, None, None)
            .await?;
        Ok(())
    }

    /// Single use: a successful lookup clears the token.
    pub async fn consume_token(&self, kind: OneTimeKind, plaintext: &str) -> AppResult<User> {
        let hash = one_time::hash_token(plaintext);
        self.repo
            .consume_one_time_token(kind, &hash, self.clock.now())
            .await?
            .ok_or_else(|| AppError::not_found("Token is invalid or has expired"))
    }

    /// Stores `password_hash` and stamps `password_changed_at = now` in one
    /// write, so tokens issued before this moment stop authorizing.
    pub async fn record_password_change(&self, user: &User, password_hash: &str) -> AppResult<()> {
        self.repo
            .update_password(user.id, password_hash, self.clock.now())
            .await?;
        Ok(())
    }

    pub async fn change_password(&self, user: &User, raw: &str, confirm: &str) -> AppResult<()> {
        validate_new_password(raw, confirm)?;
        let hash = self.hash(raw).await?;
        self.record_password_change(user, &hash).await?;
        info!(user_id = %user.id, "password changed");
        Ok(())
    }

    pub async fn mark_email_verified(&self, user: &User) -> AppResult<User> {
        self.repo
            .mark_email_verified(user.id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    pub async fn update_name(&self, user: &User, name: &str) -> AppResult<User> {
        let name = name.trim();
        validate_name(name)?;
        self.repo
            .update_name(user.id, name)
            .await
            .map_err(conflict)?
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    pub async fn update_photo(&self, user: &User, photo: &str) -> AppResult<User> {
        self.repo
            .update_photo(user.id, photo)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    /// Soft delete: the account stays but can no longer log in or refresh.
    pub async fn deactivate(&self, user: &User) -> AppResult<()> {
        self.repo.set_active(user.id, false).await?;
        self.revoke_refresh_token(user.id).await?;
        info!(user_id = %user.id, "user deactivated");
        Ok(())
    }

    /// Hard delete; the refresh row goes with the user.
    pub async fn delete_user(&self, user: &User) -> AppResult<User> {
        let deleted = self
            .repo
            .delete_user(user.id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        info!(user_id = %user.id, "user deleted");
        Ok(deleted)
    }

    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        Ok(self.repo.list_users().await?)
    }

    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.repo.find_by_id(id).await?)
    }

    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self.repo.find_by_email(&normalize_email(email)).await?)
    }

    /// Drops whatever row the user had, then stores the new digest.
    pub async fn replace_refresh_token(
        &self,
        user_id: Uuid,
        token_hash: String,
        expires_at: OffsetDateTime,
    ) -> AppResult<()> {
        self.repo.delete_refresh_tokens(user_id).await?;
        self.repo
            .insert_refresh_token(RefreshTokenRecord {
                user_id,
                token_hash,
                expires_at,
            })
            .await?;
        Ok(())
    }

    /// Compare-and-delete: true only for the one caller whose digest matched
    /// the stored row. Concurrent presenters of the same token race here.
    pub async fn take_refresh_token(&self, user_id: Uuid, token_hash: &str) -> AppResult<bool> {
        Ok(self.repo.take_refresh_token(user_id, token_hash).await?)
    }

    pub async fn revoke_refresh_token(&self, user_id: Uuid) -> AppResult<()> {
        Ok(self.repo.delete_refresh_tokens(user_id).await?)
    }
}
