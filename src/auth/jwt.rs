use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use thiserror::Error;
use time::Duration as TimeDuration;
use tracing::debug;
use uuid::Uuid;

use super::claims::{Claims, TokenKind};
use crate::{
    clock::Clock,
    config::JwtConfig,
    credentials::{one_time::hash_token, CredentialStore},
    error::{AppError, AppResult},
    state::AppState,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token invalid")]
    Invalid,
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => AppError::invalid_token("Your token has expired! Please log in again."),
            TokenError::Invalid => AppError::invalid_token("Invalid token. Please log in again!"),
        }
    }
}

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl KeyPair {
    fn from_secret(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

/// Signs and verifies access/refresh JWTs. Holds secrets only; persistence
/// of refresh digests goes through the `CredentialStore`.
#[derive(Clone)]
pub struct TokenService {
    access: KeyPair,
    refresh: KeyPair,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl FromRef<AppState> for TokenService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(&state.config.jwt, state.clock.clone())
    }
}

impl TokenService {
    pub fn new(cfg: &JwtConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            access: KeyPair::from_secret(&cfg.access_secret, cfg.access_ttl),
            refresh: KeyPair::from_secret(&cfg.refresh_secret, cfg.refresh_ttl),
            clock,
        }
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh.ttl
    }

    pub fn access_ttl(&self) -> Duration {
        self.access.ttl
    }

    fn sign_with_kind(&self, user_id: Uuid, kind: TokenKind) -> anyhow::Result<String> {
        let keys = self.keys(kind);
        let now = self.clock.now();
        let exp = now + TimeDuration::seconds(keys.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            jti: Uuid::new_v4(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Access)
    }

    pub fn sign_refresh(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Refresh)
    }

    /// Signature is checked by jsonwebtoken; expiry against our own clock so
    /// that the two failures stay distinguishable and testable.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.keys(kind).decoding, &validation).map_err(|e| {
            debug!(error = %e, kind = ?kind, "jwt rejected");
            TokenError::Invalid
        })?;
        if self.clock.now().unix_timestamp() > data.claims.exp {
            debug!(user_id = %data.claims.sub, kind = ?kind, "jwt expired");
            return Err(TokenError::Expired);
        }
        debug!(user_id = %data.claims.sub, kind = ?kind, "jwt verified");
        Ok(data.claims)
    }

    /// Replaces the user's refresh row with a freshly signed pair.
    pub async fn rotate_refresh_token(
        &self,
        creds: &CredentialStore,
        user_id: Uuid,
    ) -> AppResult<TokenPair> {
        let access_token = self.sign_access(user_id)?;
        let refresh_token = self.sign_refresh(user_id)?;
        let expires_at = self.clock.now() + TimeDuration::seconds(self.refresh.ttl.as_secs() as i64);
        creds
            .replace_refresh_token(user_id, hash_token(&refresh_token), expires_at)
            .await?;
        debug!(user_id = %user_id, "refresh token rotated");
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }
}
