use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::{debug, warn};

use super::{
    claims::TokenKind,
    cookies::{self, ACCESS_COOKIE},
    jwt::TokenService,
};
use crate::{
    credentials::CredentialStore,
    error::AppError,
    state::AppState,
    users::repo_types::{Role, User},
};

/// Caller authenticated by a valid access token whose user still exists and
/// has not changed their password since the token was issued.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// `CurrentUser` with the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

fn bearer_or_cookie(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer ").or_else(|| auth.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    bearer.or_else(|| cookies::read(&parts.headers, ACCESS_COOKIE))
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_or_cookie(parts).ok_or_else(|| {
            AppError::unauthorized("You are not logged in! Please log in to get access.")
        })?;

        let claims = TokenService::from_ref(state).verify(&token, TokenKind::Access)?;

        let user = CredentialStore::from_ref(state)
            .find_by_id(claims.sub)
            .await?
            .filter(|u| u.active)
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "token for missing or inactive user");
                AppError::unauthorized("The user belonging to this token no longer exists.")
            })?;

        if user.changed_password_after(claims.iat) {
            debug!(user_id = %user.id, "token predates password change");
            return Err(AppError::unauthorized(
                "User recently changed password! Please log in again.",
            ));
        }

        Ok(CurrentUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            warn!(user_id = %user.id, "admin route denied");
            return Err(AppError::forbidden(
                "You do not have permission to perform this action",
            ));
        }
        Ok(AdminUser(user))
    }
}
