//! Session flows: signup, email verification, login, refresh-token rotation
//! and the password reset/update lifecycle.

use axum::extract::FromRef;
use tracing::{info, warn};

use super::{
    claims::TokenKind,
    dto::{ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, SignupRequest, UpdatePasswordRequest},
    jwt::{TokenPair, TokenService},
};
use crate::{
    credentials::{one_time::hash_token, validate_new_password, CredentialStore},
    error::{AppError, AppResult},
    mail,
    state::AppState,
    users::repo_types::{OneTimeKind, PublicUser, User},
};

const TOKEN_MISS: &str = "Token is invalid or has expired";
const BAD_CREDENTIALS: &str = "Incorrect email or password";

fn link(state: &AppState, path: &str) -> String {
    format!("{}/api/v1{path}", state.config.public_url)
}

/// One-time token misses are a client error on these routes.
fn token_miss(err: AppError) -> AppError {
    match err {
        AppError::NotFound(_) => AppError::validation(TOKEN_MISS),
        other => other,
    }
}

pub async fn signup(state: &AppState, req: SignupRequest) -> AppResult<PublicUser> {
    let creds = CredentialStore::from_ref(state);
    let user = creds
        .create_user(&req.name, &req.email, &req.password, &req.password_confirm, req.auth_type)
        .await?;

    let token = creds.issue_email_verification_token(&user).await?;
    let url = link(state, &format!("/auth/verify-email/{token}"));
    if let Err(e) = state.mailer.send(mail::verify_email(&user, &url, "24 hours")).await {
        warn!(user_id = %user.id, error = %e, "verification email not sent");
    }

    info!(user_id = %user.id, "user signed up");
    Ok(PublicUser::from(&user))
}

pub async fn verify_email(state: &AppState, token: &str) -> AppResult<PublicUser> {
    let creds = CredentialStore::from_ref(state);
    let user = creds
        .consume_token(OneTimeKind::VerifyEmail, token)
        .await
        .map_err(token_miss)?;
    let user = creds.mark_email_verified(&user).await?;

    let url = link(state, "/users/me");
    if let Err(e) = state.mailer.send(mail::welcome(&user, &url)).await {
        warn!(user_id = %user.id, error = %e, "welcome email not sent");
    }

    info!(user_id = %user.id, "email verified");
    Ok(PublicUser::from(&user))
}

pub async fn login(state: &AppState, req: LoginRequest) -> AppResult<(User, TokenPair)> {
    let (email, password) = match (req.email, req.password) {
        (Some(e), Some(p)) if !e.trim().is_empty() && !p.is_empty() => (e, p),
        _ => return Err(AppError::validation("Please provide email and password!")),
    };

    let creds = CredentialStore::from_ref(state);
    let user = match creds.find_by_email(&email).await? {
        Some(u) if u.active => u,
        _ => {
            warn!(email = %email, "login for unknown or inactive account");
            return Err(AppError::unauthorized(BAD_CREDENTIALS));
        }
    };
    if !creds.verify_password(&user.password_hash, &password).await? {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(AppError::unauthorized(BAD_CREDENTIALS));
    }
    if !user.email_verified {
        return Err(AppError::forbidden("Please verify your email"));
    }

    let pair = TokenService::from_ref(state)
        .rotate_refresh_token(&creds, user.id)
        .await?;
    info!(user_id = %user.id, "user logged in");
    Ok((user, pair))
}

pub async fn refresh(state: &AppState, presented: Option<String>) -> AppResult<(User, TokenPair)> {
    let presented = presented
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::invalid_token("Refresh token is missing. Please log in again!"))?;

    let tokens = TokenService::from_ref(state);
    let claims = tokens.verify(&presented, TokenKind::Refresh)?;

    let creds = CredentialStore::from_ref(state);
    let user = creds
        .find_by_id(claims.sub)
        .await?
        .filter(|u| u.active)
        .ok_or_else(|| AppError::not_found("The user belonging to this token no longer exists."))?;

    if !creds.take_refresh_token(user.id, &hash_token(&presented)).await? {
        warn!(user_id = %user.id, "refresh token does not match stored digest");
        return Err(AppError::invalid_token("Invalid refresh token. Please log in again!"));
    }

    let pair = tokens.rotate_refresh_token(&creds, user.id).await?;
    info!(user_id = %user.id, "tokens refreshed");
    Ok((user, pair))
}

pub async fn forgot_password(state: &AppState, req: ForgotPasswordRequest) -> AppResult<()> {
    let email = req
        .email
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| AppError::validation("Please provide your email address"))?;

    let creds = CredentialStore::from_ref(state);
    let user = creds
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::not_found("There is no user with that email address."))?;

    let token = creds.issue_password_reset_token(&user).await?;
    let url = link(state, &format!("/auth/reset-password/{token}"));
    if let Err(e) = state.mailer.send(mail::password_reset(&user, &url, "10 minutes")).await {
        warn!(user_id = %user.id, error = %e, "password reset email failed");
        creds.clear_password_reset_token(&user).await?;
        return Err(AppError::internal(
            "There was an error sending the email. Try again later!",
        ));
    }

    info!(user_id = %user.id, "password reset email sent");
    Ok(())
}

pub async fn reset_password(state: &AppState, token: &str, req: ResetPasswordRequest) -> AppResult<()> {
    // reject a bad password before burning the token
    validate_new_password(&req.password, &req.password_confirm)?;

    let creds = CredentialStore::from_ref(state);
    let user = creds
        .consume_token(OneTimeKind::PasswordReset, token)
        .await
        .map_err(token_miss)?;
    creds
        .change_password(&user, &req.password, &req.password_confirm)
        .await?;
    info!(user_id = %user.id, "password reset");
    Ok(())
}

pub async fn update_password(state: &AppState, user: &User, req: UpdatePasswordRequest) -> AppResult<()> {
    let creds = CredentialStore::from_ref(state);
    if !creds
        .verify_password(&user.password_hash, &req.current_password)
        .await?
    {
        return Err(AppError::validation("Your current password is wrong"));
    }
    creds
        .change_password(user, &req.new_password, &req.password_confirm)
        .await?;
    info!(user_id = %user.id, "password updated");
    Ok(())
}
