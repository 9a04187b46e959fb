use axum::{
    extract::{rejection::JsonRejection, FromRef, Path, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Serialize;
use tracing::instrument;

use super::{
    cookies::{self, ACCESS_COOKIE, REFRESH_COOKIE},
    dto::{
        EmailSent, Envelope, ForgotPasswordRequest, LoginRequest, PasswordReset, PasswordUpdated,
        RefreshRequest, ResetPasswordRequest, SignupRequest, UpdatePasswordRequest,
        UserProjection,
    },
    extractors::CurrentUser,
    jwt::{TokenPair, TokenService},
    services,
};
use crate::{
    error::AppResult,
    state::AppState,
    users::repo_types::{PublicUser, User},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/verify-email/:token", get(verify_email).patch(verify_email))
        .route("/auth/refresh-token", post(refresh_token))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password/:token", patch(reset_password))
        .route("/auth/update-my-password", patch(update_my_password))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionData {
    user: PublicUser,
    access_token: String,
    refresh_token: String,
}

/// Token pair in the body plus HttpOnly cookies for browser clients.
fn session_response(state: &AppState, user: &User, pair: TokenPair) -> Response {
    let tokens = TokenService::from_ref(state);
    let secure = state.config.cookie_secure;
    let mut headers = HeaderMap::new();
    let set = [
        cookies::build(ACCESS_COOKIE, &pair.access_token, tokens.access_ttl(), secure),
        cookies::build(REFRESH_COOKIE, &pair.refresh_token, tokens.refresh_ttl(), secure),
    ];
    for value in set.into_iter().flatten() {
        headers.append(SET_COOKIE, value);
    }
    let body = Envelope::success(SessionData {
        user: PublicUser::from(user),
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    });
    (StatusCode::OK, headers, Json(body)).into_response()
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Envelope<UserProjection>>)> {
    let Json(payload) = payload?;
    let user = services::signup(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(Envelope::success(UserProjection { user }))))
}

#[instrument(skip(state, token))]
pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<Envelope<UserProjection>>> {
    let user = services::verify_email(&state, &token).await?;
    Ok(Json(Envelope::success(UserProjection { user })))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(payload) = payload?;
    let (user, pair) = services::login(&state, payload).await?;
    Ok(session_response(&state, &user, pair))
}

#[instrument(skip(state, headers, payload))]
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<RefreshRequest>>,
) -> AppResult<Response> {
    let from_body = payload.and_then(|Json(p)| p.refresh_token);
    let presented = from_body.or_else(|| cookies::read(&headers, REFRESH_COOKIE));
    let (user, pair) = services::refresh(&state, presented).await?;
    Ok(session_response(&state, &user, pair))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> AppResult<Json<Envelope<EmailSent>>> {
    let Json(payload) = payload?;
    services::forgot_password(&state, payload).await?;
    Ok(Json(Envelope::success(EmailSent { email_sent: true })))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> AppResult<Json<Envelope<PasswordReset>>> {
    let Json(payload) = payload?;
    services::reset_password(&state, &token, payload).await?;
    Ok(Json(Envelope::success(PasswordReset {
        password_reset: true,
    })))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn update_my_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<UpdatePasswordRequest>, JsonRejection>,
) -> AppResult<Json<Envelope<PasswordUpdated>>> {
    let Json(payload) = payload?;
    services::update_password(&state, &user, payload).await?;
    Ok(Json(Envelope::success(PasswordUpdated {
        password_updated: true,
    })))
}
