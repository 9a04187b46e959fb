use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    routing::{delete, get, patch},
    Json, Router,
};
use tracing::{debug, instrument};

use super::{
    dto::{PhotoData, UpdateMeRequest, UserData, UserList},
    services::{self, Upload},
};
use crate::{
    auth::{
        extractors::{AdminUser, CurrentUser},
        Envelope,
    },
    error::{AppError, AppResult},
    images::MAX_UPLOAD_BYTES,
    state::AppState,
};

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me))
        .route("/users/update-me", patch(update_me))
        .route("/users/delete-me", delete(delete_me))
        .route("/users/disable-me", patch(disable_me))
        .route(
            "/users/update-profile-photo",
            // headroom so oversized images reach the predicate instead of the body limit
            patch(update_profile_photo).layer(DefaultBodyLimit::max(2 * MAX_UPLOAD_BYTES)),
        )
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/admin/users", get(list_users))
}

#[instrument(skip(user), fields(user_id = %user.id))]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<Envelope<UserData>> {
    Json(Envelope::success(UserData { user }))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<UpdateMeRequest>, JsonRejection>,
) -> AppResult<Json<Envelope<UserData>>> {
    let Json(payload) = payload?;
    let user = services::update_me(&state, &user, payload).await?;
    Ok(Json(Envelope::success(UserData { user })))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<StatusCode> {
    services::delete_me(&state, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn disable_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<StatusCode> {
    services::disable_me(&state, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn multipart_error(e: MultipartError) -> AppError {
    AppError::validation(e.body_text())
}

/// Returns the `image` part, skipping any other fields.
async fn image_part(multipart: &mut Multipart) -> AppResult<Option<Upload>> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("image") {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let body = field.bytes().await.map_err(multipart_error)?;
        debug!(content_type = ?content_type, len = body.len(), "image part received");
        return Ok(Some(Upload { content_type, body }));
    }
    Ok(None)
}

#[instrument(skip(state, user, multipart), fields(user_id = %user.id))]
pub async fn update_profile_photo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<Envelope<PhotoData>>> {
    let mut multipart = multipart?;
    let upload = image_part(&mut multipart).await?;
    let (user, photo_url) = services::update_profile_photo(&state, &user, upload).await?;
    Ok(Json(Envelope::success(PhotoData { user, photo_url })))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> AppResult<Json<Envelope<UserList>>> {
    let users = services::list_users(&state).await?;
    Ok(Json(Envelope::success(UserList::from(users))))
}
