use anyhow::Context;
use axum::extract::FromRef;
use bytes::Bytes;
use tracing::{info, warn};

use super::{dto::UpdateMeRequest, repo_types::User};
use crate::{
    credentials::CredentialStore,
    error::{AppError, AppResult},
    images,
    state::AppState,
};

pub const PHOTO_URL_TTL_SECS: u64 = 3600;

/// A single multipart part as received.
pub struct Upload {
    pub content_type: Option<String>,
    pub body: Bytes,
}

pub fn photo_key(user: &User) -> String {
    format!("user-{}.jpeg", user.id)
}

pub async fn update_me(state: &AppState, user: &User, req: UpdateMeRequest) -> AppResult<User> {
    if req.touches_password() {
        return Err(AppError::validation(
            "This route is not for password updates. Please use /update-my-password.",
        ));
    }
    let name = req
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AppError::validation("Please provide a name"))?;
    let updated = CredentialStore::from_ref(state).update_name(user, &name).await?;
    info!(user_id = %user.id, "profile updated");
    Ok(updated)
}

pub async fn delete_me(state: &AppState, user: &User) -> AppResult<()> {
    let deleted = CredentialStore::from_ref(state).delete_user(user).await?;
    if deleted.has_custom_photo() {
        if let Err(e) = state.storage.delete_object(&deleted.photo).await {
            warn!(user_id = %user.id, key = %deleted.photo, error = %e, "photo not removed");
        }
    }
    Ok(())
}

pub async fn disable_me(state: &AppState, user: &User) -> AppResult<()> {
    CredentialStore::from_ref(state).deactivate(user).await
}

pub async fn update_profile_photo(
    state: &AppState,
    user: &User,
    upload: Option<Upload>,
) -> AppResult<(User, String)> {
    let upload = upload.ok_or_else(|| AppError::validation("Please upload an image"))?;
    images::check_image(upload.content_type.as_deref(), upload.body.len())?;

    let jpeg = images::resize_avatar(upload.body).await?;
    let key = photo_key(user);
    state
        .storage
        .put_object(&key, jpeg, "image/jpeg")
        .await
        .with_context(|| format!("upload profile photo for {}", user.id))?;

    let updated = CredentialStore::from_ref(state).update_photo(user, &key).await?;
    let url = state
        .storage
        .presign_get(&key, PHOTO_URL_TTL_SECS)
        .await
        .context("presign profile photo")?;
    info!(user_id = %user.id, key = %key, "profile photo updated");
    Ok((updated, url))
}

pub async fn list_users(state: &AppState) -> AppResult<Vec<User>> {
    CredentialStore::from_ref(state).list_users().await
}
