use serde::{Deserialize, Serialize};

use super::repo_types::{PublicUser, User};

/// Profile edits; password fields are only accepted so they can be refused.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub password: Option<serde_json::Value>,
    pub password_confirm: Option<serde_json::Value>,
}

impl UpdateMeRequest {
    pub fn touches_password(&self) -> bool {
        self.password.is_some() || self.password_confirm.is_some()
    }
}

#[derive(Debug, Serialize)]
pub struct UserData {
    pub user: User,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoData {
    pub user: User,
    pub photo_url: String,
}

#[derive(Debug, Serialize)]
pub struct UserList {
    pub results: usize,
    pub users: Vec<PublicUser>,
}

impl From<Vec<User>> for UserList {
    fn from(users: Vec<User>) -> Self {
        let users: Vec<PublicUser> = users.iter().map(PublicUser::from).collect();
        Self {
            results: users.len(),
            users,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_fields_are_detected() {
        let req: UpdateMeRequest = serde_json::from_str(r#"{"name":"alice","passwordConfirm":"x"}"#).unwrap();
        assert!(req.touches_password());
        let req: UpdateMeRequest = serde_json::from_str(r#"{"name":"alice"}"#).unwrap();
        assert!(!req.touches_password());
    }
}
