use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::User;

/// Login form body.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration form body. Missing fields arrive empty and are reported by validation.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "password-confirm")]
    pub password_confirm: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ForgotForm {
    pub email: String,
}

/// New password on the reset form.
#[derive(Debug, Default, Deserialize)]
pub struct ResetForm {
    pub password: Option<String>,
    #[serde(rename = "password-confirm")]
    pub password_confirm: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AccountForm {
    pub name: String,
    pub email: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            name: u.name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountPage {
    pub user: PublicUser,
}

/// The reset form posts back to `/account/reset/{token}`.
#[derive(Debug, Serialize)]
pub struct ResetPage {
    pub token: String,
}
