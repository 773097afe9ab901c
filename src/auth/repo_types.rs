use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::password::hash_password;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String, // normalized, unique
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 PHC string
    #[serde(skip_serializing)]
    pub reset_password_token: Option<String>,
    #[serde(skip_serializing)]
    pub reset_password_expires: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl User {
    /// Token and expiry are only ever set together.
    pub fn set_reset_token(&mut self, token: String, expires: OffsetDateTime) {
        self.reset_password_token = Some(token);
        self.reset_password_expires = Some(expires);
    }

    pub fn clear_reset_token(&mut self) {
        self.reset_password_token = None;
        self.reset_password_expires = None;
    }

    /// True while a matching, unexpired reset token is on the record.
    pub fn reset_token_valid(&self, token: &str, now: OffsetDateTime) -> bool {
        match (&self.reset_password_token, self.reset_password_expires) {
            (Some(t), Some(expires)) => t == token && now < expires,
            _ => false,
        }
    }

    /// Hash `plain` and store it as the new credential. Not persisted until saved.
    pub fn replace_password(&mut self, plain: &str) -> anyhow::Result<()> {
        self.password_hash = hash_password(plain)?;
        Ok(())
    }
}

/// Fields needed to insert a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}
