use anyhow::Context;
use lazy_static::lazy_static;
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::{
    dto::RegisterForm,
    password::verify_password,
    repo::UserStore,
    repo_types::User,
};
use crate::mail::OutgoingMail;

/// Random bytes in a reset token before hex encoding.
pub const RESET_TOKEN_BYTES: usize = 20;
/// Reset tokens expire exactly one hour after issuance.
pub const RESET_TOKEN_TTL: Duration = Duration::milliseconds(3_600_000);

/// Ways the password-reset workflow can stop.
#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    #[error("No account is associated with that email.")]
    NotFound,

    #[error("Password reset is invalid or has expired.")]
    InvalidOrExpired,

    #[error("Passwords do not match!")]
    PasswordMismatch,

    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Canonical form used for storage and lookup.
///
/// Lower-cases the address; Gmail addresses additionally lose the dots in the
/// local part and `googlemail.com` becomes `gmail.com`. Sub-addresses are kept.
pub fn normalize_email(email: &str) -> String {
    let lowered = email.trim().to_lowercase();
    match lowered.rsplit_once('@') {
        Some((local, "gmail.com" | "googlemail.com")) => {
            format!("{}@gmail.com", local.replace('.', ""))
        }
        _ => lowered.clone(),
    }
}

pub fn generate_reset_token() -> anyhow::Result<String> {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("os random source unavailable")?;
    Ok(hex::encode(bytes))
}

pub fn reset_url(scheme: &str, host: &str, token: &str) -> String {
    format!("{scheme}://{host}/account/reset/{token}")
}

pub fn reset_mail(user: &User, url: &str) -> OutgoingMail {
    OutgoingMail {
        to: user.email.clone(),
        subject: "Password Reset".into(),
        body: format!(
            "Hi {},\n\nSomeone asked to reset the password for this account.\n\
             Follow this link within the next hour to choose a new one:\n\n{url}\n\n\
             If you did not ask for this, ignore this email and nothing will change.\n",
            user.name
        ),
    }
}

/// A freshly issued reset token.
#[derive(Debug)]
pub struct IssuedReset {
    pub user: User,
    pub token: String,
    pub expires: OffsetDateTime,
}

/// "Forgot password": put a new token pair on the account owning `email`.
pub async fn issue_reset(
    users: &dyn UserStore,
    email: &str,
    now: OffsetDateTime,
) -> Result<IssuedReset, ResetError> {
    let email = normalize_email(email);
    let mut user = users
        .find_by_email(&email)
        .await?
        .ok_or(ResetError::NotFound)?;

    let token = generate_reset_token()?;
    let expires = now + RESET_TOKEN_TTL;
    user.set_reset_token(token.clone(), expires);
    let user = users.save(&user).await?;
    debug!(user_id = %user.id, "reset token stored");

    Ok(IssuedReset {
        user,
        token,
        expires,
    })
}

/// The account a reset token currently unlocks. The stored record is checked
/// again so a loose store query cannot hand out an expired account.
pub async fn validate_reset_token(
    users: &dyn UserStore,
    token: &str,
    now: OffsetDateTime,
) -> Result<User, ResetError> {
    users
        .find_by_valid_reset_token(token, now)
        .await?
        .filter(|u| u.reset_token_valid(token, now))
        .ok_or(ResetError::InvalidOrExpired)
}

/// Byte-for-byte comparison; no trimming or case folding.
pub fn confirm_passwords(password: &str, confirm: &str) -> Result<(), ResetError> {
    if password.as_bytes() == confirm.as_bytes() {
        Ok(())
    } else {
        Err(ResetError::PasswordMismatch)
    }
}

/// Rotate the credential and consume the token in a single save.
pub async fn complete_reset(
    users: &dyn UserStore,
    token: &str,
    new_password: &str,
    now: OffsetDateTime,
) -> Result<User, ResetError> {
    let mut user = validate_reset_token(users, token, now).await?;
    user.replace_password(new_password)?;
    user.clear_reset_token();
    Ok(users.save(&user).await?)
}

/// Check an email/password pair. `Ok(None)` for unknown email or wrong password.
pub async fn authenticate(
    users: &dyn UserStore,
    email: &str,
    password: &str,
) -> anyhow::Result<Option<User>> {
    let Some(user) = users.find_by_email(&normalize_email(email)).await? else {
        return Ok(None);
    };
    if verify_password(password, &user.password_hash)? {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

/// Every problem with a registration form, in display order.
pub fn registration_errors(form: &RegisterForm) -> Vec<&'static str> {
    let mut errors = Vec::new();
    if form.name.trim().is_empty() {
        errors.push("You must supply a name!");
    }
    if !is_valid_email(&normalize_email(&form.email)) {
        errors.push("That email is not valid!");
    }
    if form.password.is_empty() {
        errors.push("Password cannot be blank!");
    }
    if form.password_confirm.is_empty() {
        errors.push("Please confirm your password!");
    } else if form.password_confirm != form.password {
        errors.push("Oops! Your passwords do not match");
    }
    errors
}
