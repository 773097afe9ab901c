use axum::{
    extract::{Host, Path, State},
    http::HeaderMap,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Form, Router,
};
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};

use super::{
    dto::{AccountForm, AccountPage, ForgotForm, LoginForm, PublicUser, RegisterForm, ResetForm, ResetPage},
    middleware::{confirmed_passwords, require_login},
    password::hash_password,
    repo_types::NewUser,
    services::{
        authenticate, complete_reset, is_valid_email, issue_reset, normalize_email,
        registration_errors, reset_mail, reset_url, validate_reset_token, ResetError,
    },
};
use crate::{
    error::AppError,
    state::AppState,
    web::{CurrentUser, FlashRedirect, Notice, Notices, Page},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_form).post(login))
        .route("/logout", get(logout))
        .route("/register", get(register_form).post(register))
        .route("/account/forgot", post(forgot))
        .route(
            "/account/reset/:token",
            get(reset_form)
                .merge(post(update_password).route_layer(middleware::from_fn(confirmed_passwords))),
        )
}

pub fn account_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/account", get(account).post(update_account))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_login))
}

/// Workflow failures become a notice and a redirect; store failures end the request.
/// A mismatch goes back to the form, `form_path` when there is no usable Referer.
pub(super) fn recover(
    err: ResetError,
    headers: &HeaderMap,
    form_path: &str,
) -> Result<FlashRedirect, AppError> {
    let message = err.to_string();
    match err {
        ResetError::NotFound | ResetError::InvalidOrExpired => {
            Ok(FlashRedirect::to("/login").with_notice(Notice::error(message)))
        }
        ResetError::PasswordMismatch => {
            let redirect = FlashRedirect::back(headers, form_path);
            debug!(to = %redirect.location(), "passwords did not match");
            Ok(redirect.with_notice(Notice::error(message)))
        }
        ResetError::Persistence(e) => Err(AppError::Internal(e)),
    }
}

pub async fn login_form(notices: Notices) -> Page<()> {
    Page::new("Login", notices, ())
}

pub async fn register_form(notices: Notices) -> Page<()> {
    Page::new("Register", notices, ())
}

#[instrument(skip(state, form))]
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<FlashRedirect, AppError> {
    let user = match authenticate(state.users.as_ref(), &form.email, &form.password).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(email = %normalize_email(&form.email), "login failed");
            return Ok(FlashRedirect::to("/login").with_notice(Notice::error("Failed Login!")));
        }
        Err(e) => {
            error!(error = %e, "authenticate failed");
            return Err(AppError::Internal(e));
        }
    };

    let cookie = state.sessions.session_cookie(user.id)?;
    info!(user_id = %user.id, "user logged in");
    Ok(FlashRedirect::to("/")
        .with_notice(Notice::success("You are now logged in!"))
        .with_cookie(cookie))
}

#[instrument(skip(state))]
pub async fn logout(State(state): State<AppState>) -> Result<FlashRedirect, AppError> {
    let cookie = state.sessions.clear_session_cookie()?;
    Ok(FlashRedirect::to("/")
        .with_notice(Notice::success("You are now logged out."))
        .with_cookie(cookie))
}

#[instrument(skip(state, form))]
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<FlashRedirect, AppError> {
    let errors = registration_errors(&form);
    if !errors.is_empty() {
        warn!(count = errors.len(), "registration rejected");
        return Ok(FlashRedirect::to("/register").with_notices(errors.into_iter().map(Notice::error)));
    }

    let email = normalize_email(&form.email);
    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Ok(FlashRedirect::to("/register")
            .with_notice(Notice::error("That email is already registered.")));
    }

    let password_hash = hash_password(&form.password)?;
    let user = state
        .users
        .create(NewUser {
            email,
            name: form.name.trim().to_string(),
            password_hash,
        })
        .await?;

    let cookie = state.sessions.session_cookie(user.id)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(FlashRedirect::to("/")
        .with_notice(Notice::success("You are now logged in!"))
        .with_cookie(cookie))
}

pub async fn account(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    notices: Notices,
) -> Page<AccountPage> {
    Page::new(
        "Edit Your Account",
        notices,
        AccountPage {
            user: PublicUser::from(&user),
        },
    )
}

#[instrument(skip(state, user, headers, form), fields(user_id = %user.id))]
pub async fn update_account(
    State(state): State<AppState>,
    Extension(CurrentUser(mut user)): Extension<CurrentUser>,
    headers: HeaderMap,
    Form(form): Form<AccountForm>,
) -> Result<FlashRedirect, AppError> {
    let name = form.name.trim();
    let email = normalize_email(&form.email);
    let mut errors = Vec::new();
    if name.is_empty() {
        errors.push(Notice::error("You must supply a name!"));
    }
    if !is_valid_email(&email) {
        errors.push(Notice::error("That email is not valid!"));
    }
    if !errors.is_empty() {
        return Ok(FlashRedirect::back(&headers, "/account").with_notices(errors));
    }

    if email != user.email {
        if let Some(other) = state.users.find_by_email(&email).await? {
            if other.id != user.id {
                warn!(email = %email, "account email already taken");
                return Ok(FlashRedirect::back(&headers, "/account")
                    .with_notice(Notice::error("That email is already in use.")));
            }
        }
    }

    user.name = name.to_string();
    user.email = email;
    state.users.save(&user).await?;
    info!("profile updated");
    Ok(FlashRedirect::back(&headers, "/account").with_notice(Notice::success("Updated the profile!")))
}

#[instrument(skip(state, headers, form))]
pub async fn forgot(
    State(state): State<AppState>,
    Host(host): Host,
    headers: HeaderMap,
    Form(form): Form<ForgotForm>,
) -> Result<FlashRedirect, AppError> {
    let issued = match issue_reset(state.users.as_ref(), &form.email, OffsetDateTime::now_utc()).await {
        Ok(issued) => issued,
        Err(e) => {
            warn!(reason = %e, "password reset not issued");
            return recover(e, &headers, "/login");
        }
    };

    let url = reset_url(&state.config.public_scheme, &host, &issued.token);
    state.mailer.send(reset_mail(&issued.user, &url)).await?;
    info!(user_id = %issued.user.id, expires = %issued.expires, "password reset issued");

    Ok(FlashRedirect::to("/login")
        .with_notice(Notice::success("You have been emailed a password reset link.")))
}

#[instrument(skip_all)]
pub async fn reset_form(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    notices: Notices,
) -> Result<Response, AppError> {
    match validate_reset_token(state.users.as_ref(), &token, OffsetDateTime::now_utc()).await {
        Ok(_) => Ok(Page::new("Reset your password", notices, ResetPage { token }).into_response()),
        Err(e) => {
            warn!(reason = %e, "reset form refused");
            Ok(recover(e, &headers, "/login")?.into_response())
        }
    }
}

/// Runs behind [`confirmed_passwords`], so the two fields already match.
#[instrument(skip_all)]
pub async fn update_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    Form(form): Form<ResetForm>,
) -> Result<FlashRedirect, AppError> {
    let password = form.password.unwrap_or_default();
    let user = match complete_reset(state.users.as_ref(), &token, &password, OffsetDateTime::now_utc()).await {
        Ok(u) => u,
        Err(e) => {
            warn!(reason = %e, "password reset refused");
            return recover(e, &headers, "/login");
        }
    };

    let cookie = state.sessions.session_cookie(user.id)?;
    info!(user_id = %user.id, "password reset completed");
    Ok(FlashRedirect::to("/")
        .with_notice(Notice::success("Your password has been updated!"))
        .with_cookie(cookie))
}
