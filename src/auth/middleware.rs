//! Request interceptors for the auth routes. Each one either forwards the
//! request to `next` or answers it with a notice + redirect.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use super::{
    dto::ResetForm,
    handlers::recover,
    services::{confirm_passwords, ResetError},
};
use crate::{
    error::AppError,
    state::AppState,
    web::{session::authenticated_user, CurrentUser, FlashRedirect, Notice},
};

pub const LOGIN_REQUIRED: &str = "Oops! You must be logged in to do that!";

const FORM_BODY_LIMIT: usize = 64 * 1024;

/// Login gate: only requests with a live session reach the handler, which
/// finds the account in `Extension<CurrentUser>`.
pub async fn require_login(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    match authenticated_user(&state, req.headers()).await {
        Ok(Some(user)) => {
            req.extensions_mut().insert(CurrentUser(user));
            next.run(req).await
        }
        Ok(None) => {
            debug!(path = %req.uri().path(), "login required");
            FlashRedirect::to("/login")
                .with_notice(Notice::error(LOGIN_REQUIRED))
                .into_response()
        }
        Err(e) => AppError::Internal(e).into_response(),
    }
}

/// Passes the request on only when `password` and `password-confirm` are
/// both present and identical. The body is buffered and handed on intact.
pub async fn confirmed_passwords(req: Request, next: Next) -> Response {
    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, FORM_BODY_LIMIT).await {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "unreadable form body");
            return AppError::BadRequest("Invalid form body".into()).into_response();
        }
    };

    let form: ResetForm = serde_urlencoded::from_bytes(&bytes).unwrap_or_default();
    let outcome = match (form.password.as_deref(), form.password_confirm.as_deref()) {
        (Some(password), Some(confirm)) => confirm_passwords(password, confirm),
        _ => Err(ResetError::PasswordMismatch),
    };
    if let Err(e) = outcome {
        warn!(path = %parts.uri.path(), "password confirmation failed");
        return recover(e, &parts.headers, parts.uri.path()).into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
