//! One-shot user notices carried across a redirect in a cookie.
//!
//! A handler that finishes with a redirect attaches notices to a
//! [`FlashRedirect`]; the next page rendered through [`Page`] receives them via
//! the [`Notices`] extractor and clears the cookie, so each notice is shown once.

use std::convert::Infallible;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{
        header::{HOST, LOCATION, REFERER, SET_COOKIE},
        request::Parts,
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::cookies::{clear_cookie, cookie_value, set_cookie};
use crate::state::AppState;

pub const FLASH_COOKIE: &str = "flash";
const FLASH_MAX_AGE_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }
}

fn encode(notices: &[Notice]) -> anyhow::Result<String> {
    let json = serde_json::to_vec(notices)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

/// Tampered or stale cookies decode to nothing.
fn decode(value: &str) -> Vec<Notice> {
    Base64UrlUnpadded::decode_vec(value)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_default()
}

/// Notices left for this request by the previous one.
#[derive(Debug, Default)]
pub struct Notices(pub Vec<Notice>);

#[async_trait]
impl<S> FromRequestParts<S> for Notices
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Notices(
            cookie_value(&parts.headers, FLASH_COOKIE)
                .map(|v| decode(&v))
                .unwrap_or_default(),
        ))
    }
}

/// A 302 redirect that can carry notices and extra cookies.
#[derive(Debug)]
pub struct FlashRedirect {
    location: String,
    notices: Vec<Notice>,
    cookies: Vec<HeaderValue>,
}

impl FlashRedirect {
    pub fn to(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            notices: Vec::new(),
            cookies: Vec::new(),
        }
    }

    /// Redirect to the referring page when it belongs to this site.
    pub fn back(headers: &HeaderMap, fallback: &str) -> Self {
        Self::to(back_location(headers).unwrap_or_else(|| fallback.to_string()))
    }

    pub fn with_notice(mut self, notice: Notice) -> Self {
        self.notices.push(notice);
        self
    }

    pub fn with_notices(mut self, notices: impl IntoIterator<Item = Notice>) -> Self {
        self.notices.extend(notices);
        self
    }

    pub fn with_cookie(mut self, cookie: HeaderValue) -> Self {
        self.cookies.push(cookie);
        self
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

impl IntoResponse for FlashRedirect {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        match HeaderValue::from_str(&self.location) {
            Ok(v) => {
                headers.insert(LOCATION, v);
            }
            Err(_) => {
                warn!(location = %self.location, "unusable redirect target, using /");
                headers.insert(LOCATION, HeaderValue::from_static("/"));
            }
        }

        if !self.notices.is_empty() {
            let cookie = encode(&self.notices)
                .ok()
                .and_then(|v| set_cookie(FLASH_COOKIE, &v, FLASH_MAX_AGE_SECS, false).ok());
            match cookie {
                Some(c) => {
                    headers.append(SET_COOKIE, c);
                }
                None => warn!("could not encode flash notices"),
            }
        }
        for cookie in self.cookies {
            headers.append(SET_COOKIE, cookie);
        }

        (StatusCode::FOUND, headers).into_response()
    }
}

fn back_location(headers: &HeaderMap) -> Option<String> {
    let referer = headers.get(REFERER)?.to_str().ok()?;
    if referer.starts_with('/') && !referer.starts_with("//") {
        return Some(referer.to_string());
    }
    let host = headers.get(HOST)?.to_str().ok()?;
    let rest = referer
        .strip_prefix("http://")
        .or_else(|| referer.strip_prefix("https://"))?;
    let (authority, path) = match rest.find('/') {
        Some(i) => rest.split_at(i),
        None => (rest, "/"),
    };
    (authority.eq_ignore_ascii_case(host)).then(|| path.to_string())
}

/// JSON page model: what a template would receive.
#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub title: String,
    pub notices: Vec<Notice>,
    pub data: T,
}

impl<T: Serialize> Page<T> {
    pub fn new(title: impl Into<String>, notices: Notices, data: T) -> Self {
        Self {
            title: title.into(),
            notices: notices.0,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for Page<T> {
    fn into_response(self) -> Response {
        let consumed = !self.notices.is_empty();
        let mut res = Json(self).into_response();
        if consumed {
            if let Ok(c) = clear_cookie(FLASH_COOKIE, false) {
                res.headers_mut().append(SET_COOKIE, c);
            }
        }
        res
    }
}

/// Adds `Secure` to flash cookies on the way out when sessions use secure cookies.
pub async fn flash_cookie_policy(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;
    if !state.config.session.cookie_secure {
        return res;
    }

    let prefix = format!("{FLASH_COOKIE}=");
    let cookies: Vec<HeaderValue> = res.headers().get_all(SET_COOKIE).iter().cloned().collect();
    res.headers_mut().remove(SET_COOKIE);
    for cookie in cookies {
        let secured = cookie
            .to_str()
            .ok()
            .filter(|v| v.starts_with(&prefix) && !v.contains("; Secure"))
            .and_then(|v| HeaderValue::from_str(&format!("{v}; Secure")).ok());
        res.headers_mut().append(SET_COOKIE, secured.unwrap_or(cookie));
    }
    res
}
