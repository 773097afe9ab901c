use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::cookies::{clear_cookie, cookie_value, set_cookie};
use crate::{auth::repo_types::User, config::SessionConfig, state::AppState};

pub const SESSION_COOKIE: &str = "session";

/// Session token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,   // user ID
    pub iat: usize,  // issued at (unix timestamp)
    pub exp: usize,  // expires at (unix timestamp)
    pub iss: String, // issuer
    pub aud: String, // audience
}

/// Signing material for session cookies.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
    cookie_secure: bool,
}

impl SessionKeys {
    pub fn from_config(cfg: &SessionConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes.max(1) as u64) * 60),
            cookie_secure: cfg.cookie_secure,
        }
    }

    pub fn sign(&self, user_id: Uuid) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "session signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    /// Establish a session: the `Set-Cookie` value for a fresh token.
    pub fn session_cookie(&self, user_id: Uuid) -> anyhow::Result<HeaderValue> {
        let token = self.sign(user_id)?;
        Ok(set_cookie(
            SESSION_COOKIE,
            &token,
            self.ttl.as_secs() as i64,
            self.cookie_secure,
        )?)
    }

    /// Destroy a session.
    pub fn clear_session_cookie(&self) -> anyhow::Result<HeaderValue> {
        Ok(clear_cookie(SESSION_COOKIE, self.cookie_secure)?)
    }
}

/// The account the request is authenticated as, placed in request
/// extensions by the login gate.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Resolve the session cookie to a live account.
///
/// Missing, forged or expired tokens and deleted accounts all yield `Ok(None)`;
/// only a store failure is an error.
pub async fn authenticated_user(
    state: &AppState,
    headers: &HeaderMap,
) -> anyhow::Result<Option<User>> {
    let Some(token) = cookie_value(headers, SESSION_COOKIE) else {
        return Ok(None);
    };
    let claims = match state.sessions.verify(&token) {
        Ok(c) => c,
        Err(e) => {
            debug!(error = %e, "session token rejected");
            return Ok(None);
        }
    };
    state.users.find_by_id(claims.sub).await
}
