//! Session id cookie.

use crate::config::Config;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use oidc_pkce_client::SessionId;

#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: String,
    pub secure: bool,
    pub max_age_seconds: u64,
}

impl CookieSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            name: config.session.cookie_name.clone(),
            secure: config.secure_cookies(),
            max_age_seconds: config.session.ttl_seconds,
        }
    }

    /// Session id carried by the request, if it is well formed.
    pub fn session_id(&self, jar: &CookieJar) -> Option<SessionId> {
        jar.get(&self.name)
            .and_then(|cookie| SessionId::parse(cookie.value()))
    }

    pub fn session_cookie(&self, session_id: &SessionId) -> Cookie<'static> {
        Cookie::build((self.name.clone(), session_id.as_str().to_string()))
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .path("/")
            .max_age(time::Duration::seconds(
                i64::try_from(self.max_age_seconds).unwrap_or(i64::MAX),
            ))
            .build()
    }

    /// Cookie that makes the browser drop the session id.
    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((self.name.clone(), ""))
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .path("/")
            .max_age(time::Duration::ZERO)
            .build()
    }
}
