//! Session cookie handling
//!
//! Binds a session token to an httpOnly cookie. The manager only touches
//! cookie headers; it never inspects the token.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

/// Default session cookie name
pub const SESSION_COOKIE: &str = "auth-token";

/// Session cookie settings, fixed at startup
#[derive(Debug, Clone)]
pub struct SessionCookies {
    name: String,
    secure: bool,
    max_age_secs: i64,
}

impl SessionCookies {
    /// `secure` should be true whenever the service is reached over HTTPS
    pub fn new(name: impl Into<String>, secure: bool, max_age_secs: i64) -> Self {
        Self {
            name: name.into(),
            secure,
            max_age_secs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Add the session cookie carrying `token`
    pub fn attach(&self, jar: CookieJar, token: &str) -> CookieJar {
        jar.add(self.build(token.to_string(), Duration::seconds(self.max_age_secs)))
    }

    /// Read the session token, if any
    ///
    /// An emptied cookie counts as absent.
    pub fn extract(&self, jar: &CookieJar) -> Option<String> {
        jar.get(&self.name)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
    }

    /// Tell the client to drop the session cookie
    ///
    /// Attributes match `attach` so browsers honour the deletion.
    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        jar.add(self.build(String::new(), Duration::ZERO))
    }

    fn build(&self, value: String, max_age: Duration) -> Cookie<'static> {
        Cookie::build((self.name.clone(), value))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(max_age)
            .build()
    }
}

impl Default for SessionCookies {
    fn default() -> Self {
        Self::new(SESSION_COOKIE, false, 7 * 24 * 60 * 60)
    }
}
