//! The HTTP-only refresh-token cookie.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::OffsetDateTime;

pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Attributes shared by the issuing and the clearing cookie.
#[derive(Debug, Clone)]
pub struct RefreshCookie {
    path: String,
    secure: bool,
    max_age_seconds: i64,
}

impl RefreshCookie {
    /// `path` is the auth route prefix the browser should send the cookie to.
    pub fn new(path: impl Into<String>, secure: bool, max_age_seconds: i64) -> Self {
        Self {
            path: path.into(),
            secure,
            max_age_seconds,
        }
    }

    fn base(&self, value: String) -> Cookie<'static> {
        let mut cookie = Cookie::new(REFRESH_COOKIE_NAME, value);
        cookie.set_path(self.path.clone());
        cookie.set_http_only(true);
        cookie.set_same_site(SameSite::Strict);
        cookie.set_secure(self.secure);
        cookie
    }

    pub fn issue(&self, jar: CookieJar, secret: String) -> CookieJar {
        let mut cookie = self.base(secret);
        cookie.set_max_age(time::Duration::seconds(self.max_age_seconds));
        jar.add(cookie)
    }

    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        let mut cookie = self.base(String::new());
        cookie.set_max_age(time::Duration::seconds(-1));
        cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
        jar.add(cookie)
    }

    pub fn read(jar: &CookieJar) -> Option<String> {
        jar.get(REFRESH_COOKIE_NAME)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    }
}
