//! In-memory cookie jar.
//!
//! [`CookieJar`] implements [`CookieStore`] with the usual browser rules:
//! - a `Set-Cookie` without `Domain` is bound to the request host
//! - cookies for a domain the request host does not belong to are ignored
//! - a cookie is sent when its domain and path match the request, it has not
//!   expired, and it is not `Secure` or the request uses `https`
//! - setting a cookie with an empty value deletes it

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use tracing::debug;

use crate::{CookieStore, Error, Request, Response, Result};

/// A cookie, as described by a `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    name: String,
    value: String,
    domain: Option<String>,
    path: String,
    expires: Option<SystemTime>,
    secure: bool,
    http_only: bool,
    discard: bool,
}

impl SetCookie {
    /// Create a cookie for the root path, without domain or expiry.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: "/".to_string(),
            expires: None,
            secure: false,
            http_only: false,
            discard: false,
        }
    }

    /// Parse a `Set-Cookie` header value.
    ///
    /// `Max-Age` takes precedence over `Expires`. Unknown attributes are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the header does not start with a
    /// `name=value` pair.
    pub fn parse(header: &str) -> Result<Self> {
        Self::parse_at(header, SystemTime::now())
    }

    fn parse_at(header: &str, now: SystemTime) -> Result<Self> {
        let mut pieces = header.split(';').map(str::trim).filter(|p| !p.is_empty());
        let (name, value) = pieces
            .next()
            .and_then(|pair| pair.split_once('='))
            .filter(|(name, _)| !name.trim().is_empty())
            .ok_or_else(|| Error::invalid_argument(format!("invalid Set-Cookie header: {header}")))?;

        let mut cookie = Self::new(name.trim(), unquote(value));
        let mut max_age = None;
        for piece in pieces {
            let (key, value) = match piece.split_once('=') {
                Some((key, value)) => (key.trim(), unquote(value)),
                None => (piece, ""),
            };
            match key.to_ascii_lowercase().as_str() {
                "domain" => cookie.domain = Some(value.to_string()).filter(|d| !d.is_empty()),
                "path" => cookie.path = value.to_string(),
                "expires" => cookie.expires = parse_cookie_date(value).or(cookie.expires),
                "max-age" => max_age = value.parse::<i64>().ok(),
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                "discard" => cookie.discard = true,
                _ => {}
            }
        }
        if let Some(seconds) = max_age {
            cookie.expires = Some(match u64::try_from(seconds) {
                Ok(seconds) if seconds > 0 => now + Duration::from_secs(seconds),
                _ => SystemTime::UNIX_EPOCH,
            });
        }
        Ok(cookie)
    }

    /// Set the domain.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Set the path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the expiry.
    #[must_use]
    pub const fn with_expires(mut self, expires: SystemTime) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Only send over `https`.
    #[must_use]
    pub const fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Mark as HTTP only.
    #[must_use]
    pub const fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Mark as a session cookie.
    #[must_use]
    pub const fn with_discard(mut self, discard: bool) -> Self {
        self.discard = discard;
        self
    }

    /// Cookie name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cookie value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Cookie domain.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Cookie path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Expiry, `None` for cookies without one.
    #[must_use]
    pub const fn expires(&self) -> Option<SystemTime> {
        self.expires
    }

    /// Returns `true` for `Secure` cookies.
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        self.secure
    }

    /// Returns `true` for `HttpOnly` cookies.
    #[must_use]
    pub const fn is_http_only(&self) -> bool {
        self.http_only
    }

    /// Returns `true` for cookies marked `Discard`.
    #[must_use]
    pub const fn is_discard(&self) -> bool {
        self.discard
    }

    /// Returns `true` if the cookie lives only as long as the session.
    #[must_use]
    pub const fn is_session(&self) -> bool {
        self.discard || self.expires.is_none()
    }

    /// Returns `true` if the expiry is in the past.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|expires| expires < SystemTime::now())
    }

    /// Path matching as in RFC 6265 §5.1.4.
    #[must_use]
    pub fn matches_path(&self, request_path: &str) -> bool {
        let cookie_path = self.path.as_str();
        if cookie_path == "/" || cookie_path == request_path {
            return true;
        }
        request_path
            .strip_prefix(cookie_path)
            .is_some_and(|rest| cookie_path.ends_with('/') || rest.starts_with('/'))
    }

    /// Domain matching as in RFC 6265 §5.1.3.
    ///
    /// A leading dot on the cookie domain is ignored.
    #[must_use]
    pub fn matches_domain(&self, host: &str) -> bool {
        let cookie_domain = self.domain.as_deref().unwrap_or_default().trim_start_matches('.');
        if cookie_domain.is_empty() || host.eq_ignore_ascii_case(cookie_domain) {
            return true;
        }
        if host.parse::<IpAddr>().is_ok() {
            return false;
        }
        host.len() > cookie_domain.len()
            && host
                .to_ascii_lowercase()
                .ends_with(&format!(".{}", cookie_domain.to_ascii_lowercase()))
    }

    /// Check name, value and domain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid_argument("The cookie name must not be empty"));
        }
        if self.name.chars().any(is_invalid_name_char) {
            return Err(Error::invalid_argument(format!(
                "The cookie name must not contain invalid characters: {}",
                self.name
            )));
        }
        if self.value.is_empty() {
            return Err(Error::invalid_argument("The cookie value must not be empty"));
        }
        if self.domain.as_deref().is_none_or(str::is_empty) {
            return Err(Error::invalid_argument("The cookie domain must not be empty"));
        }
        Ok(())
    }

    fn same_slot(&self, other: &Self) -> bool {
        self.name == other.name && self.path == other.path && self.domain == other.domain
    }

    /// Value as sent in a `Cookie` header.
    fn header_value(&self) -> String {
        let value = self.value.as_str();
        if !value.starts_with('"') && !value.ends_with('"') && value.contains([';', ',']) {
            format!("\"{value}\"")
        } else {
            value.to_string()
        }
    }
}

impl FromStr for SetCookie {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches('"')
}

const fn is_invalid_name_char(c: char) -> bool {
    matches!(
        c,
        '\x00'..='\x20' | '"' | '(' | ')' | ',' | '/' | ':'..='@' | '\\' | '{' | '}' | '\x7f'
    )
}

/// Parse an `Expires` date, accepting the dashed RFC 850 variant.
fn parse_cookie_date(value: &str) -> Option<SystemTime> {
    httpdate::parse_http_date(value)
        .ok()
        .or_else(|| httpdate::parse_http_date(&value.replace('-', " ")).ok())
}

/// Directory of the request path, as in RFC 6265 §5.1.4.
fn default_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => request_path.get(..idx).unwrap_or("/").to_string(),
    }
}

/// A thread-safe cookie store.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use sheaf::{CookieJar, Options};
///
/// let jar = Arc::new(CookieJar::from_pairs([("session", "abc")], "example.com"));
/// let options = Options::default().with_cookies(jar.clone());
/// ```
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: Mutex<Vec<SetCookie>>,
}

impl CookieJar {
    /// Create an empty jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a jar of session cookies for `domain`.
    pub fn from_pairs<I, K, V>(pairs: I, domain: &str) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let jar = Self::new();
        for (name, value) in pairs {
            jar.set_cookie(
                SetCookie::new(name, value)
                    .with_domain(domain)
                    .with_discard(true),
            );
        }
        jar
    }

    /// Store a cookie. Returns `true` if the jar changed.
    ///
    /// An invalid cookie is rejected; if its value is empty, the cookie it
    /// would have replaced is removed instead. A cookie with the same name,
    /// path and domain as a stored one replaces it when the stored cookie is
    /// a discard cookie and the new one is not, when it expires later, or
    /// when its value differs.
    pub fn set_cookie(&self, cookie: SetCookie) -> bool {
        if let Err(err) = cookie.validate() {
            if cookie.value.is_empty() {
                if let Some(domain) = cookie.domain.as_deref() {
                    self.clear_matching(domain, Some(&cookie.path), Some(&cookie.name));
                }
            }
            debug!(name = %cookie.name, error = %err, "ignoring cookie");
            return false;
        }

        let mut cookies = self.lock();
        let mut keep_existing = false;
        cookies.retain(|existing| {
            if keep_existing || !existing.same_slot(&cookie) {
                return true;
            }
            let replace = (!cookie.discard && existing.discard)
                || cookie.expires > existing.expires
                || cookie.value != existing.value;
            keep_existing = !replace;
            !replace
        });
        if keep_existing {
            return false;
        }
        cookies.push(cookie);
        true
    }

    /// Number of stored cookies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if the jar holds no cookie.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// First cookie named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<SetCookie> {
        self.lock().iter().find(|cookie| cookie.name == name).cloned()
    }

    /// Snapshot of the stored cookies.
    pub fn iter(&self) -> impl Iterator<Item = SetCookie> {
        self.lock().clone().into_iter()
    }

    /// Remove every cookie.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Remove the cookies matching `domain`, and `path` and `name` when given.
    pub fn clear_matching(&self, domain: &str, path: Option<&str>, name: Option<&str>) {
        self.lock().retain(|cookie| {
            let matches = cookie.matches_domain(domain)
                && path.is_none_or(|path| cookie.matches_path(path))
                && name.is_none_or(|name| cookie.name == name);
            !matches
        });
    }

    /// Remove session cookies.
    pub fn clear_session_cookies(&self) {
        self.lock().retain(|cookie| !cookie.is_session());
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SetCookie>> {
        self.cookies.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CookieStore for CookieJar {
    fn with_cookie_header(&self, request: Request) -> Request {
        let url = request.url();
        let host = url.host_str().unwrap_or_default();
        let path = url.path();
        let secure = url.scheme() == "https";

        let values: Vec<String> = self
            .lock()
            .iter()
            .filter(|cookie| {
                cookie.matches_path(path)
                    && cookie.matches_domain(host)
                    && !cookie.is_expired()
                    && (!cookie.secure || secure)
            })
            .map(|cookie| format!("{}={}", cookie.name, cookie.header_value()))
            .collect();

        if values.is_empty() {
            return request;
        }
        request.with_header("Cookie", values.join("; "))
    }

    fn extract_cookies(&self, request: &Request, response: &Response) {
        let url = request.url();
        let host = url.host_str().unwrap_or_default();
        for header in response.headers().get_all("Set-Cookie") {
            let mut cookie = match SetCookie::parse(header) {
                Ok(cookie) => cookie,
                Err(err) => {
                    debug!(error = %err, "ignoring Set-Cookie header");
                    continue;
                }
            };
            if cookie.domain.is_none() {
                cookie.domain = Some(host.to_string());
            }
            if !cookie.path.starts_with('/') {
                cookie.path = default_path(url.path());
            }
            if !cookie.matches_domain(host) {
                debug!(name = %cookie.name, host, "ignoring cookie for another domain");
                continue;
            }
            self.set_cookie(cookie);
        }
    }
}
