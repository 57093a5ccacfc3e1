//! Per-call request options.
//!
//! [`Options`] travel next to a [`Request`] through every handler and
//! middleware; they are never stored on the request itself. Every field is
//! "unset" by default, and [`Options::with_defaults`] fills the unset fields
//! from another set of options, so a client's defaults and a call's
//! overrides compose field by field.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use http::Version;

use crate::{Body, CookieStore, Headers, Multipart, Request, Response, Result};

/// Default threshold above which `Expect: 100-Continue` is sent (1 MiB).
pub const DEFAULT_EXPECT_THRESHOLD: u64 = 1_048_576;

/// Callback invoked before each redirect hop.
///
/// Receives the request that was redirected, the redirect response, and the
/// resolved target. Returning an error aborts the redirect chain.
pub type OnRedirect = Arc<dyn Fn(&Request, &Response, &url::Url) -> Result<()> + Send + Sync>;

/// Redirect policy.
#[derive(Clone)]
pub struct RedirectOptions {
    /// Maximum number of hops for one transfer.
    pub max: usize,
    /// Allowed schemes for redirect targets.
    pub protocols: Vec<String>,
    /// Keep the method and body on 301/302 responses.
    pub strict: bool,
    /// Send a `Referer` header on hops.
    pub referer: bool,
    /// Record hop targets and status codes on the final response.
    pub track_redirects: bool,
    /// Observer called before each hop.
    pub on_redirect: Option<OnRedirect>,
}

impl Default for RedirectOptions {
    fn default() -> Self {
        Self {
            max: 5,
            protocols: vec!["http".to_string(), "https".to_string()],
            strict: false,
            referer: false,
            track_redirects: false,
            on_redirect: None,
        }
    }
}

impl RedirectOptions {
    /// Set the maximum number of hops.
    #[must_use]
    pub const fn max(mut self, max: usize) -> Self {
        self.max = max;
        self
    }

    /// Set the allowed schemes.
    #[must_use]
    pub fn protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Set strict mode.
    #[must_use]
    pub const fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Enable or disable the `Referer` header.
    #[must_use]
    pub const fn referer(mut self, referer: bool) -> Self {
        self.referer = referer;
        self
    }

    /// Enable or disable redirect tracking headers.
    #[must_use]
    pub const fn track_redirects(mut self, track: bool) -> Self {
        self.track_redirects = track;
        self
    }

    /// Set the hop observer.
    #[must_use]
    pub fn on_redirect<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request, &Response, &url::Url) -> Result<()> + Send + Sync + 'static,
    {
        self.on_redirect = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for RedirectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedirectOptions")
            .field("max", &self.max)
            .field("protocols", &self.protocols)
            .field("strict", &self.strict)
            .field("referer", &self.referer)
            .field("track_redirects", &self.track_redirects)
            .field("on_redirect", &self.on_redirect.is_some())
            .finish()
    }
}

/// Whether redirects are followed.
#[derive(Debug, Clone)]
pub enum AllowRedirects {
    /// 3xx responses are returned as they are.
    Disabled,
    /// Redirects are followed with the given policy.
    Follow(RedirectOptions),
}

impl From<bool> for AllowRedirects {
    fn from(follow: bool) -> Self {
        if follow {
            Self::Follow(RedirectOptions::default())
        } else {
            Self::Disabled
        }
    }
}

impl From<RedirectOptions> for AllowRedirects {
    fn from(options: RedirectOptions) -> Self {
        Self::Follow(options)
    }
}

/// Whether cookies are sent and stored.
#[derive(Clone)]
pub enum CookiesOption {
    /// No cookie handling, even when a default store is configured.
    Disabled,
    /// Use this store.
    Jar(Arc<dyn CookieStore>),
}

impl fmt::Debug for CookiesOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::Jar(_) => f.write_str("Jar"),
        }
    }
}

impl From<Arc<dyn CookieStore>> for CookiesOption {
    fn from(store: Arc<dyn CookieStore>) -> Self {
        Self::Jar(store)
    }
}

/// `Expect: 100-Continue` policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// Never add the header.
    Disabled,
    /// Always add the header to requests with a body.
    Always,
    /// Add the header when the body size is unknown or at least this many bytes.
    Threshold(u64),
}

impl Default for Expect {
    fn default() -> Self {
        Self::Threshold(DEFAULT_EXPECT_THRESHOLD)
    }
}

impl From<bool> for Expect {
    fn from(enabled: bool) -> Self {
        if enabled { Self::Always } else { Self::Disabled }
    }
}

impl From<u64> for Expect {
    fn from(threshold: u64) -> Self {
        Self::Threshold(threshold)
    }
}

/// Credentials for a request.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// HTTP basic authentication.
    Basic {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// HTTP digest authentication, handled by the transport.
    Digest {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// NTLM authentication, handled by the transport.
    Ntlm {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
}

impl Auth {
    /// Basic credentials.
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Name of the scheme.
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        match self {
            Self::Basic { .. } => "basic",
            Self::Digest { .. } => "digest",
            Self::Ntlm { .. } => "ntlm",
        }
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (Self::Basic { username, .. }
        | Self::Digest { username, .. }
        | Self::Ntlm { username, .. }) = self;
        f.debug_struct("Auth")
            .field("scheme", &self.scheme())
            .field("username", username)
            .field("password", &"***")
            .finish()
    }
}

/// Per-call options.
#[derive(Clone, Default)]
pub struct Options {
    /// Redirect policy.
    pub allow_redirects: Option<AllowRedirects>,
    /// Cookie handling used by the cookies middleware.
    pub cookies: Option<CookiesOption>,
    /// Turn 4xx/5xx responses into errors.
    pub http_errors: Option<bool>,
    /// `Expect: 100-Continue` policy.
    pub expect: Option<Expect>,
    /// Headers added to the request.
    pub headers: Headers,
    /// Query string replacing the request's one, when not empty.
    pub query: Vec<(String, String)>,
    /// Credentials.
    pub auth: Option<Auth>,
    /// JSON body.
    pub json: Option<serde_json::Value>,
    /// Form body, when not empty.
    pub form_params: Vec<(String, String)>,
    /// Raw body.
    pub body: Option<Body>,
    /// `multipart/form-data` body.
    pub multipart: Option<Multipart>,
    /// Total timeout of one transfer.
    pub timeout: Option<Duration>,
    /// Delay before sending.
    pub delay: Option<Duration>,
    /// Proxy URL, forwarded to the transport.
    pub proxy: Option<String>,
    /// File the response body is written to.
    pub sink: Option<PathBuf>,
    /// Protocol version of the request.
    pub version: Option<Version>,
    /// Unrecognized options, forwarded untouched.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Options {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Redirect policy, `None` when redirects are not followed.
    #[must_use]
    pub const fn redirect_options(&self) -> Option<&RedirectOptions> {
        match &self.allow_redirects {
            Some(AllowRedirects::Follow(options)) => Some(options),
            _ => None,
        }
    }

    /// Cookie store in use, `None` when unset or disabled.
    #[must_use]
    pub const fn cookie_store(&self) -> Option<&Arc<dyn CookieStore>> {
        match &self.cookies {
            Some(CookiesOption::Jar(store)) => Some(store),
            _ => None,
        }
    }

    /// Whether 4xx/5xx responses become errors. Unset means no.
    #[must_use]
    pub fn raises_http_errors(&self) -> bool {
        self.http_errors.unwrap_or(false)
    }

    /// Effective `Expect` policy.
    #[must_use]
    pub fn expect_policy(&self) -> Expect {
        self.expect.unwrap_or_default()
    }

    /// Fill every unset field from `defaults`.
    ///
    /// Headers are merged name by name, with `self` winning; `extra` keys
    /// are merged the same way.
    #[must_use]
    pub fn with_defaults(self, defaults: &Self) -> Self {
        let mut headers = defaults.headers.clone();
        let mut overridden = Vec::new();
        for (name, value) in self.headers {
            if !overridden.iter().any(|n: &String| n.eq_ignore_ascii_case(&name)) {
                headers.remove(&name);
                overridden.push(name.clone());
            }
            headers.append(name, value);
        }

        let mut extra = defaults.extra.clone();
        extra.extend(self.extra);

        Self {
            allow_redirects: self
                .allow_redirects
                .or_else(|| defaults.allow_redirects.clone()),
            cookies: self.cookies.or_else(|| defaults.cookies.clone()),
            http_errors: self.http_errors.or(defaults.http_errors),
            expect: self.expect.or(defaults.expect),
            headers,
            query: if self.query.is_empty() {
                defaults.query.clone()
            } else {
                self.query
            },
            auth: self.auth.or_else(|| defaults.auth.clone()),
            json: self.json.or_else(|| defaults.json.clone()),
            form_params: if self.form_params.is_empty() {
                defaults.form_params.clone()
            } else {
                self.form_params
            },
            body: self.body.or_else(|| defaults.body.clone()),
            multipart: self.multipart.or_else(|| defaults.multipart.clone()),
            timeout: self.timeout.or(defaults.timeout),
            delay: self.delay.or(defaults.delay),
            proxy: self.proxy.or_else(|| defaults.proxy.clone()),
            sink: self.sink.or_else(|| defaults.sink.clone()),
            version: self.version.or(defaults.version),
            extra,
        }
    }

    /// Set the redirect policy.
    #[must_use]
    pub fn with_allow_redirects(mut self, redirects: impl Into<AllowRedirects>) -> Self {
        self.allow_redirects = Some(redirects.into());
        self
    }

    /// Set the cookie store.
    #[must_use]
    pub fn with_cookies(mut self, store: Arc<dyn CookieStore>) -> Self {
        self.cookies = Some(CookiesOption::Jar(store));
        self
    }

    /// Turn cookie handling off for this call.
    #[must_use]
    pub fn without_cookies(mut self) -> Self {
        self.cookies = Some(CookiesOption::Disabled);
        self
    }

    /// Enable or disable HTTP status errors.
    #[must_use]
    pub const fn with_http_errors(mut self, enabled: bool) -> Self {
        self.http_errors = Some(enabled);
        self
    }

    /// Set the `Expect` policy.
    #[must_use]
    pub fn with_expect(mut self, expect: impl Into<Expect>) -> Self {
        self.expect = Some(expect.into());
        self
    }

    /// Add a header, replacing existing values.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the query string.
    #[must_use]
    pub fn with_query<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Set credentials.
    #[must_use]
    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set a JSON body.
    #[must_use]
    pub fn with_json(mut self, value: serde_json::Value) -> Self {
        self.json = Some(value);
        self
    }

    /// Set a form body.
    #[must_use]
    pub fn with_form_params<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.form_params = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Set a raw body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a `multipart/form-data` body.
    #[must_use]
    pub fn with_multipart(mut self, form: Multipart) -> Self {
        self.multipart = Some(form);
        self
    }

    /// Set the transfer timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set a delay before sending.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set a proxy URL.
    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Write the response body to a file.
    #[must_use]
    pub fn with_sink(mut self, path: impl Into<PathBuf>) -> Self {
        self.sink = Some(path.into());
        self
    }

    /// Set the protocol version.
    #[must_use]
    pub const fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Set an unrecognized option.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("allow_redirects", &self.allow_redirects)
            .field("cookies", &self.cookies)
            .field("http_errors", &self.http_errors)
            .field("expect", &self.expect)
            .field("headers", &self.headers)
            .field("query", &self.query)
            .field("auth", &self.auth)
            .field("json", &self.json)
            .field("form_params", &self.form_params)
            .field("body", &self.body)
            .field("multipart", &self.multipart)
            .field("timeout", &self.timeout)
            .field("delay", &self.delay)
            .field("proxy", &self.proxy)
            .field("sink", &self.sink)
            .field("version", &self.version)
            .field("extra", &self.extra)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;

    #[test]
    fn unset_options_have_raw_semantics() {
        let options = Options::default();
        check!(options.redirect_options().is_none());
        check!(!options.raises_http_errors());
        check!(options.expect_policy() == Expect::Threshold(DEFAULT_EXPECT_THRESHOLD));
    }

    #[test]
    fn redirect_defaults() {
        let options = RedirectOptions::default();
        check!(options.max == 5);
        check!(options.protocols == vec!["http".to_string(), "https".to_string()]);
        check!(!options.strict);
        check!(!options.referer);
        check!(!options.track_redirects);
        check!(options.on_redirect.is_none());
    }

    #[test]
    fn allow_redirects_from_bool() {
        let_assert!(AllowRedirects::Follow(options) = AllowRedirects::from(true));
        check!(options.max == 5);
        let_assert!(AllowRedirects::Disabled = AllowRedirects::from(false));
    }

    #[test]
    fn expect_conversions() {
        check!(Expect::from(true) == Expect::Always);
        check!(Expect::from(false) == Expect::Disabled);
        check!(Expect::from(10_u64) == Expect::Threshold(10));
    }

    #[test]
    fn call_options_win_over_defaults() {
        let defaults = Options::new()
            .with_http_errors(true)
            .with_allow_redirects(true)
            .with_timeout(Duration::from_secs(30))
            .with_header("User-Agent", "sheaf")
            .with_header("Accept", "*/*")
            .with_extra("debug", serde_json::Value::Bool(false));

        let merged = Options::new()
            .with_http_errors(false)
            .with_header("accept", "application/json")
            .with_extra("debug", serde_json::Value::Bool(true))
            .with_defaults(&defaults);

        check!(merged.http_errors == Some(false));
        check!(merged.redirect_options().is_some());
        check!(merged.timeout == Some(Duration::from_secs(30)));
        check!(merged.headers.get("User-Agent") == Some("sheaf"));
        check!(merged.headers.get_all("Accept") == vec!["application/json"]);
        check!(merged.extra.get("debug") == Some(&serde_json::Value::Bool(true)));
    }

    struct NoCookies;

    impl CookieStore for NoCookies {
        fn with_cookie_header(&self, request: Request) -> Request {
            request
        }

        fn extract_cookies(&self, _request: &Request, _response: &Response) {}
    }

    #[test]
    fn disabled_cookies_override_default_store() {
        let defaults = Options::new().with_cookies(Arc::new(NoCookies));
        check!(Options::new().with_defaults(&defaults).cookie_store().is_some());

        let merged = Options::new().without_cookies().with_defaults(&defaults);
        check!(merged.cookie_store().is_none());
        let_assert!(Some(CookiesOption::Disabled) = merged.cookies);
    }

    #[test]
    fn auth_debug_hides_password() {
        let auth = Auth::basic("user", "secret");
        let debug = format!("{auth:?}");
        check!(debug.contains("user"));
        check!(!debug.contains("secret"));
        check!(auth.scheme() == "basic");
    }
}
