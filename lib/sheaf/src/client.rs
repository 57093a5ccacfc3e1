//! User-facing client on top of a [`HandlerStack`].
//!
//! The client owns default [`Options`], turns request-shaping options
//! (`headers`, `query`, `auth`, `json`, `form_params`, `multipart`, `body`,
//! `version`) into changes of the outgoing [`Request`], and hands the result
//! to its stack.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use tracing::debug;
use url::Url;

use crate::{
    AllowRedirects, Auth, ContentType, CookieJar, CookieStore, CookiesOption, Error, HandlerStack,
    HttpClient, HyperTransport, Method, Options, RedirectOptions, Request, Response,
    ResponseFuture, Result, config::ClientConfig,
};

/// HTTP client dispatching through a handler stack.
///
/// Cloning is cheap: clones share the stack, the transport connection pool
/// and the cookie jar.
///
/// # Example
///
/// ```ignore
/// use sheaf::{Client, HttpClientExt, Options};
///
/// let client = Client::builder().base_uri("https://api.example.com/v1/").build()?;
/// let response = client.get("users/42").await?;
/// ```
#[derive(Clone)]
pub struct Client {
    stack: HandlerStack,
    base_uri: Option<Url>,
    defaults: Options,
    jar: Option<Arc<CookieJar>>,
    config: ClientConfig,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("stack", &self.stack)
            .field("base_uri", &self.base_uri.as_ref().map(Url::as_str))
            .field("defaults", &self.defaults)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Create a client with the default stack over [`HyperTransport`].
    #[must_use]
    pub fn new() -> Self {
        ClientBuilder::default().finish(None)
    }

    /// Create a client builder.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// The stack requests go through.
    #[must_use]
    pub const fn handler_stack(&self) -> &HandlerStack {
        &self.stack
    }

    /// Base URI relative requests are resolved against.
    #[must_use]
    pub const fn base_uri(&self) -> Option<&Url> {
        self.base_uri.as_ref()
    }

    /// Options merged into every call.
    #[must_use]
    pub const fn default_options(&self) -> &Options {
        &self.defaults
    }

    /// Cookie jar shared by every call, when cookies are enabled.
    #[must_use]
    pub fn cookie_jar(&self) -> Option<&CookieJar> {
        self.jar.as_deref()
    }

    /// Transport configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a request.
    ///
    /// `options` are merged with the client defaults, call values winning.
    #[must_use]
    pub fn send(&self, request: Request, options: Options) -> ResponseFuture {
        self.dispatch(request, options)
    }

    /// Send a request to `uri`, resolved against the base URI.
    #[must_use]
    pub fn request(&self, method: Method, uri: &str, options: Options) -> ResponseFuture {
        match self.resolve(uri) {
            Ok(url) => self.dispatch(Request::new(method, url), options),
            Err(err) => Box::pin(async move { Err(err) }),
        }
    }

    fn resolve(&self, uri: &str) -> Result<Url> {
        let url = match &self.base_uri {
            Some(base) => base.join(uri)?,
            None => Url::parse(uri)?,
        };
        Ok(url)
    }

    fn dispatch(&self, request: Request, options: Options) -> ResponseFuture {
        let prepared = self.prepare(request, options);
        let handler = self.stack.resolve();
        Box::pin(async move {
            let (request, options) = prepared?;
            handler?.call(request, options).await
        })
    }

    /// Apply the request-shaping options, which are consumed.
    fn prepare(&self, request: Request, options: Options) -> Result<(Request, Options)> {
        let mut options = options.with_defaults(&self.defaults);
        let mut request = request;

        let mut replaced: Vec<&str> = Vec::new();
        for (name, value) in options.headers.iter() {
            request = if replaced.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                request.with_added_header(name, value)
            } else {
                replaced.push(name);
                request.with_header(name, value)
            };
        }
        options.headers = crate::Headers::new();

        let query = std::mem::take(&mut options.query);
        if !query.is_empty() {
            let mut url = request.url().clone();
            url.set_query(None);
            url.query_pairs_mut().extend_pairs(query);
            request = request.with_url(url);
        }

        request = match &options.auth {
            Some(Auth::Basic { username, password }) => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{password}"));
                request.with_header("Authorization", format!("Basic {encoded}"))
            }
            Some(auth) => {
                debug!(scheme = auth.scheme(), "authentication left to the transport");
                request
            }
            None => request,
        };

        request = Self::apply_body(request, &mut options)?;

        if let Some(version) = options.version {
            request = request.with_version(version);
        }
        if !request.headers().contains("User-Agent") {
            request = request.with_header("User-Agent", self.config.user_agent.as_str());
        }

        Ok((request, options))
    }

    fn apply_body(request: Request, options: &mut Options) -> Result<Request> {
        let json = options.json.take();
        let form = std::mem::take(&mut options.form_params);
        let multipart = options.multipart.take();
        let body = options.body.take();

        let given = [
            json.is_some(),
            !form.is_empty(),
            multipart.is_some(),
            body.is_some(),
        ];
        if given.iter().filter(|set| **set).count() > 1 {
            return Err(Error::invalid_argument(
                "the json, form_params, multipart and body options are mutually exclusive",
            ));
        }

        if let Some(value) = json {
            let bytes = crate::to_json(&value)?;
            return Ok(with_default_content_type(request, ContentType::Json).with_body(bytes));
        }
        if !form.is_empty() {
            let bytes = crate::to_form(&form)?;
            return Ok(
                with_default_content_type(request, ContentType::FormUrlEncoded).with_body(bytes),
            );
        }
        if let Some(form) = multipart {
            let request = if request.headers().contains("Content-Type") {
                request
            } else {
                request.with_header("Content-Type", form.content_type())
            };
            return Ok(request.with_body(form.into_body()));
        }
        Ok(match body {
            Some(body) => request.with_body(body),
            None => request,
        })
    }
}

fn with_default_content_type(request: Request, content_type: ContentType) -> Request {
    if request.headers().contains("Content-Type") {
        request
    } else {
        request.with_header("Content-Type", content_type.as_str())
    }
}

impl HttpClient for Client {
    fn send(
        &self,
        request: Request,
        options: Options,
    ) -> impl Future<Output = Result<Response>> + Send {
        self.dispatch(request, options)
    }

    fn resolve_url(&self, uri: &str) -> Result<Url> {
        self.resolve(uri)
    }
}

/// Builder for [`Client`].
///
/// Defaults: redirects followed with [`RedirectOptions::default`], 4xx/5xx
/// responses raised as errors, no cookies.
#[derive(Debug)]
pub struct ClientBuilder {
    stack: Option<HandlerStack>,
    base_uri: Option<String>,
    defaults: Options,
    cookies: bool,
    config: ClientConfig,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            stack: None,
            base_uri: None,
            defaults: Options::default()
                .with_allow_redirects(RedirectOptions::default())
                .with_http_errors(true),
            cookies: false,
            config: ClientConfig::default(),
        }
    }
}

impl ClientBuilder {
    /// Use `stack` instead of the default one over [`HyperTransport`].
    #[must_use]
    pub fn handler(mut self, stack: HandlerStack) -> Self {
        self.stack = Some(stack);
        self
    }

    /// Resolve relative URIs against `base_uri`.
    #[must_use]
    pub fn base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    /// Merge `options` into the defaults, `options` winning.
    #[must_use]
    pub fn default_options(mut self, options: Options) -> Self {
        self.defaults = options.with_defaults(&self.defaults);
        self
    }

    /// Add a default header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.headers.append(name, value);
        self
    }

    /// Set the default per-call timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.defaults.timeout = Some(timeout);
        self
    }

    /// Share a fresh [`CookieJar`] between every call.
    #[must_use]
    pub const fn cookies(mut self, enabled: bool) -> Self {
        self.cookies = enabled;
        self
    }

    /// Raise 4xx/5xx responses as errors.
    #[must_use]
    pub fn http_errors(mut self, enabled: bool) -> Self {
        self.defaults.http_errors = Some(enabled);
        self
    }

    /// Set the redirect policy, `None` to not follow redirects.
    #[must_use]
    pub fn allow_redirects(mut self, redirects: Option<RedirectOptions>) -> Self {
        self.defaults.allow_redirects =
            Some(redirects.map_or(AllowRedirects::Disabled, AllowRedirects::Follow));
        self
    }

    /// Replace the transport configuration.
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the connect timeout of the default transport.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the maximum idle connections per host of the default transport.
    #[must_use]
    pub const fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.config.pool_idle_per_host = count;
        self
    }

    /// Set the idle connection timeout of the default transport.
    #[must_use]
    pub const fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set whether the default transport resends canceled requests.
    #[must_use]
    pub const fn retry_on_connection_failure(mut self, retry: bool) -> Self {
        self.config.retry_on_connection_failure = retry;
        self
    }

    /// Set the `User-Agent` added to requests lacking one.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] for an unparsable base URI and
    /// [`Error::NoHandler`] for a stack without handler.
    pub fn build(self) -> Result<Client> {
        let base_uri = self.base_uri.as_deref().map(Url::parse).transpose()?;
        if self.stack.as_ref().is_some_and(|stack| !stack.has_handler()) {
            return Err(Error::NoHandler);
        }
        Ok(self.finish(base_uri))
    }

    fn finish(self, base_uri: Option<Url>) -> Client {
        let stack = self.stack.unwrap_or_else(|| {
            HandlerStack::create(HyperTransport::with_config(self.config.clone()).handler())
        });

        let mut defaults = self.defaults;
        let jar = self.cookies.then(|| Arc::new(CookieJar::new()));
        if let Some(jar) = &jar {
            let store: Arc<dyn CookieStore> = jar.clone();
            defaults.cookies = Some(CookiesOption::Jar(store));
        }

        Client {
            stack,
            base_uri,
            defaults,
            jar,
            config: self.config,
        }
    }
}
