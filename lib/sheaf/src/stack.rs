//! Ordered, named middleware stack.
//!
//! The first entry of a [`HandlerStack`] is the outermost middleware: its
//! request logic runs first and its response logic runs last.

use std::fmt;
use std::sync::OnceLock;

use crate::handler::{Handler, Middleware};
use crate::{Error, Result, middleware};

#[derive(Clone)]
struct Entry {
    middleware: Middleware,
    name: Option<String>,
}

/// A terminal handler wrapped by an ordered list of middleware.
///
/// # Example
///
/// ```ignore
/// use sheaf::{HandlerStack, MockHandler, Response, middleware};
///
/// let mut stack = HandlerStack::create(MockHandler::new([Response::new(200, "ok")]).handler());
/// stack.push_named("retry", middleware::retry(|attempt| attempt.retries < 2))?;
/// let handler = stack.resolve()?;
/// ```
#[derive(Clone, Default)]
pub struct HandlerStack {
    handler: Option<Handler>,
    entries: Vec<Entry>,
    resolved: OnceLock<Handler>,
}

impl HandlerStack {
    /// Create an empty stack without a handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty stack around `handler`.
    #[must_use]
    pub fn with_handler(handler: Handler) -> Self {
        Self {
            handler: Some(handler),
            ..Self::default()
        }
    }

    /// Create the default stack around `handler`.
    ///
    /// From outermost to innermost: `http_errors`, `allow_redirects`,
    /// `cookies`, `prepare_body`.
    #[must_use]
    pub fn create(handler: Handler) -> Self {
        let mut stack = Self::with_handler(handler);
        stack.insert_entry(0, middleware::http_errors(), Some("http_errors"));
        stack.insert_entry(1, middleware::redirect(), Some("allow_redirects"));
        stack.insert_entry(2, middleware::cookies(), Some("cookies"));
        stack.insert_entry(3, middleware::prepare_body(), Some("prepare_body"));
        stack
    }

    /// Set the terminal handler, replacing any previous one.
    pub fn set_handler(&mut self, handler: Handler) {
        self.handler = Some(handler);
        self.invalidate();
    }

    /// Returns `true` if a terminal handler is set.
    #[must_use]
    pub const fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Number of middleware entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the stack holds no middleware.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of the entries, outermost first.
    pub fn names(&self) -> impl Iterator<Item = Option<&str>> {
        self.entries.iter().map(|entry| entry.name.as_deref())
    }

    /// Append an unnamed middleware (innermost).
    pub fn push(&mut self, middleware: Middleware) {
        self.insert_entry(self.entries.len(), middleware, None);
    }

    /// Append a named middleware (innermost).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the name is already used.
    pub fn push_named(&mut self, name: &str, middleware: Middleware) -> Result<()> {
        self.ensure_unique(name)?;
        self.insert_entry(self.entries.len(), middleware, Some(name));
        Ok(())
    }

    /// Prepend an unnamed middleware (outermost).
    pub fn unshift(&mut self, middleware: Middleware) {
        self.insert_entry(0, middleware, None);
    }

    /// Prepend a named middleware (outermost).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the name is already used.
    pub fn unshift_named(&mut self, name: &str, middleware: Middleware) -> Result<()> {
        self.ensure_unique(name)?;
        self.insert_entry(0, middleware, Some(name));
        Ok(())
    }

    /// Insert a middleware just outside the entry named `find`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MiddlewareNotFound`] if `find` is not in the stack, or
    /// [`Error::InvalidArgument`] if `name` is already used.
    pub fn before(&mut self, find: &str, middleware: Middleware, name: Option<&str>) -> Result<()> {
        let idx = self.find(find)?;
        if let Some(name) = name {
            self.ensure_unique(name)?;
        }
        self.insert_entry(idx, middleware, name);
        Ok(())
    }

    /// Insert a middleware just inside the entry named `find`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MiddlewareNotFound`] if `find` is not in the stack, or
    /// [`Error::InvalidArgument`] if `name` is already used.
    pub fn after(&mut self, find: &str, middleware: Middleware, name: Option<&str>) -> Result<()> {
        let idx = self.find(find)?;
        if let Some(name) = name {
            self.ensure_unique(name)?;
        }
        self.insert_entry(idx + 1, middleware, name);
        Ok(())
    }

    /// Remove the entry named `name`. Returns `false` if there is none.
    pub fn remove(&mut self, name: &str) -> bool {
        let position = self
            .entries
            .iter()
            .position(|entry| entry.name.as_deref() == Some(name));
        self.remove_at(position)
    }

    /// Remove the first entry holding this exact middleware instance.
    ///
    /// Returns `false` if there is none.
    pub fn remove_middleware(&mut self, middleware: &Middleware) -> bool {
        let position = self
            .entries
            .iter()
            .position(|entry| entry.middleware.ptr_eq(middleware));
        self.remove_at(position)
    }

    /// Compose the middleware around the handler.
    ///
    /// The result is cached until the stack is modified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoHandler`] if no handler was set.
    pub fn resolve(&self) -> Result<Handler> {
        if let Some(resolved) = self.resolved.get() {
            return Ok(resolved.clone());
        }
        let handler = self.handler.clone().ok_or(Error::NoHandler)?;
        let composed = self
            .entries
            .iter()
            .rev()
            .fold(handler, |next, entry| entry.middleware.wrap(next));
        Ok(self.resolved.get_or_init(|| composed).clone())
    }

    fn find(&self, name: &str) -> Result<usize> {
        self.entries
            .iter()
            .position(|entry| entry.name.as_deref() == Some(name))
            .ok_or_else(|| Error::MiddlewareNotFound(name.to_string()))
    }

    fn ensure_unique(&self, name: &str) -> Result<()> {
        if self.find(name).is_ok() {
            return Err(Error::invalid_argument(format!(
                "middleware name already used: {name}"
            )));
        }
        Ok(())
    }

    fn insert_entry(&mut self, idx: usize, middleware: Middleware, name: Option<&str>) {
        self.entries.insert(
            idx,
            Entry {
                middleware,
                name: name.map(str::to_string),
            },
        );
        self.invalidate();
    }

    fn remove_at(&mut self, position: Option<usize>) -> bool {
        let Some(idx) = position else {
            return false;
        };
        self.entries.remove(idx);
        self.invalidate();
        true
    }

    fn invalidate(&mut self) {
        self.resolved = OnceLock::new();
    }
}

impl fmt::Display for HandlerStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self
            .entries
            .iter()
            .rev()
            .enumerate()
            .map(|(idx, entry)| {
                format!(
                    "{}) Name: '{}', Function: {}",
                    idx + 1,
                    entry.name.as_deref().unwrap_or(""),
                    entry.middleware.label()
                )
            })
            .collect();

        for line in lines.iter().rev() {
            writeln!(f, "> {line}")?;
        }
        if let Some(handler) = &self.handler {
            writeln!(f, "< 0) Handler: {}", handler.label())?;
        }
        for line in &lines {
            writeln!(f, "< {line}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for HandlerStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerStack")
            .field("handler", &self.handler)
            .field("entries", &self.names().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
