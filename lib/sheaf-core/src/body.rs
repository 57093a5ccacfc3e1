//! Request bodies and serialization utilities.
//!
//! A [`Body`] is either empty, a buffered [`Bytes`] value, or a one-shot
//! stream of chunks with a known or unknown size. Buffered bodies can be
//! replayed (they are "seekable"), streams cannot.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use futures_core::Stream;

use crate::Result;

/// A stream of body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

static EMPTY: Bytes = Bytes::new();

/// Body of an outgoing request.
///
/// Cloning a streamed body shares the underlying stream: whichever clone is
/// sent first consumes it.
#[derive(Clone, Default)]
pub struct Body {
    kind: Kind,
    file_name: Option<Arc<str>>,
}

#[derive(Clone, Default)]
enum Kind {
    #[default]
    Empty,
    Full(Bytes),
    Stream {
        slot: Arc<Mutex<Option<BodyStream>>>,
        size: Option<u64>,
    },
}

impl Body {
    /// An empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A streamed body. `size` is the total length when known up front.
    pub fn from_stream<S>(stream: S, size: Option<u64>) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            kind: Kind::Stream {
                slot: Arc::new(Mutex::new(Some(Box::pin(stream)))),
                size,
            },
            file_name: None,
        }
    }

    /// Attach the name of the file this body was read from.
    ///
    /// Used to guess a `Content-Type` when none is set.
    #[must_use]
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(Arc::from(name.into()));
        self
    }

    /// Name of the file this body was read from, if any.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Body size in bytes, `None` when unknown.
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        match &self.kind {
            Kind::Empty => Some(0),
            Kind::Full(bytes) => Some(bytes.len() as u64),
            Kind::Stream { size, .. } => *size,
        }
    }

    /// Returns `true` if the body is known to be empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == Some(0)
    }

    /// Returns `true` if the body can be sent more than once.
    #[must_use]
    pub const fn is_seekable(&self) -> bool {
        !matches!(self.kind, Kind::Stream { .. })
    }

    /// Buffered content, `None` for streamed bodies.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.kind {
            Kind::Empty => Some(&EMPTY),
            Kind::Full(bytes) => Some(bytes),
            Kind::Stream { .. } => None,
        }
    }

    /// Take the underlying stream of a streamed body.
    ///
    /// Returns `None` for buffered bodies and for streams that were already
    /// taken.
    #[must_use]
    pub fn take_stream(&self) -> Option<BodyStream> {
        match &self.kind {
            Kind::Stream { slot, .. } => slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
            _ => None,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Body");
        match &self.kind {
            Kind::Empty => debug.field("kind", &"empty"),
            Kind::Full(bytes) => debug.field("len", &bytes.len()),
            Kind::Stream { size, .. } => debug.field("kind", &"stream").field("size", size),
        };
        if let Some(name) = &self.file_name {
            debug.field("file_name", name);
        }
        debug.finish()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            return Self::empty();
        }
        Self {
            kind: Kind::Full(bytes),
            file_name: None,
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Bytes::from(text).into()
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

/// Content type for request bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// JSON content type (`application/json`).
    Json,
    /// Form URL-encoded content type (`application/x-www-form-urlencoded`).
    FormUrlEncoded,
    /// Plain text content type (`text/plain`).
    PlainText,
    /// Binary content type (`application/octet-stream`).
    OctetStream,
}

impl ContentType {
    /// Get the MIME type string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::FormUrlEncoded => "application/x-www-form-urlencoded",
            Self::PlainText => "text/plain",
            Self::OctetStream => "application/octet-stream",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Guess a MIME type from a file name extension.
#[must_use]
pub fn mime_from_file_name(name: &str) -> Option<&'static str> {
    let (_, extension) = name.rsplit_once('.')?;
    let mime = match extension.to_ascii_lowercase().as_str() {
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" => "application/javascript",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "yaml" | "yml" => "application/yaml",
        "toml" => "application/toml",
        _ => return None,
    };
    Some(mime)
}

/// Serialize a value to JSON bytes.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
///
/// # Example
///
/// ```
/// use sheaf_core::to_json;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct User { name: String }
///
/// let user = User { name: "Alice".to_string() };
/// let bytes = to_json(&user).expect("serialize");
/// assert_eq!(bytes.as_ref(), br#"{"name":"Alice"}"#);
/// ```
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(Into::into)
}

/// Serialize a value to form URL-encoded bytes.
///
/// Uses `serde_html_form` which supports `Vec<T>` for repeated form fields
/// (e.g., `tags=a&tags=b&tags=c`) and sequences of `(name, value)` pairs.
///
/// # Errors
///
/// Returns an error if form serialization fails.
///
/// # Example
///
/// ```
/// use sheaf_core::to_form;
///
/// let pairs = vec![("username", "alice"), ("password", "secret")];
/// let bytes = to_form(&pairs).expect("serialize");
/// assert_eq!(bytes.as_ref(), b"username=alice&password=secret");
/// ```
pub fn to_form<T: serde::Serialize>(value: &T) -> Result<Bytes> {
    serde_html_form::to_string(value)
        .map(|s| Bytes::from(s.into_bytes()))
        .map_err(Into::into)
}

/// Serialize a value to a query string.
///
/// # Errors
///
/// Returns an error if query serialization fails.
pub fn to_query_string<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_html_form::to_string(value).map_err(Into::into)
}

/// Deserialize JSON bytes to a value with path-aware error messages.
///
/// # Errors
///
/// Returns an error if JSON deserialization fails, with the error message
/// including the path to the problematic field (e.g., "user.address.city").
pub fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
        crate::Error::json_deserialization(e.path().to_string(), e.inner().to_string())
    })
}

#[cfg(test)]
mod tests {
    use futures_util::{StreamExt, stream};

    use super::*;

    fn chunks() -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        stream::iter(vec![Ok(Bytes::from("ab")), Ok(Bytes::from("cd"))])
    }

    #[test]
    fn buffered_body_is_seekable_with_known_size() {
        let body = Body::from("test");
        assert_eq!(body.size(), Some(4));
        assert!(body.is_seekable());
        assert_eq!(body.as_bytes().map(Bytes::as_ref), Some(&b"test"[..]));
    }

    #[test]
    fn empty_bytes_become_empty_body() {
        let body = Body::from(Bytes::new());
        assert!(body.is_empty());
        assert_eq!(body.as_bytes().map(Bytes::len), Some(0));
    }

    #[test]
    fn streamed_body_is_not_seekable() {
        let body = Body::from_stream(chunks(), None);
        assert_eq!(body.size(), None);
        assert!(!body.is_seekable());
        assert!(!body.is_empty());
        assert!(body.as_bytes().is_none());
    }

    #[tokio::test]
    async fn stream_can_only_be_taken_once() {
        let body = Body::from_stream(chunks(), Some(4));
        let shared = body.clone();

        let stream = body.take_stream().expect("first take");
        let collected: Vec<_> = stream.collect().await;
        assert_eq!(collected.len(), 2);

        assert!(shared.take_stream().is_none());
    }

    #[test]
    fn file_name_is_kept() {
        let body = Body::from("{}").with_file_name("composer.json");
        assert_eq!(body.file_name(), Some("composer.json"));
        assert_eq!(mime_from_file_name("composer.json"), Some("application/json"));
        assert_eq!(mime_from_file_name("README"), None);
        assert_eq!(mime_from_file_name("photo.JPG"), Some("image/jpeg"));
    }

    #[test]
    fn content_type_as_str() {
        assert_eq!(ContentType::Json.as_str(), "application/json");
        assert_eq!(
            ContentType::FormUrlEncoded.as_str(),
            "application/x-www-form-urlencoded"
        );
        assert_eq!(ContentType::PlainText.to_string(), "text/plain");
    }

    #[test]
    fn to_form_pairs() {
        let pairs = vec![
            ("name".to_string(), "test".to_string()),
            ("tag".to_string(), "a b".to_string()),
        ];
        let bytes = to_form(&pairs).expect("serialize");
        assert_eq!(bytes.as_ref(), b"name=test&tag=a+b");
    }

    #[test]
    fn to_query_string_pairs() {
        let pairs = vec![("q", "rust"), ("page", "1")];
        let query = to_query_string(&pairs).expect("serialize");
        assert_eq!(query, "q=rust&page=1");
    }

    #[test]
    fn from_json_missing_field_error_with_path() {
        #[derive(Debug, serde::Deserialize)]
        struct Address {
            #[allow(dead_code)]
            city: String,
        }

        #[derive(Debug, serde::Deserialize)]
        struct User {
            #[allow(dead_code)]
            address: Address,
        }

        let result: Result<User> = from_json(br#"{"address":{}}"#);
        let msg = result.expect_err("should fail").to_string();
        assert!(msg.contains("address"), "Expected path in error: {msg}");
        assert!(msg.contains("city"), "Expected field in error: {msg}");
    }
}
