//! Multipart form bodies.
//!
//! A [`Multipart`] form is a list of [`Part`]s, each carrying a field name,
//! its contents as a [`Body`], and optional headers. A form made only of
//! buffered parts encodes to a buffered body; one streamed part makes the
//! whole form a stream, with a known size when every part has one.
//!
//! # Example
//!
//! ```ignore
//! use sheaf_core::{Multipart, Options, Part};
//!
//! let form = Multipart::new()
//!     .text("name", "John Doe")
//!     .part(Part::file("avatar", "photo.jpg", photo_bytes));
//!
//! let options = Options::default().with_multipart(form);
//! ```

use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::{StreamExt, future, stream};

use crate::{Body, BodyStream, Headers, mime_from_file_name};

/// One field of a multipart form.
#[derive(Debug, Clone)]
pub struct Part {
    name: String,
    contents: Body,
    filename: Option<String>,
    headers: Headers,
}

impl Part {
    /// A part with the given contents.
    ///
    /// The body's file name, if any, becomes the part's filename.
    #[must_use]
    pub fn new(name: impl Into<String>, contents: impl Into<Body>) -> Self {
        let contents = contents.into();
        let filename = contents.file_name().map(str::to_string);
        Self {
            name: name.into(),
            contents,
            filename,
            headers: Headers::new(),
        }
    }

    /// A plain text field.
    #[must_use]
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, value.into())
    }

    /// A file field. The content type is guessed from `filename`.
    #[must_use]
    pub fn file(
        name: impl Into<String>,
        filename: impl Into<String>,
        contents: impl Into<Body>,
    ) -> Self {
        Self::new(name, contents).with_filename(filename)
    }

    /// Set the filename.
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Set the content type.
    #[must_use]
    pub fn with_content_type(self, content_type: impl Into<String>) -> Self {
        self.with_header("Content-Type", content_type)
    }

    /// Set a part header, replacing existing values.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Filename, if set.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Part contents.
    #[must_use]
    pub const fn contents(&self) -> &Body {
        &self.contents
    }

    /// Headers given explicitly.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Boundary line and headers preceding the contents.
    fn head(&self, boundary: &str) -> Bytes {
        let mut headers = self.headers.clone();
        if !headers.contains("Content-Disposition") {
            let disposition = match &self.filename {
                Some(filename) => {
                    format!("form-data; name=\"{}\"; filename=\"{filename}\"", self.name)
                }
                None => format!("form-data; name=\"{}\"", self.name),
            };
            headers.insert("Content-Disposition", disposition);
        }
        if let Some(filename) = &self.filename
            && !headers.contains("Content-Type")
        {
            let mime = mime_from_file_name(filename).unwrap_or("application/octet-stream");
            headers.insert("Content-Type", mime);
        }

        let mut buf = BytesMut::new();
        buf.put_slice(b"--");
        buf.put_slice(boundary.as_bytes());
        buf.put_slice(b"\r\n");
        for (name, value) in headers.iter() {
            buf.put_slice(name.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"\r\n");
        buf.freeze()
    }
}

/// A `multipart/form-data` form.
#[derive(Debug, Clone)]
pub struct Multipart {
    boundary: String,
    parts: Vec<Part>,
}

impl Default for Multipart {
    fn default() -> Self {
        Self::new()
    }
}

impl Multipart {
    /// An empty form with a generated boundary.
    #[must_use]
    pub fn new() -> Self {
        Self::with_boundary(generate_boundary())
    }

    /// An empty form with the given boundary.
    ///
    /// The boundary must not appear in any part's contents.
    #[must_use]
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    /// Add a part.
    #[must_use]
    pub fn part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// Add a plain text field.
    #[must_use]
    pub fn text(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.part(Part::text(name, value))
    }

    /// Add a file field.
    #[must_use]
    pub fn file(
        self,
        name: impl Into<String>,
        filename: impl Into<String>,
        contents: impl Into<Body>,
    ) -> Self {
        self.part(Part::file(name, filename, contents))
    }

    /// Boundary string.
    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Parts, in order.
    #[must_use]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// `Content-Type` header value, including the boundary.
    #[must_use]
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Encode the form into a body.
    #[must_use]
    pub fn into_body(self) -> Body {
        let mut segments = Vec::with_capacity(self.parts.len() * 3 + 1);
        for part in self.parts {
            segments.push(Body::from(part.head(&self.boundary)));
            segments.push(part.contents);
            segments.push(Body::from(Bytes::from_static(b"\r\n")));
        }
        segments.push(Body::from(format!("--{}--\r\n", self.boundary)));

        if segments.iter().all(Body::is_seekable) {
            let mut buf = BytesMut::new();
            for bytes in segments.iter().filter_map(Body::as_bytes) {
                buf.put_slice(bytes);
            }
            return Body::from(buf.freeze());
        }

        let size = segments.iter().map(Body::size).sum::<Option<u64>>();
        let chunks = stream::iter(segments).flat_map(|segment| -> BodyStream {
            if let Some(bytes) = segment.as_bytes() {
                return Box::pin(stream::once(future::ready(Ok(bytes.clone()))));
            }
            segment.take_stream().unwrap_or_else(|| {
                Box::pin(stream::once(future::ready(Err(io::Error::other(
                    "multipart part stream was already consumed",
                )))))
            })
        });
        Body::from_stream(chunks, size)
    }
}

fn generate_boundary() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("sheaf-{nanos:x}")
}
