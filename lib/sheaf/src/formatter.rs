//! Message formatting for the log middleware.
//!
//! A [`MessageFormatter`] renders a template where `{name}` placeholders are
//! replaced with parts of a transaction:
//!
//! | Placeholder | Value |
//! |-------------|-------|
//! | `{request}` / `{response}` | Full HTTP message |
//! | `{req_headers}` / `{res_headers}` | Start line and headers |
//! | `{req_body}` / `{res_body}` | Body |
//! | `{ts}`, `{date_iso_8601}` | Current UTC time, RFC 3339 |
//! | `{method}`, `{uri}`, `{url}`, `{target}`, `{host}` | Request parts |
//! | `{version}`, `{req_version}`, `{res_version}` | Protocol versions |
//! | `{code}`, `{phrase}` | Response status |
//! | `{error}` | Error message |
//! | `{req_header_*}`, `{res_header_*}` | A single header, e.g. `{req_header_User-Agent}` |
//!
//! Response placeholders render `NULL` when there is no response, as does
//! `{error}` without an error. Unknown placeholders render as empty strings.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::time::SystemTime;

use http::Version;

use crate::{Error, Headers, Request, Response};

const NULL: &str = "NULL";

/// Renders transactions with a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFormatter {
    template: Cow<'static, str>,
}

impl Default for MessageFormatter {
    fn default() -> Self {
        Self::CLF
    }
}

impl MessageFormatter {
    /// Apache Common Log Format.
    pub const CLF: Self = Self::preset(
        "{host} {req_header_User-Agent} - [{ts}] \"{method} {target} HTTP/{version}\" {code} {res_header_Content-Length}",
    );

    /// Full request, response and error.
    pub const DEBUG: Self =
        Self::preset(">>>>>>>>\n{request}\n<<<<<<<<\n{response}\n--------\n{error}");

    /// Timestamp, request line and status.
    pub const SHORT: Self = Self::preset("[{ts}] \"{method} {target} HTTP/{version}\" {code}");

    const fn preset(template: &'static str) -> Self {
        Self {
            template: Cow::Borrowed(template),
        }
    }

    /// Create a formatter from a template.
    ///
    /// An empty template falls back to [`MessageFormatter::CLF`].
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        if template.is_empty() {
            return Self::CLF;
        }
        Self {
            template: Cow::Owned(template),
        }
    }

    /// The template.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Render a transaction.
    #[must_use]
    pub fn format(
        &self,
        request: &Request,
        response: Option<&Response>,
        error: Option<&Error>,
    ) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_ref();

        while let Some(open) = rest.find('{') {
            let (before, from_open) = rest.split_at(open);
            out.push_str(before);

            let placeholder = from_open
                .find('}')
                .map(|close| (from_open.get(1..close).unwrap_or_default(), close))
                .filter(|(name, _)| is_placeholder(name.trim()));
            match placeholder {
                Some((name, close)) => {
                    out.push_str(&render(name.trim(), request, response, error));
                    rest = from_open.get(close + 1..).unwrap_or_default();
                }
                None => {
                    out.push('{');
                    rest = from_open.get(1..).unwrap_or_default();
                }
            }
        }
        out.push_str(rest);
        out
    }
}

fn is_placeholder(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn render<'a>(
    name: &'a str,
    request: &'a Request,
    response: Option<&'a Response>,
    error: Option<&Error>,
) -> Cow<'a, str> {
    match name {
        "request" => request_message(request).into(),
        "response" => response.map_or(Cow::Borrowed(""), |r| response_message(r).into()),
        "req_headers" => request_head(request).into(),
        "res_headers" => response.map_or(NULL.into(), |r| response_head(r).into()),
        "req_body" => request
            .body()
            .as_bytes()
            .map_or(Cow::Borrowed(""), |bytes| String::from_utf8_lossy(bytes)),
        "res_body" => response.map_or(NULL.into(), |r| String::from_utf8_lossy(r.body())),
        "ts" | "date_iso_8601" => humantime::format_rfc3339_seconds(SystemTime::now())
            .to_string()
            .into(),
        "method" => request.method().to_string().into(),
        "uri" | "url" => request.url().as_str().into(),
        "target" => target(request).into(),
        "version" | "req_version" => version_number(request.version()).into(),
        "res_version" => response.map_or(NULL, |r| version_number(r.version())).into(),
        "host" => host(request).into(),
        "code" => response.map_or(NULL.into(), |r| r.status().to_string().into()),
        "phrase" => response.map_or(NULL, Response::reason).into(),
        "error" => error.map_or(NULL.into(), |err| err.to_string().into()),
        _ => {
            if let Some(header) = name.strip_prefix("req_header_") {
                request.headers().line(header).into()
            } else if let Some(header) = name.strip_prefix("res_header_") {
                response.map_or(NULL.into(), |r| r.headers().line(header).into())
            } else {
                Cow::Borrowed("")
            }
        }
    }
}

/// Protocol version without the `HTTP/` prefix.
pub(crate) fn version_number(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}

/// Path and query of the request URL.
fn target(request: &Request) -> String {
    let url = request.url();
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}

/// `Host` header, or the authority of the request URL.
fn host(request: &Request) -> String {
    if let Some(host) = request.header("Host") {
        return host.to_string();
    }
    let url = request.url();
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn header_lines(headers: &Headers) -> String {
    let mut names: Vec<&str> = Vec::new();
    for (name, _) in headers.iter() {
        if !names.iter().any(|seen| seen.eq_ignore_ascii_case(name)) {
            names.push(name);
        }
    }
    names
        .iter()
        .map(|name| format!("{name}: {}", headers.line(name)))
        .collect::<Vec<_>>()
        .join("\r\n")
}

fn request_head(request: &Request) -> String {
    let mut head = format!(
        "{} {} HTTP/{}",
        request.method(),
        target(request),
        version_number(request.version())
    );
    if !request.headers().contains("Host") {
        let _ = write!(head, "\r\nHost: {}", host(request));
    }
    let lines = header_lines(request.headers());
    if !lines.is_empty() {
        head.push_str("\r\n");
        head.push_str(&lines);
    }
    head
}

fn response_head(response: &Response) -> String {
    let mut head = format!(
        "HTTP/{} {} {}",
        version_number(response.version()),
        response.status(),
        response.reason()
    );
    let lines = header_lines(response.headers());
    if !lines.is_empty() {
        head.push_str("\r\n");
        head.push_str(&lines);
    }
    head
}

fn request_message(request: &Request) -> String {
    let body = request
        .body()
        .as_bytes()
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .unwrap_or_default();
    format!("{}\r\n\r\n{body}", request_head(request))
}

fn response_message(response: &Response) -> String {
    format!(
        "{}\r\n\r\n{}",
        response_head(response),
        String::from_utf8_lossy(response.body())
    )
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::*;
    use crate::Method;

    fn request() -> Request {
        Request::builder(
            Method::Put,
            url::Url::parse("http://example.com:8080/items?page=2").expect("valid URL"),
        )
        .header("User-Agent", "sheaf")
        .header("X-Tag", "a")
        .body("payload")
        .build()
        .with_added_header("x-tag", "b")
    }

    fn response() -> Response {
        Response::new(201, "created").with_header("Content-Length", "7")
    }

    #[test]
    fn renders_request_parts() {
        let formatter = MessageFormatter::new("{method} {uri} {target} {host} {version}");
        check!(
            formatter.format(&request(), None, None)
                == "PUT http://example.com:8080/items?page=2 /items?page=2 example.com:8080 1.1"
        );
    }

    #[test]
    fn renders_response_parts() {
        let formatter = MessageFormatter::new("{code} {phrase} {res_header_content-length} {res_version}");
        check!(formatter.format(&request(), Some(&response()), None) == "201 Created 7 1.1");
        check!(formatter.format(&request(), None, None) == "NULL NULL NULL NULL");
    }

    #[test]
    fn renders_headers_and_bodies() {
        let formatter = MessageFormatter::new("{req_header_x-tag}|{req_body}|{res_body}");
        check!(formatter.format(&request(), Some(&response()), None) == "a, b|payload|created");
    }

    #[test]
    fn renders_full_messages() {
        let formatter = MessageFormatter::new("{request}");
        check!(
            formatter.format(&request(), None, None)
                == "PUT /items?page=2 HTTP/1.1\r\nHost: example.com:8080\r\nUser-Agent: sheaf\r\nX-Tag: a, b\r\n\r\npayload"
        );

        let formatter = MessageFormatter::new("{response}");
        check!(
            formatter.format(&request(), Some(&response()), None)
                == "HTTP/1.1 201 Created\r\nContent-Length: 7\r\n\r\ncreated"
        );
    }

    #[test]
    fn renders_errors() {
        let formatter = MessageFormatter::new("{code} {error}");
        check!(formatter.format(&request(), None, Some(&Error::timeout())) == "NULL request timeout");
        check!(formatter.format(&request(), None, None) == "NULL NULL");
    }

    #[test]
    fn keeps_unknown_and_malformed_braces() {
        let formatter = MessageFormatter::new("{nope}|{ method }|{not valid}|{");
        check!(formatter.format(&request(), None, None) == "|PUT|{not valid}|{");
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let formatter = MessageFormatter::new("{ts}");
        let ts = formatter.format(&request(), None, None);
        check!(ts.ends_with('Z'));
        check!(ts.len() == "2024-01-01T00:00:00Z".len());
    }

    #[test]
    fn presets() {
        check!(MessageFormatter::default() == MessageFormatter::CLF);
        check!(MessageFormatter::new("") == MessageFormatter::CLF);

        let short = MessageFormatter::SHORT.format(&request(), Some(&response()), None);
        check!(short.ends_with("\"PUT /items?page=2 HTTP/1.1\" 201"));

        let debug = MessageFormatter::DEBUG.format(&request(), Some(&response()), None);
        check!(debug.starts_with(">>>>>>>>\nPUT /items?page=2 HTTP/1.1"));
        check!(debug.ends_with("--------\nNULL"));
    }
}
