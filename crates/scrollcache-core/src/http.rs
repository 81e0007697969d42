//! Request and response types exchanged between the page, the interceptor
//! and the network.

use bytes::Bytes;
use url::Url;

use crate::error::NetworkError;

/// Header marking a response the worker made up instead of fetching.
pub const FALLBACK_HEADER: &str = "x-scrollcache-fallback";

const OFFLINE_TEXT: &str = "(Offline: this chapter is not available right now.)";

const PLACEHOLDER_SVG: &str = concat!(
    r##"<svg xmlns="http://www.w3.org/2000/svg" width="64" height="64" viewBox="0 0 64 64">"##,
    r##"<rect width="64" height="64" fill="#e0e0e0"/>"##,
    r##"<text x="32" y="38" font-size="10" text-anchor="middle" fill="#757575">offline</text>"##,
    r##"</svg>"##,
);

/// Served for any navigation that neither the network nor the cache can satisfy.
pub const OFFLINE_PAGE_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Offline</title>
<style>body{font-family:sans-serif;text-align:center;padding:3em 1em;color:#444}</style>
</head>
<body>
<h1>You are offline</h1>
<p>This page has not been saved for offline reading yet. Chapters you have opened before are still available.</p>
</body>
</html>
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Top-level document navigation
    Navigate,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    url: Url,
    method: String,
    destination: String,
    mode: RequestMode,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Request {
    pub fn new(url: Url) -> Self {
        let mut url = url;
        url.set_fragment(None);
        Self {
            url,
            method: "GET".to_string(),
            destination: String::new(),
            mode: RequestMode::Other,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// GET request for `path` resolved against `scope`.
    pub fn get(scope: &Url, path: &str) -> Result<Self, NetworkError> {
        let url = scope
            .join(path)
            .map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", path, e)))?;
        Ok(Self::new(url))
    }

    pub fn navigate(scope: &Url, path: &str) -> Result<Self, NetworkError> {
        Ok(Self::get(scope, path)?
            .with_mode(RequestMode::Navigate)
            .with_destination("document"))
    }

    pub fn image(scope: &Url, path: &str) -> Result<Self, NetworkError> {
        Ok(Self::get(scope, path)?.with_destination("image"))
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_ascii_uppercase();
        self
    }

    pub fn with_destination(mut self, destination: &str) -> Self {
        self.destination = destination.to_string();
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Normalized cache key: the absolute URL without its fragment.
    pub fn key(&self) -> &str {
        self.url.as_str()
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn mode(&self) -> RequestMode {
        self.mode
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate || self.destination == "document"
    }

    /// Path relative to the scope directory, always starting with `/`.
    /// `None` for other origins and for paths outside the scope directory.
    pub fn scope_path(&self, scope: &Url) -> Option<String> {
        if self.url.origin() != scope.origin() {
            return None;
        }
        self.url
            .path()
            .strip_prefix(scope.path())
            .map(|rest| format!("/{}", rest))
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// Made up by the worker as a fallback
    Synthesized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            source: ResponseSource::Network,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn with_source(mut self, source: ResponseSource) -> Self {
        self.source = source;
        self
    }

    pub fn is_ok(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_fallback(&self) -> bool {
        self.header(FALLBACK_HEADER).is_some()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Plain text stand-in for a chapter that cannot be loaded. Carries an
    /// ok status so the page renders it like any other chapter.
    pub fn offline_text() -> Self {
        Self::synthesized(200, "text/plain; charset=utf-8", OFFLINE_TEXT, "offline-text")
    }

    pub fn placeholder_image() -> Self {
        Self::synthesized(200, "image/svg+xml", PLACEHOLDER_SVG, "placeholder-image")
    }

    pub fn offline_page(html: impl Into<Bytes>) -> Self {
        Self::synthesized(200, "text/html; charset=utf-8", html, "offline-page")
    }

    pub fn service_unavailable() -> Self {
        Self::synthesized(503, "text/plain; charset=utf-8", "Service Unavailable", "unavailable")
    }

    fn synthesized(status: u16, content_type: &str, body: impl Into<Bytes>, kind: &str) -> Self {
        Self::new(status, body)
            .with_header("content-type", content_type)
            .with_header(FALLBACK_HEADER, kind)
            .with_source(ResponseSource::Synthesized)
    }
}
