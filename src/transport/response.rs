//! Buffered responses with a typed body.

use std::path::PathBuf;

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap};

/// Body of a completed response, typed by content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Textual content (text/*, JSON, XML, JavaScript, form data) decoded as UTF-8.
    Text(String),
    /// Anything else, or text that was not valid UTF-8.
    Bytes(Bytes),
    /// The body was written to this file.
    File(PathBuf),
}

impl ResponseBody {
    /// Picks `Text` or `Bytes` from the `Content-Type` value.
    #[must_use]
    pub fn from_content(content_type: Option<&str>, bytes: Bytes) -> Self {
        if content_type.is_some_and(is_textual) {
            match String::from_utf8(bytes.to_vec()) {
                Ok(text) => Self::Text(text),
                Err(_) => Self::Bytes(bytes),
            }
        } else {
            Self::Bytes(bytes)
        }
    }

    /// Returns the text body, if this is one.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// A completed request with its body read.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Typed body.
    pub body: ResponseBody,
}

impl HttpResponse {
    /// Builds a response, typing `bytes` from its `Content-Type` header.
    #[must_use]
    pub fn from_parts(status: StatusCode, headers: HeaderMap, bytes: Bytes) -> Self {
        let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        let body = ResponseBody::from_content(content_type, bytes);
        Self {
            status,
            headers,
            body,
        }
    }

    /// Returns the first value of `name`, if it is valid text.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Headers as name/value pairs, repeated headers joined with `", "`.
    #[must_use]
    pub fn flat_headers(&self) -> Vec<(String, String)> {
        flatten_headers(&self.headers)
    }
}

/// Collapses a header map into one entry per name, in first-seen order.
#[must_use]
pub fn flatten_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .keys()
        .map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect::<Vec<_>>()
                .join(", ");
            (name.as_str().to_string(), joined)
        })
        .collect()
}

fn is_textual(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    mime.starts_with("text/")
        || mime.ends_with("+json")
        || mime.ends_with("+xml")
        || matches!(
            mime.as_str(),
            "application/json"
                | "application/xml"
                | "application/javascript"
                | "application/x-www-form-urlencoded"
        )
}
