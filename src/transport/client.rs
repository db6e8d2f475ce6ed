//! `reqwest`-backed HTTP client.
//!
//! One [`HttpClient`] is built from a [`ClientConfig`] and reused for every
//! session and request, so connections and cookies are pooled.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::cookie::Jar;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, HeaderMap, HeaderName, HeaderValue, PRAGMA,
};
use reqwest::{Client, Proxy};
use tracing::{debug, instrument, warn};

use super::response::HttpResponse;
use super::{Transport, TransportResponse};
use crate::config::{CachePolicy, ClientConfig};
use crate::download::constants::DEFAULT_ACCEPT_LANGUAGE;
use crate::download::{DownloadError, OutgoingRequest, RequestOptions};
use crate::download::request::parse_url;
use crate::user_agent;

/// HTTP client shared by download sessions and plain requests.
///
/// # Example
///
/// ```no_run
/// use resumable_core::{ClientConfig, HttpClient, RequestOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::from_config(&ClientConfig::default())?;
/// let response = client
///     .request("https://example.com/api/status", &RequestOptions::default())
///     .await?;
/// println!("{}", response.status);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    cookies: Option<Arc<Jar>>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("client", &self.client)
            .field("cookies", &self.cookies.is_some())
            .finish()
    }
}

impl Default for HttpClient {
    /// Builds a client from [`ClientConfig::default`].
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static default
    /// configuration. This should never happen in practice.
    #[allow(clippy::expect_used)]
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
            .expect("failed to build HTTP client with static configuration")
    }
}

impl HttpClient {
    /// Builds a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidHeader`] for a default header that cannot
    /// be encoded, and [`DownloadError::Client`] when the proxy URL is rejected
    /// or the TLS backend fails to initialize.
    #[instrument(level = "debug", skip(config))]
    pub fn from_config(config: &ClientConfig) -> Result<Self, DownloadError> {
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(user_agent::default_user_agent);

        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .gzip(config.decompress)
            .deflate(config.decompress)
            .user_agent(user_agent)
            .default_headers(default_headers(config)?)
            .danger_accept_invalid_certs(config.accept_invalid_certs);

        if let Some(secs) = config.read_timeout_secs {
            builder = builder.read_timeout(Duration::from_secs(secs));
        }
        if let Some(proxy) = &config.proxy {
            let proxy = Proxy::all(proxy).map_err(|source| DownloadError::Client { source })?;
            builder = builder.proxy(proxy);
        }

        let cookies = config.cookies.then(|| Arc::new(Jar::default()));
        if let Some(jar) = &cookies {
            builder = builder.cookie_provider(Arc::clone(jar));
        }

        let client = builder
            .build()
            .map_err(|source| DownloadError::Client { source })?;
        debug!(cookies = cookies.is_some(), "HTTP client ready");
        Ok(Self { client, cookies })
    }

    /// Stores a host-only cookie for `domain`, sent with later requests to it.
    ///
    /// Returns `false` when the client was built with cookies disabled.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] when `domain` is not a valid host.
    pub fn add_cookie(&self, name: &str, value: &str, domain: &str) -> Result<bool, DownloadError> {
        let Some(jar) = &self.cookies else {
            warn!(name, domain, "cookies are disabled; cookie dropped");
            return Ok(false);
        };
        let origin = format!("http://{domain}/");
        let url = reqwest::Url::parse(&origin)
            .ok()
            .filter(|url| url.host_str().is_some())
            .ok_or_else(|| DownloadError::invalid_url(origin))?;
        jar.add_cookie_str(&format!("{name}={value}; Path=/"), &url);
        Ok(true)
    }

    /// Sends a request and buffers the whole response body.
    ///
    /// The body is typed by `Content-Type`: textual types become
    /// [`ResponseBody::Text`](super::ResponseBody::Text), anything else
    /// [`ResponseBody::Bytes`](super::ResponseBody::Bytes).
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] for a malformed URL, a transport
    /// error if the exchange fails, or [`DownloadError::HttpStatus`] for a
    /// non-success status.
    #[instrument(skip(self, options), fields(method = %options.method))]
    pub async fn request(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<HttpResponse, DownloadError> {
        let outgoing = OutgoingRequest::new(&parse_url(url)?, options);
        let response = self.execute(outgoing).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status_with_reason(
                url,
                status.as_u16(),
                status.canonical_reason().map(str::to_string),
            ));
        }

        let headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_send_error(url, e))?;
        debug!(status = status.as_u16(), bytes = bytes.len(), "response received");
        Ok(HttpResponse::from_parts(status, headers, bytes))
    }

    async fn execute(&self, request: OutgoingRequest) -> Result<reqwest::Response, DownloadError> {
        let url = request.url.to_string();
        let mut headers = HeaderMap::with_capacity(request.headers.len());
        for (name, value) in &request.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| DownloadError::invalid_header(name.clone()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| DownloadError::invalid_header(name.clone()))?;
            headers.append(header_name, header_value);
        }

        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        builder.send().await.map_err(|e| map_send_error(&url, e))
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, request: OutgoingRequest) -> Result<TransportResponse, DownloadError> {
        let response = self.execute(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map_err(io::Error::other);
        Ok(TransportResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}

fn map_send_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}

fn default_headers(config: &ClientConfig) -> Result<HeaderMap, DownloadError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE),
    );
    if config.cache == CachePolicy::Bypass {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    }
    for (name, value) in &config.default_headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| DownloadError::invalid_header(name.clone()))?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| DownloadError::invalid_header(name.clone()))?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_headers_include_cache_bypass() {
        let headers = default_headers(&ClientConfig::default()).unwrap();
        assert_eq!(headers.get(ACCEPT).unwrap(), "*/*");
        assert_eq!(headers.get(CACHE_CONTROL).unwrap(), "no-cache");
        assert_eq!(headers.get(PRAGMA).unwrap(), "no-cache");
    }

    #[test]
    fn test_default_headers_cache_default_sends_no_directives() {
        let config = ClientConfig {
            cache: CachePolicy::Default,
            ..ClientConfig::default()
        };
        let headers = default_headers(&config).unwrap();
        assert!(headers.get(CACHE_CONTROL).is_none());
        assert!(headers.get(PRAGMA).is_none());
    }

    #[test]
    fn test_configured_header_overrides_builtin() {
        let mut config = ClientConfig::default();
        config
            .default_headers
            .insert("Accept".to_string(), "application/json".to_string());
        let headers = default_headers(&config).unwrap();
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
    }

    #[test]
    fn test_invalid_configured_header_rejected() {
        let mut config = ClientConfig::default();
        config
            .default_headers
            .insert("bad header".to_string(), "x".to_string());
        let err = HttpClient::from_config(&config).unwrap_err();
        assert!(matches!(err, DownloadError::InvalidHeader { .. }));
    }

    #[test]
    fn test_add_cookie_without_jar_returns_false() {
        let config = ClientConfig {
            cookies: false,
            ..ClientConfig::default()
        };
        let client = HttpClient::from_config(&config).unwrap();
        assert!(!client.add_cookie("session", "abc", "example.com").unwrap());
    }

    #[test]
    fn test_request_invalid_url() {
        let client = HttpClient::default();
        let result =
            tokio_test::block_on(client.request("not-a-valid-url", &RequestOptions::default()));
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }

    #[test]
    fn test_add_cookie_rejects_bad_domain() {
        let client = HttpClient::from_config(&ClientConfig::default()).unwrap();
        assert!(client.add_cookie("a", "b", "example.com").unwrap());
        assert!(client.add_cookie("a", "b", "bad domain/").is_err());
    }
}
