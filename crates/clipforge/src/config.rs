use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use url::Url;

use crate::error::ClientError;

pub const DEFAULT_USER_AGENT: &str = concat!("clipforge/", env!("CARGO_PKG_VERSION"));

/// Default backend address when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// Options for talking to the generation backend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend origin (and optional path prefix) prepended to every API path
    /// and to server-relative media references.
    pub base_url: Url,

    /// Overall timeout for a single request. Zero disables it.
    pub timeout: Duration,

    /// Connection timeout (time to establish the initial connection)
    pub connect_timeout: Duration,

    /// User agent string
    pub user_agent: String,

    /// Extra headers sent with every request
    pub headers: HeaderMap,

    /// Period between status queries while a job is being watched
    pub poll_interval: Duration,

    /// Upper bound for fetching a thumbnail manifest
    pub manifest_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            // The constant is a valid absolute URL.
            base_url: Url::parse(DEFAULT_BASE_URL).unwrap(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: ClientConfig::get_default_headers(),
            poll_interval: Duration::from_millis(1500),
            manifest_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Config pointing at `base_url`, everything else default.
    pub fn with_base_url(base_url: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|e| ClientError::invalid_url(base_url, e.to_string()))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::configuration(format!(
                "base URL must be http or https, got `{}`",
                base_url.scheme()
            )));
        }
        Ok(Self {
            base_url,
            ..Self::default()
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add or replace a header sent with every request.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, ClientError> {
        let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ClientError::configuration(format!("invalid header name `{name}`: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ClientError::configuration(format!("invalid header value: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        headers
    }

    /// Build the HTTP client these options describe.
    pub fn build_client(&self) -> Result<reqwest::Client, ClientError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .default_headers(self.headers.clone())
            .connect_timeout(self.connect_timeout);
        if !self.timeout.is_zero() {
            builder = builder.timeout(self.timeout);
        }
        builder.build().map_err(ClientError::from)
    }

    /// Absolute URL for an API path such as `/api/status/abc`.
    pub fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.prefixed(path)
    }

    /// Resolve a media reference returned by the backend.
    ///
    /// `http(s)` URLs are kept as-is; anything else is treated as relative to
    /// the backend origin, including its path prefix.
    pub fn resolve_url(&self, raw: &str) -> Result<Url, ClientError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ClientError::invalid_url(raw, "empty reference"));
        }
        let lower = raw.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Url::parse(raw).map_err(|e| ClientError::invalid_url(raw, e.to_string()));
        }
        self.prefixed(raw)
    }

    fn prefixed(&self, path: &str) -> Result<Url, ClientError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let joined = if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        };
        Url::parse(&joined).map_err(|e| ClientError::invalid_url(joined.clone(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(1500));
        assert_eq!(config.base_url.as_str(), "http://localhost:5000/");
    }

    #[test]
    fn relative_references_get_the_backend_prefix() {
        let config = ClientConfig::with_base_url("https://api.example.com/v1/").unwrap();
        assert_eq!(
            config.resolve_url("/hls/abc/index.m3u8").unwrap().as_str(),
            "https://api.example.com/v1/hls/abc/index.m3u8"
        );
        assert_eq!(
            config.resolve_url("videos/abc.mp4").unwrap().as_str(),
            "https://api.example.com/v1/videos/abc.mp4"
        );
        assert_eq!(
            config.endpoint("/api/status/abc").unwrap().as_str(),
            "https://api.example.com/v1/api/status/abc"
        );
    }

    #[test]
    fn absolute_references_are_kept() {
        let config = ClientConfig::default();
        assert_eq!(
            config.resolve_url("HTTPS://cdn.example.com/a.mp4").unwrap().as_str(),
            "https://cdn.example.com/a.mp4"
        );
        assert!(config.resolve_url("  ").is_err());
    }

    #[test]
    fn rejects_bad_base_urls() {
        assert!(matches!(
            ClientConfig::with_base_url("not a url"),
            Err(ClientError::InvalidUrl { .. })
        ));
        assert!(matches!(
            ClientConfig::with_base_url("ftp://example.com"),
            Err(ClientError::Configuration { .. })
        ));
    }

    #[test]
    fn header_overrides() {
        let config = ClientConfig::default()
            .with_header("x-api-key", "secret")
            .unwrap();
        assert_eq!(config.headers.get("x-api-key").unwrap(), "secret");
        assert!(ClientConfig::default().with_header("bad header", "x").is_err());
    }
}
