//! Configuration for talking to a GeoConverter server.
//!
//! All client behaviour is controlled through [`ClientConfig`], built via its
//! [`ClientConfigBuilder`]. One struct holds every knob so a config can be
//! cloned into background tasks, logged, and compared between runs.

use crate::error::GeoConvertError;
use crate::i18n::Locale;
use serde::{Deserialize, Serialize};

/// Default server address, matching the development setup of the service.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Configuration for a conversion client.
///
/// Built via [`ClientConfig::builder()`] or using [`ClientConfig::default()`].
///
/// # Example
/// ```rust
/// use geoconvert_client::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .base_url("https://convert.example.org")
///     .locale("fr")
///     .request_timeout_secs(300)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Root URL of the service; `/api/...` paths are appended to it.
    pub base_url: String,

    /// Locale tag sent with detection and conversion requests so the server
    /// can localize its error messages. Default: `en`.
    pub locale: Locale,

    /// Whole-request timeout in seconds. `None` leaves the transport default
    /// in place (reqwest: no timeout). Default: None.
    ///
    /// Conversions of large rasters can take minutes on the server, so a
    /// tight value here turns slow successes into failures.
    pub request_timeout_secs: Option<u64>,

    /// TCP connect timeout in seconds. Default: None.
    pub connect_timeout_secs: Option<u64>,

    /// Issue a best-effort cleanup for a converted artifact that was never
    /// downloaded when the workflow is reset. Default: true.
    pub cleanup_on_reset: bool,

    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            locale: Locale::default(),
            request_timeout_secs: None,
            connect_timeout_secs: None,
            cleanup_on_reset: true,
            user_agent: concat!("geoconvert-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// Join an absolute API path (`/api/...`) onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn locale(mut self, tag: impl Into<String>) -> Self {
        self.config.locale = Locale::new(tag);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs.max(1));
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = Some(secs.max(1));
        self
    }

    pub fn cleanup_on_reset(mut self, v: bool) -> Self {
        self.config.cleanup_on_reset = v;
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, GeoConvertError> {
        let c = &self.config;
        if !is_url(&c.base_url) {
            return Err(GeoConvertError::InvalidConfig(format!(
                "base URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        if c.locale.as_str().is_empty() {
            return Err(GeoConvertError::InvalidConfig(
                "locale tag must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Check if the input string looks like an absolute HTTP(S) URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/api"));
        assert!(is_url("http://localhost:8000"));
        assert!(!is_url("/api/download/x.geojson"));
        assert!(!is_url("localhost:8000"));
        assert!(!is_url(""));
    }

    #[test]
    fn defaults() {
        let c = ClientConfig::default();
        assert_eq!(c.base_url, DEFAULT_BASE_URL);
        assert_eq!(c.locale.as_str(), "en");
        assert!(c.request_timeout_secs.is_none());
        assert!(c.cleanup_on_reset);
    }

    #[test]
    fn builder_rejects_non_http_base() {
        let err = ClientConfig::builder()
            .base_url("ftp://example.com")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("http://"), "got: {err}");
    }

    #[test]
    fn builder_rejects_empty_locale() {
        assert!(ClientConfig::builder().locale("  ").build().is_err());
    }

    #[test]
    fn timeouts_clamp_to_one_second() {
        let c = ClientConfig::builder()
            .request_timeout_secs(0)
            .connect_timeout_secs(0)
            .build()
            .unwrap();
        assert_eq!(c.request_timeout_secs, Some(1));
        assert_eq!(c.connect_timeout_secs, Some(1));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let c = ClientConfig::builder()
            .base_url("http://host:8000/")
            .build()
            .unwrap();
        assert_eq!(c.endpoint("/api/formats"), "http://host:8000/api/formats");
        assert_eq!(c.endpoint("api/health"), "http://host:8000/api/health");
    }
}
