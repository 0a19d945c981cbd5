//! Provider configuration.
//!
//! The host passes the provider block as JSON. `endpoint` and `api_token` fall
//! back to `HEMMER_API_ENDPOINT` and `HEMMER_API_TOKEN`, and the HTTP logging
//! switches fall back to `HEMMER_HTTP_LOG` and `HEMMER_HTTP_LOG_BODIES`.
//!
//! ```json
//! {
//!   "endpoint": "https://api.hemmer.io/v1",
//!   "api_token": "...",
//!   "max_retries": 3,
//!   "request_timeout_secs": 30,
//!   "log_http": true
//! }
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{ApiClient, ApiClientBuilder, DEFAULT_MAX_RETRIES};
use crate::error::ProviderError;
use crate::logging::{mask_token, HttpLogConfig, HTTP_LOG_BODIES_ENV, HTTP_LOG_ENV};
use crate::schema::Diagnostic;
use crate::transport::DEFAULT_REQUEST_TIMEOUT;

/// Environment fallback for `endpoint`.
pub const ENDPOINT_ENV: &str = "HEMMER_API_ENDPOINT";

/// Environment fallback for `api_token`.
pub const TOKEN_ENV: &str = "HEMMER_API_TOKEN";

/// Decoded provider configuration.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API base URL.
    pub endpoint: Option<String>,
    /// Bearer token.
    pub api_token: Option<String>,
    /// Retries after the first attempt.
    pub max_retries: Option<u32>,
    /// Per-request timeout.
    pub request_timeout_secs: Option<u64>,
    /// Compact HTTP logging.
    pub log_http: Option<bool>,
    /// Verbose HTTP logging, including sanitized bodies.
    pub log_http_bodies: Option<bool>,
    /// Base URL for documentation pointers in error diagnostics.
    pub docs_url: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("endpoint", &self.endpoint)
            .field("api_token", &self.api_token.as_deref().map(mask_token))
            .field("max_retries", &self.max_retries)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("log_http", &self.log_http)
            .field("log_http_bodies", &self.log_http_bodies)
            .field("docs_url", &self.docs_url)
            .finish()
    }
}

impl ProviderConfig {
    /// Decode the host's configuration object. `null` yields the defaults.
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
            .map_err(|err| ProviderError::Configuration(format!("invalid provider configuration: {}", err)))
    }

    /// Fill unset values from an arbitrary variable lookup.
    pub fn with_fallbacks(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
        if !present(&self.endpoint) {
            self.endpoint = lookup(ENDPOINT_ENV).filter(|v| !v.trim().is_empty());
        }
        if !present(&self.api_token) {
            self.api_token = lookup(TOKEN_ENV).filter(|v| !v.trim().is_empty());
        }
        if self.log_http.is_none() && self.log_http_bodies.is_none() {
            let from_env = HttpLogConfig::from_lookup(|name| {
                if name == HTTP_LOG_ENV || name == HTTP_LOG_BODIES_ENV {
                    lookup(name)
                } else {
                    None
                }
            });
            self.log_http = Some(from_env.enabled());
            self.log_http_bodies = Some(from_env.verbose_enabled());
        }
        self
    }

    /// Check the configuration.
    ///
    /// A missing endpoint or token is only a warning: the client reports it as
    /// a configuration error on first use.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        match self.endpoint.as_deref().map(str::trim) {
            None | Some("") => diagnostics.push(
                Diagnostic::warning("No API endpoint configured")
                    .with_detail(format!("Set 'endpoint' or {}", ENDPOINT_ENV))
                    .with_attribute("endpoint"),
            ),
            Some(endpoint) if !is_http_url(endpoint) => diagnostics.push(
                Diagnostic::error("Invalid API endpoint")
                    .with_detail(format!(
                        "Expected an http:// or https:// URL, got \"{}\"",
                        endpoint
                    ))
                    .with_attribute("endpoint"),
            ),
            Some(_) => {},
        }

        if self.api_token.as_deref().map_or(true, |t| t.trim().is_empty()) {
            diagnostics.push(
                Diagnostic::warning("No API token configured")
                    .with_detail(format!("Set 'api_token' or {}", TOKEN_ENV))
                    .with_attribute("api_token"),
            );
        }

        if self.request_timeout_secs == Some(0) {
            diagnostics.push(
                Diagnostic::error("Invalid request timeout")
                    .with_detail("request_timeout_secs must be greater than zero")
                    .with_attribute("request_timeout_secs"),
            );
        }

        diagnostics
    }

    /// The HTTP logging configuration selected by the switches.
    pub fn http_log_config(&self) -> HttpLogConfig {
        if self.log_http_bodies.unwrap_or(false) {
            HttpLogConfig::verbose()
        } else if self.log_http.unwrap_or(false) {
            HttpLogConfig::compact()
        } else {
            HttpLogConfig::off()
        }
    }

    /// Request timeout.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    /// A client builder carrying this configuration.
    pub fn client_builder(&self) -> ApiClientBuilder {
        let mut builder = ApiClient::builder()
            .with_base_url(self.endpoint.clone().unwrap_or_default())
            .with_token(self.api_token.clone().unwrap_or_default())
            .with_max_retries(self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES))
            .with_timeout(self.request_timeout())
            .with_log_config(self.http_log_config());
        if let Some(docs_url) = &self.docs_url {
            builder = builder.with_docs_url(docs_url.clone());
        }
        builder
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("https://") || value.starts_with("http://")
}
