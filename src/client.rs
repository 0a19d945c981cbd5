//! Resilient REST client.
//!
//! [`ApiClient`] wraps a [`Transport`] with precondition checks, JSON body
//! encoding, request validation hooks, linear-backoff retries and sanitized
//! per-attempt logging.
//!
//! Only network failures and 5xx responses are retried. The total number of
//! attempts is `max_retries + 1`, and the wait before retry `n` is
//! `n × backoff_unit`. When 5xx retries run out the last response is returned
//! as-is; call [`ApiResponse::error_for_status`] to turn it into a diagnosed
//! error.
//!
//! # Example
//!
//! ```ignore
//! use hemmer_provider_http::client::ApiClient;
//! use reqwest::Method;
//!
//! let client = ApiClient::builder()
//!     .with_base_url("https://api.example.com/v1")
//!     .with_token(token)
//!     .build();
//!
//! let service = client
//!     .request(Method::GET, "/projects/1/services/7", None)
//!     .await?
//!     .error_for_status("read service")?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::diagnose::{diagnose_with_docs, DiagnosedError, DEFAULT_DOCS_URL};
use crate::error::ProviderError;
use crate::logging::{mask_token, sanitize_url, HttpLogConfig};
use crate::transport::{
    HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError,
    DEFAULT_REQUEST_TIMEOUT,
};

/// Retries after the first attempt, unless configured otherwise.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Backoff before retry `n` is `n` times this unit.
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// A hook that inspects every outgoing request before the first attempt.
///
/// Returning `Err` aborts the request with [`ProviderError::InvalidRequest`].
pub trait RequestValidator: Send + Sync {
    /// Check a request. `path` is relative to the client's base URL.
    fn validate(&self, method: &Method, path: &str, body: Option<&Value>) -> Result<(), String>;
}

impl<F> RequestValidator for F
where
    F: Fn(&Method, &str, Option<&Value>) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, method: &Method, path: &str, body: Option<&Value>) -> Result<(), String> {
        self(method, path, body)
    }
}

/// A response returned by [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// Status code of the last attempt.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body, read once.
    pub body: Vec<u8>,
    /// Number of attempts it took.
    pub attempts: u32,
    docs_url: String,
}

impl ApiResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ProviderError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// The body as lossy UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Diagnose this response as an API error.
    pub fn diagnose(&self) -> DiagnosedError {
        diagnose_with_docs(self.status, &self.body, &self.docs_url)
    }

    /// Pass 2xx responses through; turn anything else into a diagnosed error
    /// wrapped with `operation`.
    pub fn error_for_status(self, operation: &str) -> Result<Self, ProviderError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(ProviderError::from(self.diagnose()).context(operation))
    }
}

/// The resilient API client. Immutable after construction; share it via `Arc`.
pub struct ApiClient {
    base_url: String,
    token: String,
    transport: Option<Arc<dyn Transport>>,
    log: HttpLogConfig,
    max_retries: u32,
    backoff_unit: Duration,
    docs_url: String,
    validators: Vec<Arc<dyn RequestValidator>>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("token", &mask_token(&self.token))
            .field("has_transport", &self.transport.is_some())
            .field("log", &self.log)
            .field("max_retries", &self.max_retries)
            .field("backoff_unit", &self.backoff_unit)
            .field("docs_url", &self.docs_url)
            .field("validators", &self.validators.len())
            .finish()
    }
}

impl ApiClient {
    /// Start building a client.
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The default retry count used by [`ApiClient::request`].
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// The HTTP logging configuration.
    pub fn log_config(&self) -> &HttpLogConfig {
        &self.log
    }

    /// Execute with the client's default retry count.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, ProviderError> {
        self.execute(method, path, body, self.max_retries).await
    }

    /// Execute a request, retrying network failures and 5xx responses up to
    /// `max_retries` times.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        max_retries: u32,
    ) -> Result<ApiResponse, ProviderError> {
        self.execute_with_cancel(method, path, body, max_retries, &CancellationToken::new())
            .await
    }

    /// Like [`ApiClient::execute`], but aborts the in-flight attempt or the
    /// pending backoff as soon as `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        max_retries: u32,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, ProviderError> {
        let transport = self.transport.as_ref().ok_or_else(|| {
            ProviderError::Configuration("HTTP transport is not initialized".to_string())
        })?;
        if self.base_url.trim().is_empty() {
            return Err(ProviderError::Configuration(
                "API endpoint is not configured".to_string(),
            ));
        }
        if self.token.trim().is_empty() {
            return Err(ProviderError::Configuration(
                "API token is not configured".to_string(),
            ));
        }

        let payload = body.map(serde_json::to_vec).transpose()?;

        for validator in &self.validators {
            validator
                .validate(&method, path, body)
                .map_err(ProviderError::InvalidRequest)?;
        }

        let mut request = HttpRequest::new(method, self.url_for(path))
            .with_header("Authorization", format!("Bearer {}", self.token))
            .with_header("Accept", "application/json");
        if let Some(payload) = payload {
            request = request
                .with_header("Content-Type", "application/json")
                .with_body(payload);
        }

        let total_attempts = max_retries.saturating_add(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(canceled(&request, attempt - 1));
            }

            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(canceled(&request, attempt)),
                outcome = transport.send(request.clone()) => outcome,
            };
            self.log_attempt(&request, &outcome, attempt, started.elapsed());

            match outcome {
                Ok(response) => {
                    if is_server_error(response.status) && attempt < total_attempts {
                        self.backoff(&request, attempt, cancel).await?;
                        continue;
                    }
                    return Ok(self.finish(response, attempt));
                },
                Err(source) => {
                    if attempt < total_attempts {
                        self.backoff(&request, attempt, cancel).await?;
                        continue;
                    }
                    return Err(ProviderError::Transport {
                        attempts: attempt,
                        source,
                    });
                },
            }
        }
    }

    fn url_for(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.is_empty() {
            base.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    fn finish(&self, response: HttpResponse, attempts: u32) -> ApiResponse {
        ApiResponse {
            status: response.status,
            headers: response.headers,
            body: response.body,
            attempts,
            docs_url: self.docs_url.clone(),
        }
    }

    async fn backoff(
        &self,
        request: &HttpRequest,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        let delay = self.backoff_unit.saturating_mul(attempt);
        debug!(
            method = %request.method,
            url = %sanitize_url(&request.url),
            attempt,
            delay_ms = delay.as_millis() as u64,
            "retrying after backoff"
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(canceled(request, attempt)),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn log_attempt(
        &self,
        request: &HttpRequest,
        outcome: &Result<HttpResponse, TransportError>,
        attempt: u32,
        elapsed: Duration,
    ) {
        if !self.log.enabled() {
            return;
        }
        let url = sanitize_url(&request.url);
        let elapsed_ms = elapsed.as_millis() as u64;
        match outcome {
            Ok(response) => info!(
                method = %request.method,
                url = %url,
                status = response.status,
                attempt,
                elapsed_ms,
                "HTTP request"
            ),
            Err(err) => info!(
                method = %request.method,
                url = %url,
                attempt,
                elapsed_ms,
                error = %err,
                "HTTP request failed"
            ),
        }

        if self.log.verbose_enabled() {
            let authorization = request
                .header("authorization")
                .map(mask_authorization)
                .unwrap_or_default();
            let request_body = self
                .log
                .sanitize_body(request.body.as_deref().unwrap_or_default());
            let response_body = match outcome {
                Ok(response) => self.log.sanitize_body(&response.body),
                Err(_) => String::new(),
            };
            info!(
                method = %request.method,
                url = %url,
                attempt,
                authorization = %authorization,
                request_body = %request_body,
                response_body = %response_body,
                "HTTP exchange"
            );
        }
    }
}

fn is_server_error(status: u16) -> bool {
    (500..=599).contains(&status)
}

fn canceled(request: &HttpRequest, attempts: u32) -> ProviderError {
    ProviderError::Canceled(format!(
        "{} {} canceled after {} attempt(s)",
        request.method,
        sanitize_url(&request.url),
        attempts
    ))
}

fn mask_authorization(value: &str) -> String {
    match value.split_once(' ') {
        Some((scheme, credential)) => format!("{} {}", scheme, mask_token(credential)),
        None => mask_token(value),
    }
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    base_url: String,
    token: String,
    transport: Option<Arc<dyn Transport>>,
    timeout: Duration,
    log: HttpLogConfig,
    max_retries: u32,
    backoff_unit: Duration,
    docs_url: String,
    validators: Vec<Arc<dyn RequestValidator>>,
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            transport: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            log: HttpLogConfig::off(),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
            docs_url: DEFAULT_DOCS_URL.to_string(),
            validators: Vec::new(),
        }
    }
}

impl ApiClientBuilder {
    /// Set the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Use a custom transport instead of the default `reqwest` one.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Request timeout for the default transport.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the HTTP logging configuration.
    pub fn with_log_config(mut self, log: HttpLogConfig) -> Self {
        self.log = log;
        self
    }

    /// Set the default retry count.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the linear backoff unit.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Set the base URL used for documentation pointers in diagnostics.
    pub fn with_docs_url(mut self, docs_url: impl Into<String>) -> Self {
        self.docs_url = docs_url.into();
        self
    }

    /// Register a request validation hook.
    pub fn with_validator(mut self, validator: impl RequestValidator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Build the client.
    ///
    /// Missing endpoint or token is not an error here; it is reported as a
    /// configuration error on the first request.
    pub fn build(self) -> ApiClient {
        let transport = match self.transport {
            Some(transport) => Some(transport),
            None => match ReqwestTransport::with_timeout(self.timeout) {
                Ok(transport) => Some(Arc::new(transport) as Arc<dyn Transport>),
                Err(err) => {
                    warn!(error = %err, "failed to initialize HTTP transport");
                    None
                },
            },
        };

        ApiClient {
            base_url: self.base_url,
            token: self.token,
            transport,
            log: self.log,
            max_retries: self.max_retries,
            backoff_unit: self.backoff_unit,
            docs_url: self.docs_url,
            validators: self.validators,
        }
    }
}
