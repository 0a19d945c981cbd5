//! Logging and tracing utilities for providers.
//!
//! Process-wide logging is set up through the `tracing` ecosystem. All logs are
//! written to **stderr** so stdout stays free for the host protocol.
//!
//! Per-request HTTP logging is configured separately through [`HttpLogConfig`],
//! which is passed to [`crate::client::ApiClient`] at construction. Everything
//! that reaches the log goes through the sanitizers in this module: query
//! strings are replaced, bearer tokens are masked and secret-looking JSON keys
//! are redacted.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls log levels (e.g., `info`, `hemmer_provider_http=debug`)
//! - `HEMMER_HTTP_LOG`: Log every request/response cycle in compact form
//! - `HEMMER_HTTP_LOG_BODIES`: Also log sanitized request and response bodies
//!
//! The two `HEMMER_*` switches are only read by [`HttpLogConfig::from_env`].
//!
//! # Examples
//!
//! ```bash
//! # Compact request logs
//! HEMMER_HTTP_LOG=1 RUST_LOG=info ./my-provider
//!
//! # Full request/response logs
//! HEMMER_HTTP_LOG_BODIES=1 RUST_LOG=debug ./my-provider
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment switch for compact HTTP logging.
pub const HTTP_LOG_ENV: &str = "HEMMER_HTTP_LOG";

/// Environment switch for verbose HTTP logging.
pub const HTTP_LOG_BODIES_ENV: &str = "HEMMER_HTTP_LOG_BODIES";

/// Replacement for a URL's query string.
pub const SANITIZED_PARAMS: &str = "[params sanitized]";

/// Replacement for redacted JSON values.
pub const REDACTED: &str = "[redacted]";

/// Default cap on logged body size.
pub const DEFAULT_MAX_BODY_BYTES: usize = 4096;

const SENSITIVE_KEY_PARTS: &[&str] = &[
    "token",
    "password",
    "secret",
    "api_key",
    "apikey",
    "authorization",
    "credential",
    "private_key",
];

fn default_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}

/// Initialize the default logging subscriber.
///
/// This sets up a `tracing` subscriber that:
/// - Writes to **stderr**
/// - Respects the `RUST_LOG` environment variable for filtering
/// - Defaults to `info` level if `RUST_LOG` is not set
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Initialize logging with a custom default level.
///
/// Like [`init_logging`], but `default_level` is used when `RUST_LOG` is not set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    tracing_subscriber::registry()
        .with(default_filter(default_level))
        .with(stderr_layer())
        .init();
}

/// Try to initialize logging, returning false if already initialized.
///
/// Useful in tests, where several cases may race to install a subscriber.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(default_filter("info"))
        .with(stderr_layer())
        .try_init()
        .is_ok()
}

/// How much of each HTTP exchange is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HttpLogLevel {
    /// No per-request logging.
    #[default]
    Off,
    /// Method, sanitized URL, status and duration.
    Compact,
    /// Compact plus masked credentials and sanitized bodies.
    Verbose,
}

/// Explicit per-client HTTP logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpLogConfig {
    /// Verbosity.
    pub level: HttpLogLevel,
    /// Additional JSON keys whose values are redacted in logged bodies.
    #[serde(default)]
    pub redact_keys: Vec<String>,
    /// Logged bodies are truncated to this many bytes.
    pub max_body_bytes: usize,
}

impl Default for HttpLogConfig {
    fn default() -> Self {
        Self {
            level: HttpLogLevel::Off,
            redact_keys: Vec::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl HttpLogConfig {
    /// Logging disabled.
    pub fn off() -> Self {
        Self::default()
    }

    /// Compact logging.
    pub fn compact() -> Self {
        Self {
            level: HttpLogLevel::Compact,
            ..Self::default()
        }
    }

    /// Verbose logging.
    pub fn verbose() -> Self {
        Self {
            level: HttpLogLevel::Verbose,
            ..Self::default()
        }
    }

    /// Read the `HEMMER_HTTP_LOG*` switches from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = |name: &str| lookup(name).map(|v| is_truthy(&v)).unwrap_or(false);
        if enabled(HTTP_LOG_BODIES_ENV) {
            Self::verbose()
        } else if enabled(HTTP_LOG_ENV) {
            Self::compact()
        } else {
            Self::off()
        }
    }

    /// Add keys to redact in logged bodies.
    pub fn with_redact_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.redact_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Whether any per-request logging happens.
    pub fn enabled(&self) -> bool {
        self.level > HttpLogLevel::Off
    }

    /// Whether bodies and headers are logged.
    pub fn verbose_enabled(&self) -> bool {
        self.level >= HttpLogLevel::Verbose
    }

    /// Sanitize a body for this configuration.
    pub fn sanitize_body(&self, body: &[u8]) -> String {
        sanitize_body(body, &self.redact_keys, self.max_body_bytes)
    }
}

fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "off" | "no"
    )
}

/// Replace a URL's query string with [`SANITIZED_PARAMS`].
pub fn sanitize_url(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{}?{}", base, SANITIZED_PARAMS),
        None => url.to_string(),
    }
}

/// Mask a credential, keeping a 4-character prefix and suffix.
///
/// Credentials shorter than 12 characters are fully masked.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() < 12 {
        return "***".to_string();
    }
    let prefix: String = chars[..4].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("{}***{}", prefix, suffix)
}

/// Render a body for logging: secret-looking JSON values are redacted and
/// the result is truncated to `max_bytes`.
pub fn sanitize_body(body: &[u8], extra_keys: &[String], max_bytes: usize) -> String {
    if body.is_empty() {
        return String::new();
    }
    let rendered = match serde_json::from_slice::<Value>(body) {
        Ok(mut value) => {
            redact_value(&mut value, extra_keys);
            value.to_string()
        },
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    };
    truncate(rendered, max_bytes)
}

fn redact_value(value: &mut Value, extra_keys: &[String]) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if is_sensitive_key(key, extra_keys) {
                    *child = Value::String(REDACTED.to_string());
                } else {
                    redact_value(child, extra_keys);
                }
            }
        },
        Value::Array(items) => {
            for item in items {
                redact_value(item, extra_keys);
            }
        },
        _ => {},
    }
}

fn is_sensitive_key(key: &str, extra_keys: &[String]) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_KEY_PARTS.iter().any(|part| lower.contains(part))
        || extra_keys.iter().any(|extra| extra.eq_ignore_ascii_case(key))
}

fn truncate(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str("...(truncated)");
    text
}

#[cfg(test)]
mod tests {
    // The global subscriber can only be set once per process, so init_logging
    // itself is not exercised here.

    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(EnvFilter::try_new("hemmer_provider_http=debug").is_ok());
        assert!(EnvFilter::try_new("warn,hemmer_provider_http=debug").is_ok());
    }

    #[test]
    fn test_sanitize_url() {
        assert_eq!(
            sanitize_url("https://host/path?token=abc"),
            "https://host/path?[params sanitized]"
        );
        assert_eq!(sanitize_url("https://host/path"), "https://host/path");
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("abcd1234efgh5678"), "abcd***5678");
        assert_eq!(mask_token("short"), "***");
        assert_eq!(mask_token(""), "***");
    }

    #[test]
    fn test_sanitize_body_redacts_nested_secrets() {
        let body = br#"{"name":"api","build_secret":"s3cr3t","env":[{"api_token":"x"}]}"#;
        let sanitized = sanitize_body(body, &[], DEFAULT_MAX_BODY_BYTES);

        assert!(sanitized.contains(r#""name":"api""#));
        assert!(!sanitized.contains("s3cr3t"));
        assert!(sanitized.contains(r#""api_token":"[redacted]""#));
    }

    #[test]
    fn test_sanitize_body_extra_keys() {
        let body = br#"{"env":{"DATABASE_URL":"postgres://u:p@h/db"}}"#;
        let sanitized = sanitize_body(body, &["env".to_string()], DEFAULT_MAX_BODY_BYTES);
        assert_eq!(sanitized, r#"{"env":"[redacted]"}"#);
    }

    #[test]
    fn test_sanitize_body_truncates_plain_text() {
        let body = "é".repeat(10);
        let sanitized = sanitize_body(body.as_bytes(), &[], 5);
        assert_eq!(sanitized, "éé...(truncated)");
        assert_eq!(sanitize_body(b"", &[], 5), "");
    }

    #[test]
    fn test_http_log_config_from_lookup() {
        let config = HttpLogConfig::from_lookup(|_| None);
        assert!(!config.enabled());

        let config = HttpLogConfig::from_lookup(|name| {
            (name == HTTP_LOG_ENV).then(|| "1".to_string())
        });
        assert_eq!(config.level, HttpLogLevel::Compact);
        assert!(config.enabled());
        assert!(!config.verbose_enabled());

        let config = HttpLogConfig::from_lookup(|name| {
            (name == HTTP_LOG_BODIES_ENV).then(|| "true".to_string())
        });
        assert!(config.verbose_enabled());

        let config = HttpLogConfig::from_lookup(|_| Some("0".to_string()));
        assert!(!config.enabled());
    }
}
