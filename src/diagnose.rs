//! Error enrichment for non-success API responses.
//!
//! [`diagnose`] turns a status code and raw body into a [`DiagnosedError`]
//! carrying the server's message, per-field validation messages, an actionable
//! suggestion and a documentation pointer. It never fails: bodies that are not
//! JSON, or JSON of an unexpected shape, degrade to a status-line message.
//!
//! The wire shape is:
//!
//! ```json
//! { "message": "validation failed", "errors": { "storage_size": ["required"] } }
//! ```
//!
//! where each `errors` value may be a string, a list of strings, or any other
//! JSON value (coerced to its string form).

use std::collections::BTreeMap;
use std::fmt;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Base documentation URL for error pointers.
pub const DEFAULT_DOCS_URL: &str = "https://docs.hemmer.io/providers/http/errors";

/// Hint for fields without an entry in the hint table.
pub const GENERIC_FIELD_HINT: &str = "check field value against documented constraints";

const FIELD_HINTS: &[(&str, &str)] = &[
    ("type", "must be one of the known enumerated values"),
    (
        "name",
        "must be unique within its parent and use lowercase letters, digits and dashes",
    ),
    ("storage_size", "must be a positive size with a unit, e.g. \"10Gi\""),
    ("memory", "must be a memory quantity with a unit, e.g. \"512Mi\""),
    ("cpu", "must be a CPU quantity, e.g. \"0.5\" or \"500m\""),
    ("command", "must be a non-empty command line"),
    ("region", "must be one of the regions available to the account"),
    ("default_branch", "must name an existing branch of the repository"),
    ("replicas", "must be a non-negative integer within the plan's limits"),
    ("repository", "must be a repository URL the platform can access"),
];

/// Classification of a non-success response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 400 or 422: the request body was rejected.
    Validation,
    /// 401.
    Unauthorized,
    /// 403.
    Forbidden,
    /// 404.
    NotFound,
    /// 409.
    Conflict,
    /// 429.
    RateLimited,
    /// Any 5xx, surfaced after retries were exhausted.
    Server,
    /// Any other 4xx.
    Client,
    /// Anything outside 4xx/5xx, e.g. an unfollowed redirect.
    Unexpected,
}

impl ErrorKind {
    /// Classify a status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => Self::Validation,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            409 => Self::Conflict,
            429 => Self::RateLimited,
            500..=599 => Self::Server,
            400..=499 => Self::Client,
            _ => Self::Unexpected,
        }
    }

    fn anchor(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not-found",
            Self::Conflict => "conflict",
            Self::RateLimited => "rate-limited",
            Self::Server => "server-error",
            Self::Client => "client-error",
            Self::Unexpected => "unexpected-status",
        }
    }
}

/// A non-success API response decoded into actionable parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosedError {
    /// HTTP status code.
    pub status: u16,
    /// Classification of the status.
    pub kind: ErrorKind,
    /// Top-level message from the server, or the status line.
    pub message: String,
    /// Field name to validation messages.
    pub field_errors: BTreeMap<String, Vec<String>>,
    /// What the user should do about it.
    pub suggestion: String,
    /// Where to read more.
    pub docs_url: String,
}

impl fmt::Display for DiagnosedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "API error {}: {}", self.status, self.message)?;
        if !self.field_errors.is_empty() {
            let fields: Vec<String> = self
                .field_errors
                .iter()
                .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
                .collect();
            write!(f, " [{}]", fields.join("; "))?;
        }
        write!(f, ". Suggestion: {} See {}", self.suggestion, self.docs_url)
    }
}

impl std::error::Error for DiagnosedError {}

/// One `errors` entry as sent by the server.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireMessages {
    One(String),
    Many(Vec<String>),
    Other(Value),
}

impl WireMessages {
    fn into_messages(self) -> Vec<String> {
        match self {
            Self::One(message) => vec![message],
            Self::Many(messages) => messages,
            Self::Other(Value::Null) => Vec::new(),
            Self::Other(Value::Array(items)) => items.iter().map(coerce_to_string).collect(),
            Self::Other(other) => vec![coerce_to_string(&other)],
        }
    }
}

fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Diagnose a response using [`DEFAULT_DOCS_URL`].
pub fn diagnose(status: u16, body: &[u8]) -> DiagnosedError {
    diagnose_with_docs(status, body, DEFAULT_DOCS_URL)
}

/// Diagnose a response with a custom documentation base URL.
pub fn diagnose_with_docs(status: u16, body: &[u8], docs_base: &str) -> DiagnosedError {
    let kind = ErrorKind::from_status(status);
    let status_line = status_line(status);

    let (message, field_errors) = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(obj)) => {
            let message = ["message", "error", "detail"]
                .iter()
                .filter_map(|key| obj.get(*key))
                .filter(|value| !value.is_null())
                .map(coerce_to_string)
                .find(|message| !message.trim().is_empty())
                .unwrap_or_else(|| status_line.clone());
            let field_errors = match obj.get("errors") {
                Some(Value::Object(errors)) => decode_field_errors(errors),
                _ => BTreeMap::new(),
            };
            (message, field_errors)
        },
        _ => (status_line, BTreeMap::new()),
    };

    DiagnosedError {
        status,
        kind,
        suggestion: suggest(status, &field_errors),
        docs_url: format!("{}#{}", docs_base.trim_end_matches('#'), kind.anchor()),
        message,
        field_errors,
    }
}

fn decode_field_errors(errors: &serde_json::Map<String, Value>) -> BTreeMap<String, Vec<String>> {
    errors
        .iter()
        .filter_map(|(field, value)| {
            let messages = serde_json::from_value::<WireMessages>(value.clone())
                .map(WireMessages::into_messages)
                .unwrap_or_else(|_| vec![coerce_to_string(value)]);
            if messages.is_empty() {
                None
            } else {
                Some((field.clone(), messages))
            }
        })
        .collect()
}

fn status_line(status: u16) -> String {
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason());
    match reason {
        Some(reason) => format!("HTTP {} {}", status, reason),
        None => format!("HTTP {}", status),
    }
}

/// The hint for a single field name.
pub fn field_hint(field: &str) -> &'static str {
    FIELD_HINTS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, hint)| *hint)
        .unwrap_or(GENERIC_FIELD_HINT)
}

/// Derive the suggestion for a status and its field errors.
pub fn suggest(status: u16, field_errors: &BTreeMap<String, Vec<String>>) -> String {
    match status {
        422 if !field_errors.is_empty() => field_errors
            .keys()
            .map(|field| format!("{}: {}", field, field_hint(field)))
            .collect::<Vec<_>>()
            .join("; "),
        400 | 422 => format!("the request was rejected as invalid; {}.", GENERIC_FIELD_HINT),
        401 => "verify the credential is valid and has required permissions.".to_string(),
        403 => "verify the credential is authorized for this operation.".to_string(),
        404 => "verify the resource exists and the identifier is correct.".to_string(),
        409 => "a resource with the same identity already exists; import it or choose a \
                different name."
            .to_string(),
        429 => "the API rate limit was exceeded; wait before running the operation again."
            .to_string(),
        500..=599 => "transient server error; retry later (the request was already retried \
                      automatically)."
            .to_string(),
        _ => "check the request against the API documentation.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_decoded_per_field() {
        let body = br#"{
            "message": "validation failed",
            "errors": {
                "storage_size": ["required"],
                "type": "is not included in the list",
                "replicas": 5,
                "name": ["is too long", "has invalid characters"]
            }
        }"#;
        let diagnosed = diagnose(422, body);

        assert_eq!(diagnosed.kind, ErrorKind::Validation);
        assert_eq!(diagnosed.message, "validation failed");
        assert_eq!(diagnosed.field_errors["storage_size"], vec!["required"]);
        assert_eq!(
            diagnosed.field_errors["type"],
            vec!["is not included in the list"]
        );
        assert_eq!(diagnosed.field_errors["replicas"], vec!["5"]);
        assert_eq!(diagnosed.field_errors["name"].len(), 2);
    }

    #[test]
    fn test_validation_suggestion_uses_hint_table() {
        let body = br#"{"message":"invalid","errors":{"type":"bad","flavor":"bad"}}"#;
        let diagnosed = diagnose(422, body);

        assert_eq!(
            diagnosed.suggestion,
            format!(
                "flavor: {}; type: must be one of the known enumerated values",
                GENERIC_FIELD_HINT
            )
        );
    }

    #[test]
    fn test_storage_size_scenario() {
        let body = br#"{"message":"invalid","errors":{"storage_size":["required"]}}"#;
        let diagnosed = diagnose(422, body);
        let rendered = diagnosed.to_string();

        assert!(rendered.contains("storage_size"));
        assert!(!diagnosed.suggestion.is_empty());
        assert!(rendered.contains(&diagnosed.suggestion));
        assert!(rendered.contains(&diagnosed.docs_url));
    }

    #[test]
    fn test_status_suggestions() {
        assert_eq!(
            diagnose(404, b"{}").suggestion,
            "verify the resource exists and the identifier is correct."
        );
        assert_eq!(
            diagnose(401, b"{}").suggestion,
            "verify the credential is valid and has required permissions."
        );
        assert_eq!(
            diagnose(403, b"{}").suggestion,
            "verify the credential is authorized for this operation."
        );
        assert!(diagnose(503, b"{}")
            .suggestion
            .starts_with("transient server error; retry later"));
        assert!(diagnose(429, b"{}").suggestion.contains("rate limit"));
    }

    #[test]
    fn test_non_json_body_degrades_to_status_line() {
        let diagnosed = diagnose(502, b"<html>Bad Gateway</html>");
        assert_eq!(diagnosed.message, "HTTP 502 Bad Gateway");
        assert_eq!(diagnosed.kind, ErrorKind::Server);
        assert!(diagnosed.field_errors.is_empty());

        let diagnosed = diagnose(500, b"");
        assert_eq!(diagnosed.message, "HTTP 500 Internal Server Error");
    }

    #[test]
    fn test_unexpected_json_shapes_are_tolerated() {
        let diagnosed = diagnose(422, br#"["not", "an", "object"]"#);
        assert_eq!(diagnosed.message, "HTTP 422 Unprocessable Entity");

        let diagnosed = diagnose(422, br#"{"message": null, "errors": ["a", "b"]}"#);
        assert_eq!(diagnosed.message, "HTTP 422 Unprocessable Entity");
        assert!(diagnosed.field_errors.is_empty());

        let diagnosed = diagnose(422, br#"{"errors": {"memory": null}}"#);
        assert!(diagnosed.field_errors.is_empty());
    }

    #[test]
    fn test_alternate_message_keys() {
        let diagnosed = diagnose(409, br#"{"error":"name already taken"}"#);
        assert_eq!(diagnosed.message, "name already taken");
        assert_eq!(diagnosed.kind, ErrorKind::Conflict);
    }

    #[test]
    fn test_docs_url_anchor() {
        let diagnosed = diagnose_with_docs(403, b"{}", "https://example.test/errors");
        assert_eq!(diagnosed.docs_url, "https://example.test/errors#forbidden");
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(ErrorKind::from_status(400), ErrorKind::Validation);
        assert_eq!(ErrorKind::from_status(418), ErrorKind::Client);
        assert_eq!(ErrorKind::from_status(599), ErrorKind::Server);
        assert_eq!(ErrorKind::from_status(302), ErrorKind::Unexpected);
    }
}
