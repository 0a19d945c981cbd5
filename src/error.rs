//! Error types for providers built on the HTTP client.

use thiserror::Error;

use crate::diagnose::{DiagnosedError, DEFAULT_DOCS_URL};
use crate::schema::Diagnostic;
use crate::transport::TransportError;

/// Errors surfaced by the client, the reconciler and the CRUD layer.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The desired configuration failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The client or provider is missing configuration. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A request body could not be encoded, or a payload could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The network failed on every attempt.
    #[error("Transport error after {attempts} attempt(s): {source}")]
    Transport {
        /// Number of attempts made.
        attempts: u32,
        /// The last transport failure.
        source: TransportError,
    },

    /// The caller canceled the operation. Never retried.
    #[error("Request canceled: {0}")]
    Canceled(String),

    /// The API answered with a non-success status.
    #[error("{0}")]
    Api(Box<DiagnosedError>),

    /// A request validation hook rejected the request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An import identifier could not be parsed.
    #[error("Invalid import ID: {0}")]
    InvalidImportId(String),

    /// A field value has the wrong shape for its declared kind.
    #[error("Invalid field value: {0}")]
    Decode(String),

    /// A lower-level error wrapped with the operation that failed.
    #[error("{operation}: {source}")]
    Operation {
        /// Operation label, e.g. `create service`.
        operation: String,
        /// The underlying error.
        source: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Wrap this error with the operation that failed.
    pub fn context(self, operation: impl Into<String>) -> Self {
        Self::Operation {
            operation: operation.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping operation context.
    pub fn root(&self) -> &ProviderError {
        match self {
            Self::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// The outermost operation label, if any.
    pub fn operation(&self) -> Option<&str> {
        match self {
            Self::Operation { operation, .. } => Some(operation),
            _ => None,
        }
    }

    /// The diagnosed API error, if this error came from an API response.
    pub fn diagnosed(&self) -> Option<&DiagnosedError> {
        match self.root() {
            Self::Api(diagnosed) => Some(diagnosed),
            _ => None,
        }
    }

    /// Whether this error means the resource does not exist remotely.
    pub fn is_not_found(&self) -> bool {
        match self.root() {
            Self::NotFound(_) => true,
            Self::Api(diagnosed) => diagnosed.status == 404,
            _ => false,
        }
    }

    /// Whether the caller canceled the operation.
    pub fn is_canceled(&self) -> bool {
        matches!(self.root(), Self::Canceled(_))
    }

    /// Get the error message as a string.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg) => msg,
            Self::Validation(msg) => msg,
            Self::Configuration(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
            Self::Transport { .. } => "transport error (see Debug output)",
            Self::Canceled(msg) => msg,
            Self::Api(diagnosed) => &diagnosed.message,
            Self::InvalidRequest(msg) => msg,
            Self::InvalidImportId(msg) => msg,
            Self::Decode(msg) => msg,
            Self::Operation { source, .. } => source.message(),
        }
    }

    /// An actionable hint for the user.
    pub fn suggestion(&self) -> String {
        match self.root() {
            Self::Api(diagnosed) => diagnosed.suggestion.clone(),
            Self::Configuration(_) => "set 'endpoint' and 'api_token' in the provider \
                                       configuration or via HEMMER_API_ENDPOINT and \
                                       HEMMER_API_TOKEN."
                .to_string(),
            Self::Transport { .. } => "check network connectivity and that the configured \
                                       endpoint is reachable."
                .to_string(),
            Self::Canceled(_) => "the operation was canceled by the caller; re-run it to \
                                  continue."
                .to_string(),
            Self::InvalidImportId(_) => "use the documented import ID format, e.g. \
                                         '<parentID>.<childID>' for child resources."
                .to_string(),
            Self::UnknownResource(_) => "check the resource type name against the \
                                         provider schema."
                .to_string(),
            Self::NotFound(_) => {
                "verify the resource exists and the identifier is correct.".to_string()
            },
            Self::Validation(_) | Self::Decode(_) | Self::InvalidRequest(_) => {
                "check field value against documented constraints.".to_string()
            },
            Self::Serialization(_) => {
                "check that the configuration only contains JSON-representable values."
                    .to_string()
            },
            Self::Operation { source, .. } => source.suggestion(),
        }
    }

    /// A documentation pointer for this error.
    pub fn docs_url(&self) -> String {
        match self.root() {
            Self::Api(diagnosed) => diagnosed.docs_url.clone(),
            Self::Configuration(_) => format!("{}#configuration", DEFAULT_DOCS_URL),
            Self::Transport { .. } | Self::Canceled(_) => {
                format!("{}#connectivity", DEFAULT_DOCS_URL)
            },
            Self::InvalidImportId(_) => format!("{}#import", DEFAULT_DOCS_URL),
            _ => format!("{}#validation", DEFAULT_DOCS_URL),
        }
    }

    /// Render this error as a host-facing diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic::error(self.to_string()).with_detail(format!(
            "Suggestion: {}\nDocumentation: {}",
            self.suggestion(),
            self.docs_url()
        ));
        match self.diagnosed() {
            Some(diagnosed) if diagnosed.field_errors.len() == 1 => {
                match diagnosed.field_errors.keys().next() {
                    Some(field) => diagnostic.with_attribute(field.clone()),
                    None => diagnostic,
                }
            },
            _ => diagnostic,
        }
    }
}

impl From<DiagnosedError> for ProviderError {
    fn from(diagnosed: DiagnosedError) -> Self {
        Self::Api(Box::new(diagnosed))
    }
}

impl From<ProviderError> for Diagnostic {
    fn from(err: ProviderError) -> Self {
        err.to_diagnostic()
    }
}
