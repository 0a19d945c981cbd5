//! Hemmer HTTP Provider
//!
//! This crate maps declarative Hemmer resources onto a platform's REST API.
//! It has two halves that work together: a resilient API client and a
//! state-reconciliation engine.
//!
//! # Overview
//!
//! - **Transport**: one HTTP request per call, with a request timeout ([`transport`])
//! - **Client**: bounded linear-backoff retries on network failures and 5xx,
//!   cancellation, request validation hooks and sanitized logging ([`client`])
//! - **Error enrichment**: non-2xx bodies decoded into actionable diagnostics ([`diagnose`])
//! - **Reconciler**: merges desired, prior and server state field by field ([`reconcile`])
//! - **Descriptors**: static resource and field metadata ([`schema`], [`resources`])
//! - **ProviderService trait**: the CRUD contract, implemented generically by [`RestProvider`]
//! - **Logging**: Integration with `tracing` for structured logging
//!
//! # Quick Start
//!
//! ```ignore
//! use hemmer_provider_http::{init_logging, resources, ProviderService, RestProvider};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!
//!     let provider = RestProvider::new(resources::registry());
//!     provider
//!         .configure(json!({"endpoint": "https://api.hemmer.io/v1"}))
//!         .await?;
//!
//!     let state = provider
//!         .create("project", json!({"name": "demo"}))
//!         .await?;
//!     println!("{}", state);
//!     Ok(())
//! }
//! ```
//!
//! # Reconciliation
//!
//! The server is not a faithful echo of what was submitted: secrets come back
//! as `"********"`, some fields come back blank, and some cannot change after
//! creation. Every field declares a [`schema::MergePolicy`] that decides which
//! source wins, and every reconciled value records where it came from.
//!
//! # Import IDs
//!
//! - `project`: `"<ID>"`
//! - `service`: `"<projectID>.<serviceID>"`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod diagnose;
pub mod error;
pub mod logging;
pub mod provider;
pub mod reconcile;
pub mod resources;
pub mod schema;
pub mod testing;
pub mod transport;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use client::{ApiClient, ApiClientBuilder, ApiResponse, RequestValidator};
pub use config::ProviderConfig;
pub use diagnose::{diagnose, DiagnosedError, ErrorKind};
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging, HttpLogConfig};
pub use provider::{ProviderService, RestProvider};
pub use reconcile::{
    format_composite_id, parse_composite_id, parse_id, reconcile, Phase, Provenance,
    ReconciledState,
};
pub use schema::{DescriptorRegistry, Diagnostic, FieldKind, FieldSpec, MergePolicy, ResourceDescriptor};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
pub use types::{FieldValue, ImportedResource, ResourceState};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tokio_util::sync::CancellationToken;
pub use tracing;
