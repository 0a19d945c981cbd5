//! Testing utilities for providers and clients.
//!
//! [`ScriptedTransport`] replays a fixed sequence of responses and records
//! every request it receives, so retry and reconciliation behavior can be
//! tested without a network. [`ProviderTester`] wraps a `ProviderService`
//! with lifecycle helpers.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hemmer_provider_http::testing::{ProviderTester, ScriptedTransport};
//! use hemmer_provider_http::{resources, RestProvider};
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_project() {
//!     let transport = Arc::new(ScriptedTransport::new().with_json(201, json!({"id": 1, "name": "demo"})));
//!     let tester = ProviderTester::new(
//!         RestProvider::new(resources::registry()).with_transport(transport.clone()),
//!     );
//!     tester.configure(json!({"endpoint": "https://api.test", "api_token": "t"})).await.unwrap();
//!
//!     let state = tester.create("project", json!({"name": "demo"})).await.unwrap();
//!     assert_eq!(state["id"], 1);
//! }
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProviderError;
use crate::provider::ProviderService;
use crate::schema::{DescriptorRegistry, Diagnostic, DiagnosticSeverity};
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};
use crate::types::ImportedResource;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Return this response.
    Response(HttpResponse),
    /// Fail with this transport error.
    Error(TransportError),
    /// Never complete.
    Hang,
}

/// A [`Transport`] that replays scripted replies in order.
///
/// Once the script is exhausted every call fails with
/// [`TransportError::Other`].
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    /// Create a transport with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reply.
    pub fn with_reply(self, reply: ScriptedReply) -> Self {
        self.push(reply);
        self
    }

    /// Append a response with a raw body.
    pub fn with_response(self, status: u16, body: &str) -> Self {
        self.with_reply(ScriptedReply::Response(HttpResponse::new(status, body)))
    }

    /// Append the same response `times` times.
    pub fn with_responses(self, status: u16, body: &str, times: usize) -> Self {
        for _ in 0..times {
            self.push(ScriptedReply::Response(HttpResponse::new(status, body)));
        }
        self
    }

    /// Append a response with a JSON body.
    pub fn with_json(self, status: u16, body: Value) -> Self {
        self.with_response(status, &body.to_string())
    }

    /// Append a transport failure.
    pub fn with_error(self, error: TransportError) -> Self {
        self.with_reply(ScriptedReply::Error(error))
    }

    /// Append a reply that never completes.
    pub fn with_hang(self) -> Self {
        self.with_reply(ScriptedReply::Hang)
    }

    /// Append a reply to a transport that is already shared.
    pub fn push(&self, reply: ScriptedReply) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of requests received so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        let next = self.script.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        match next {
            Some(ScriptedReply::Response(response)) => Ok(response),
            Some(ScriptedReply::Error(error)) => Err(error),
            Some(ScriptedReply::Hang) => std::future::pending().await,
            None => Err(TransportError::Other("no scripted reply left".to_string())),
        }
    }
}

/// A test harness for provider implementations.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Get the provider's descriptors.
    pub fn schema(&self) -> DescriptorRegistry {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.resource_types()
    }

    /// Validate provider configuration.
    ///
    /// Returns `Err` with the diagnostics if there are errors.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider.
    ///
    /// Returns `Err` with the diagnostics if there are errors.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Create a resource.
    pub async fn create(&self, resource_type: &str, desired: Value) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, desired).await
    }

    /// Read a resource.
    pub async fn read(
        &self,
        resource_type: &str,
        prior: Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.provider.read(resource_type, prior).await
    }

    /// Update a resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior: Value,
        desired: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.update(resource_type, prior, desired).await
    }

    /// Delete a resource.
    pub async fn delete(&self, resource_type: &str, prior: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, prior).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Run a create lifecycle: validate → create → read.
    ///
    /// Returns the state after read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        desired: Value,
    ) -> Result<Value, TestError> {
        self.validate_resource_config(resource_type, desired.clone())
            .await?;
        let created = self.create(resource_type, desired).await?;
        self.read_existing(resource_type, created).await
    }

    /// Run an update lifecycle: validate → update → read.
    ///
    /// Returns the state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior: Value,
        desired: Value,
    ) -> Result<Value, TestError> {
        self.validate_resource_config(resource_type, desired.clone())
            .await?;
        let updated = self.update(resource_type, prior, desired).await?;
        self.read_existing(resource_type, updated).await
    }

    /// Run a delete lifecycle: delete → read, expecting the resource gone.
    pub async fn lifecycle_delete(&self, resource_type: &str, prior: Value) -> Result<(), TestError> {
        self.delete(resource_type, prior.clone()).await?;
        match self.read(resource_type, prior).await? {
            None => Ok(()),
            Some(_) => Err(TestError::StillExists(resource_type.to_string())),
        }
    }

    /// Run a full lifecycle: create → read → update → read → delete → read.
    ///
    /// Returns the state after the update (before delete).
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial: Value,
        updated: Value,
    ) -> Result<Value, TestError> {
        let created = self.lifecycle_create(resource_type, initial).await?;
        let updated = self
            .lifecycle_update(resource_type, created, updated)
            .await?;
        self.lifecycle_delete(resource_type, updated.clone()).await?;
        Ok(updated)
    }

    async fn read_existing(&self, resource_type: &str, state: Value) -> Result<Value, TestError> {
        self.read(resource_type, state)
            .await?
            .ok_or_else(|| TestError::Missing(resource_type.to_string()))
    }
}

/// Error type for test operations.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
    /// A read after create or update found nothing.
    Missing(String),
    /// A read after delete still found the resource.
    StillExists(String),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
            TestError::Missing(kind) => write!(f, "{} was not found when read back", kind),
            TestError::StillExists(kind) => write!(f, "{} still exists after delete", kind),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics
        .into_iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain at least one error.
///
/// # Panics
///
/// Panics if there are no error diagnostics.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    assert!(
        diagnostics.iter().any(Diagnostic::is_error),
        "Expected at least one error, but got none"
    );
}

/// Assert that diagnostics contain an error with the given summary substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| d.is_error() && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}

/// Assert that a warning is attached to the given attribute.
///
/// # Panics
///
/// Panics if no warning diagnostic names `attribute`.
pub fn assert_warning_for(diagnostics: &[Diagnostic], attribute: &str) {
    let found = diagnostics
        .iter()
        .any(|d| !d.is_error() && d.attribute.as_deref() == Some(attribute));
    assert!(found, "Expected a warning for attribute '{}'", attribute);
}

/// Assert that a state object has `field` equal to `expected`.
///
/// # Panics
///
/// Panics if the field is missing or differs.
pub fn assert_state_field(state: &Value, field: &str, expected: Value) {
    let actual = state.get(field).cloned().unwrap_or(Value::Null);
    assert_eq!(
        actual, expected,
        "Expected state field '{}' to be {}, got {}",
        field, expected, actual
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::provider::RestProvider;
    use crate::resources;
    use reqwest::Method;
    use serde_json::json;

    async fn tester(transport: &Arc<ScriptedTransport>) -> ProviderTester<RestProvider> {
        let tester = ProviderTester::new(
            RestProvider::new(resources::registry())
                .with_transport(transport.clone())
                .with_backoff_unit(Duration::from_millis(1))
                .with_env_lookup(|_| None),
        );
        tester
            .configure(json!({"endpoint": "https://api.test", "api_token": "token"}))
            .await
            .unwrap();
        tester
    }

    #[tokio::test]
    async fn test_scripted_transport_replays_in_order() {
        let transport = ScriptedTransport::new()
            .with_response(503, "")
            .with_error(TransportError::Timeout("slow".into()));
        assert_eq!(transport.remaining(), 2);

        let request = HttpRequest::new(Method::GET, "https://api.test/x");
        assert_eq!(transport.send(request.clone()).await.unwrap().status, 503);
        assert!(transport.send(request.clone()).await.is_err());
        assert!(matches!(
            transport.send(request).await,
            Err(TransportError::Other(_))
        ));
        assert_eq!(transport.call_count(), 3);
        assert_eq!(transport.remaining(), 0);
    }

    #[tokio::test]
    async fn test_tester_configure_and_schema() {
        let transport = Arc::new(ScriptedTransport::new());
        let tester = tester(&transport).await;
        assert_eq!(tester.resource_types(), vec!["project", "service"]);
        assert!(tester.schema().get("service").is_ok());
    }

    #[tokio::test]
    async fn test_tester_configure_reports_errors() {
        let tester = ProviderTester::new(
            RestProvider::new(resources::registry()).with_env_lookup(|_| None),
        );
        let err = tester
            .configure(json!({"endpoint": "not a url"}))
            .await
            .unwrap_err();
        assert!(matches!(err, TestError::Diagnostics(ref d) if d.len() == 1));
    }

    #[tokio::test]
    async fn test_tester_lifecycle_create() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_json(201, json!({"id": 3, "name": "demo", "region": "eu-west"}))
                .with_json(200, json!({"id": 3, "name": "demo", "region": "eu-west"})),
        );
        let tester = tester(&transport).await;

        let state = tester
            .lifecycle_create("project", json!({"name": "demo"}))
            .await
            .unwrap();
        assert_state_field(&state, "id", json!(3));
        assert_state_field(&state, "region", json!("eu-west"));
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_tester_lifecycle_crud() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_json(201, json!({"id": 3, "name": "initial"}))
                .with_json(200, json!({"id": 3, "name": "initial"}))
                .with_json(200, json!({"id": 3, "name": "updated"}))
                .with_json(200, json!({"id": 3, "name": "updated"}))
                .with_response(204, "")
                .with_response(404, ""),
        );
        let tester = tester(&transport).await;

        let final_state = tester
            .lifecycle_crud(
                "project",
                json!({"name": "initial"}),
                json!({"name": "updated"}),
            )
            .await
            .unwrap();
        assert_state_field(&final_state, "name", json!("updated"));
        assert_eq!(transport.remaining(), 0);
    }

    #[tokio::test]
    async fn test_tester_lifecycle_delete_detects_survivor() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_response(204, "")
                .with_json(200, json!({"id": 3, "name": "demo"})),
        );
        let tester = tester(&transport).await;
        let err = tester
            .lifecycle_delete("project", json!({"id": 3, "name": "demo"}))
            .await
            .unwrap_err();
        assert!(matches!(err, TestError::StillExists(_)));
    }

    #[tokio::test]
    async fn test_tester_lifecycle_create_rejects_invalid_config() {
        let transport = Arc::new(ScriptedTransport::new());
        let tester = tester(&transport).await;
        let err = tester
            .lifecycle_create("project", json!({"description": "no name"}))
            .await
            .unwrap_err();
        assert!(matches!(err, TestError::Diagnostics(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn test_assert_no_errors() {
        let diagnostics = vec![Diagnostic::warning("Just a warning")];
        assert_no_errors(&diagnostics);
    }

    #[test]
    #[should_panic(expected = "Expected no errors")]
    fn test_assert_no_errors_fails() {
        let diagnostics = vec![Diagnostic::error("An error")];
        assert_no_errors(&diagnostics);
    }

    #[test]
    fn test_assert_has_errors() {
        let diagnostics = vec![Diagnostic::error("An error")];
        assert_has_errors(&diagnostics);
    }

    #[test]
    fn test_assert_error_contains() {
        let diagnostics = vec![Diagnostic::error("Invalid configuration value")];
        assert_error_contains(&diagnostics, "Invalid");
        assert_error_contains(&diagnostics, "configuration");
    }

    #[test]
    fn test_assert_warning_for() {
        let diagnostics = vec![Diagnostic::warning("drift").with_attribute("region")];
        assert_warning_for(&diagnostics, "region");
    }

    #[test]
    fn test_test_error_display() {
        let err = TestError::Diagnostics(vec![
            Diagnostic::error("First error").with_attribute("field1"),
            Diagnostic::error("Second error").with_detail("More info"),
        ]);

        let display = format!("{}", err);
        assert!(display.contains("First error"));
        assert!(display.contains("Second error"));
        assert!(display.contains("field1"));
        assert!(display.contains("More info"));
        assert_eq!(
            TestError::StillExists("service".into()).to_string(),
            "service still exists after delete"
        );
    }
}
