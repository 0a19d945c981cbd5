//! The CRUD contract and its descriptor-driven REST implementation.
//!
//! [`ProviderService`] is what a host calls. [`RestProvider`] implements it
//! for every kind in a [`DescriptorRegistry`]. Each call follows the same
//! pipeline: look up the descriptor, decode and validate the desired state,
//! build the request body, execute through the [`ApiClient`], diagnose
//! non-2xx responses, then reconcile the server's view against desired and
//! prior state.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::client::ApiClient;
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::reconcile::{parse_composite_id, parse_id, reconcile, Phase, ReconciledState};
use crate::schema::{Diagnostic, DescriptorRegistry, ResourceDescriptor};
use crate::transport::Transport;
use crate::types::{ImportedResource, ResourceState};
use crate::validation::{validate, validate_update};

/// Trait that provider implementations must implement.
///
/// # Example
///
/// ```ignore
/// use hemmer_provider_http::{ProviderService, ProviderError};
/// use hemmer_provider_http::schema::{DescriptorRegistry, Diagnostic};
///
/// struct MyProvider;
///
/// #[async_trait::async_trait]
/// impl ProviderService for MyProvider {
///     fn schema(&self) -> DescriptorRegistry {
///         hemmer_provider_http::resources::registry()
///     }
///
///     async fn configure(&self, config: serde_json::Value) -> Result<Vec<Diagnostic>, ProviderError> {
///         Ok(vec![])
///     }
///
///     // ... implement other methods
/// }
/// ```
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    /// Return the descriptors of every managed resource kind.
    fn schema(&self) -> DescriptorRegistry;

    /// Names of the managed resource kinds.
    fn resource_types(&self) -> Vec<String> {
        self.schema().kinds()
    }

    /// Validate the provider configuration before configuring.
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Configure the provider with credentials and settings.
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Validate a resource's desired configuration.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Create a resource and return the state to persist.
    async fn create(&self, resource_type: &str, desired: Value) -> Result<Value, ProviderError>;

    /// Refresh a resource. `None` means it no longer exists and should be
    /// dropped from state.
    async fn read(&self, resource_type: &str, prior: Value) -> Result<Option<Value>, ProviderError>;

    /// Update a resource and return the state to persist.
    async fn update(
        &self,
        resource_type: &str,
        prior: Value,
        desired: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource. Deleting a resource that is already gone succeeds.
    async fn delete(&self, resource_type: &str, prior: Value) -> Result<(), ProviderError>;

    /// Import existing infrastructure into management.
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let _ = id;
        Err(ProviderError::Validation(format!(
            "Import not supported for resource type: {}",
            resource_type
        )))
    }
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// A [`ProviderService`] driven entirely by resource descriptors.
pub struct RestProvider {
    registry: DescriptorRegistry,
    client: RwLock<Option<Arc<ApiClient>>>,
    transport: Option<Arc<dyn Transport>>,
    backoff_unit: Option<Duration>,
    env: EnvLookup,
}

impl RestProvider {
    /// Create a provider for the given resource kinds.
    pub fn new(registry: DescriptorRegistry) -> Self {
        Self {
            registry,
            client: RwLock::new(None),
            transport: None,
            backoff_unit: None,
            env: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Use a custom transport for every client this provider builds.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Override the client's backoff unit.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = Some(unit);
        self
    }

    /// Read environment fallbacks through `lookup` instead of the process
    /// environment.
    pub fn with_env_lookup(
        mut self,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.env = Arc::new(lookup);
        self
    }

    /// The configured client.
    pub async fn client(&self) -> Result<Arc<ApiClient>, ProviderError> {
        self.client.read().await.clone().ok_or_else(|| {
            ProviderError::Configuration("provider is not configured; call configure first".to_string())
        })
    }

    fn resolve_config(&self, config: Value) -> Result<ProviderConfig, ProviderError> {
        Ok(ProviderConfig::from_value(config)?.with_fallbacks(|name| (*self.env)(name)))
    }

    fn sensitive_field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .registry
            .iter()
            .flat_map(|d| d.fields.iter())
            .filter(|f| f.sensitive)
            .map(|f| f.name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    async fn fetch(
        &self,
        descriptor: &ResourceDescriptor,
        path: &str,
        operation: &str,
    ) -> Result<Option<ResourceState>, ProviderError> {
        let client = self.client().await.map_err(|e| e.context(operation))?;
        let response = client
            .request(Method::GET, path, None)
            .await
            .map_err(|e| e.context(operation))?;
        if response.status == 404 {
            return Ok(None);
        }
        let response = response.error_for_status(operation)?;
        let state = ResourceState::from_response(descriptor, &response.body)
            .map_err(|e| e.context(operation))?;
        Ok(Some(state))
    }
}

fn parent_id(
    descriptor: &ResourceDescriptor,
    states: &[&ResourceState],
) -> Option<i64> {
    let field = descriptor.parent_field.as_deref()?;
    states.iter().find_map(|s| s.get_i64(field))
}

fn resource_id(
    descriptor: &ResourceDescriptor,
    states: &[&ResourceState],
    operation: &str,
) -> Result<i64, ProviderError> {
    states
        .iter()
        .find_map(|s| s.get_i64(&descriptor.id_field))
        .ok_or_else(|| {
            ProviderError::Validation(format!(
                "state has no '{}'; the resource was never created",
                descriptor.id_field
            ))
            .context(operation)
        })
}

fn reject_errors(diagnostics: &[Diagnostic], operation: &str) -> Result<(), ProviderError> {
    let errors: Vec<&Diagnostic> = diagnostics.iter().filter(|d| d.is_error()).collect();
    if errors.is_empty() {
        return Ok(());
    }
    let message = errors
        .iter()
        .map(|d| match &d.detail {
            Some(detail) => format!("{}: {}", d.summary, detail),
            None => d.summary.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ");
    Err(ProviderError::Validation(message).context(operation))
}

fn id_to_i64(value: u64, id: &str) -> Result<i64, ProviderError> {
    i64::try_from(value).map_err(|_| {
        ProviderError::InvalidImportId(format!("{} in \"{}\" is out of range", value, id))
    })
}

fn surface_warnings(descriptor: &ResourceDescriptor, reconciled: &ReconciledState) {
    for warning in &reconciled.warnings {
        warn!(
            resource_type = %descriptor.kind,
            attribute = warning.attribute.as_deref().unwrap_or_default(),
            summary = %warning.summary,
            "reconciliation warning"
        );
    }
}

#[async_trait::async_trait]
impl ProviderService for RestProvider {
    fn schema(&self) -> DescriptorRegistry {
        self.registry.clone()
    }

    #[instrument(skip(self, config), name = "provider.validate_provider_config")]
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(self.resolve_config(config)?.validate())
    }

    #[instrument(skip(self, config), name = "provider.configure")]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = self.resolve_config(config)?;
        let diagnostics = config.validate();
        if diagnostics.iter().any(Diagnostic::is_error) {
            warn!(diagnostics = diagnostics.len(), "Configure completed with errors");
            return Ok(diagnostics);
        }

        let log = config
            .http_log_config()
            .with_redact_keys(self.sensitive_field_names());
        let mut builder = config.client_builder().with_log_config(log);
        if let Some(transport) = &self.transport {
            builder = builder.with_transport(transport.clone());
        }
        if let Some(unit) = self.backoff_unit {
            builder = builder.with_backoff_unit(unit);
        }
        let client = builder.build();
        debug!(client = ?client, "client configured");

        *self.client.write().await = Some(Arc::new(client));
        info!("Configure completed successfully");
        Ok(diagnostics)
    }

    #[instrument(skip(self, config), name = "provider.validate_resource_config")]
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let descriptor = self.registry.get(resource_type)?;
        Ok(validate(descriptor, &config))
    }

    #[instrument(skip(self, desired), name = "provider.create")]
    async fn create(&self, resource_type: &str, desired: Value) -> Result<Value, ProviderError> {
        let descriptor = self.registry.get(resource_type)?;
        let operation = descriptor.operation("create");
        reject_errors(&validate(descriptor, &desired), &operation)?;

        let desired = ResourceState::from_json(descriptor, &desired).map_err(|e| e.context(&operation))?;
        let path = descriptor
            .collection_path_for(parent_id(descriptor, &[&desired]))
            .map_err(|e| e.context(&operation))?;
        let body = desired.request_body(descriptor, true);

        let client = self.client().await.map_err(|e| e.context(&operation))?;
        let response = client
            .request(Method::POST, &path, Some(&body))
            .await
            .map_err(|e| {
                error!(resource_type, error = %e, "Create failed");
                e.context(&operation)
            })?
            .error_for_status(&operation)?;

        let server = ResourceState::from_response(descriptor, &response.body)
            .map_err(|e| e.context(&operation))?;
        let reconciled = reconcile(descriptor, Some(&desired), None, &server, Phase::Create);
        surface_warnings(descriptor, &reconciled);

        if reconciled.value(&descriptor.id_field).is_none() {
            return Err(ProviderError::Decode(format!(
                "response did not include '{}'",
                descriptor.id_field
            ))
            .context(&operation));
        }

        info!(resource_type, attempts = response.attempts, "Create completed successfully");
        Ok(reconciled.to_json())
    }

    #[instrument(skip(self, prior), name = "provider.read")]
    async fn read(&self, resource_type: &str, prior: Value) -> Result<Option<Value>, ProviderError> {
        let descriptor = self.registry.get(resource_type)?;
        let operation = descriptor.operation("read");

        let prior = ResourceState::from_json(descriptor, &prior).map_err(|e| e.context(&operation))?;
        let id = resource_id(descriptor, &[&prior], &operation)?;
        let path = descriptor
            .item_path_for(parent_id(descriptor, &[&prior]), id)
            .map_err(|e| e.context(&operation))?;

        let Some(server) = self.fetch(descriptor, &path, &operation).await? else {
            info!(resource_type, id, "resource no longer exists; removing from state");
            return Ok(None);
        };

        let reconciled = reconcile(descriptor, None, Some(&prior), &server, Phase::Read);
        surface_warnings(descriptor, &reconciled);
        debug!(resource_type, id, "Read completed");
        Ok(Some(reconciled.to_json()))
    }

    #[instrument(skip(self, prior, desired), name = "provider.update")]
    async fn update(
        &self,
        resource_type: &str,
        prior: Value,
        desired: Value,
    ) -> Result<Value, ProviderError> {
        let descriptor = self.registry.get(resource_type)?;
        let operation = descriptor.operation("update");

        let diagnostics = validate_update(descriptor, &prior, &desired);
        reject_errors(&diagnostics, &operation)?;
        for warning in diagnostics.iter().filter(|d| !d.is_error()) {
            warn!(resource_type, summary = %warning.summary, "update warning");
        }

        let prior = ResourceState::from_json(descriptor, &prior).map_err(|e| e.context(&operation))?;
        let desired = ResourceState::from_json(descriptor, &desired).map_err(|e| e.context(&operation))?;
        let id = resource_id(descriptor, &[&prior, &desired], &operation)?;
        let path = descriptor
            .item_path_for(parent_id(descriptor, &[&prior, &desired]), id)
            .map_err(|e| e.context(&operation))?;
        let body = desired.request_body(descriptor, false);

        let client = self.client().await.map_err(|e| e.context(&operation))?;
        let response = client
            .request(Method::PATCH, &path, Some(&body))
            .await
            .map_err(|e| {
                error!(resource_type, id, error = %e, "Update failed");
                e.context(&operation)
            })?
            .error_for_status(&operation)?;

        let server = if response.body.iter().all(u8::is_ascii_whitespace) {
            debug!(resource_type, id, "empty update response; refreshing");
            self.fetch(descriptor, &path, &operation)
                .await?
                .ok_or_else(|| {
                    ProviderError::NotFound(format!("{} {} disappeared during update", resource_type, id))
                        .context(&operation)
                })?
        } else {
            ResourceState::from_response(descriptor, &response.body)
                .map_err(|e| e.context(&operation))?
        };

        let reconciled = reconcile(descriptor, Some(&desired), Some(&prior), &server, Phase::Update);
        surface_warnings(descriptor, &reconciled);
        info!(resource_type, id, "Update completed successfully");
        Ok(reconciled.to_json())
    }

    #[instrument(skip(self, prior), name = "provider.delete")]
    async fn delete(&self, resource_type: &str, prior: Value) -> Result<(), ProviderError> {
        let descriptor = self.registry.get(resource_type)?;
        let operation = descriptor.operation("delete");

        let prior = ResourceState::from_json(descriptor, &prior).map_err(|e| e.context(&operation))?;
        let id = resource_id(descriptor, &[&prior], &operation)?;
        let path = descriptor
            .item_path_for(parent_id(descriptor, &[&prior]), id)
            .map_err(|e| e.context(&operation))?;

        let client = self.client().await.map_err(|e| e.context(&operation))?;
        let response = client
            .request(Method::DELETE, &path, None)
            .await
            .map_err(|e| e.context(&operation))?;
        if response.status == 404 {
            info!(resource_type, id, "resource already deleted");
            return Ok(());
        }
        response.error_for_status(&operation)?;
        info!(resource_type, id, "Delete completed successfully");
        Ok(())
    }

    #[instrument(skip(self), name = "provider.import_resource")]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let descriptor = self.registry.get(resource_type)?;
        let operation = descriptor.operation("import");

        let (parent, own_id) = if descriptor.is_child() {
            let (parent, child) = parse_composite_id(id).map_err(|e| e.context(&operation))?;
            (
                Some(id_to_i64(parent, id).map_err(|e| e.context(&operation))?),
                id_to_i64(child, id).map_err(|e| e.context(&operation))?,
            )
        } else {
            let single = parse_id(id).map_err(|e| e.context(&operation))?;
            (None, id_to_i64(single, id).map_err(|e| e.context(&operation))?)
        };

        let path = descriptor
            .item_path_for(parent, own_id)
            .map_err(|e| e.context(&operation))?;
        let mut server = self.fetch(descriptor, &path, &operation).await?.ok_or_else(|| {
            ProviderError::NotFound(format!("{} \"{}\" does not exist", resource_type, id))
                .context(&operation)
        })?;

        if server.get(&descriptor.id_field).is_none() {
            server.set(descriptor.id_field.clone(), own_id);
        }
        if let (Some(field), Some(parent)) = (&descriptor.parent_field, parent) {
            if server.get(field).is_none() {
                server.set(field.clone(), parent);
            }
        }

        let reconciled = reconcile(descriptor, None, None, &server, Phase::Read);
        info!(resource_type, id, "Import completed successfully");
        Ok(vec![ImportedResource::new(resource_type, reconciled.to_json())])
    }
}
