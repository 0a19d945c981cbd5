//! Resource descriptors: the declarative shape of each managed resource kind.
//!
//! A [`ResourceDescriptor`] lists the fields of one resource kind in declaration
//! order, with their value kind, sensitivity and merge policy. The reconciler
//! walks the descriptor, so a new resource kind adds a descriptor rather than
//! new merge code.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Placeholder in a collection path that is replaced by the parent ID.
pub const PARENT_PLACEHOLDER: &str = "{parent}";

/// The kind of value a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// A string value.
    String,
    /// A 64-bit integer.
    Integer,
    /// A boolean value.
    Bool,
    /// A list of strings.
    StringList,
    /// A map from string keys to string values.
    StringMap,
}

impl FieldKind {
    /// Human-readable name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Bool => "bool",
            Self::StringList => "list of strings",
            Self::StringMap => "map of strings",
        }
    }
}

/// How a field's server value is merged with desired and prior state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// The server's value wins whenever it reports one, including empty values.
    #[default]
    ServerAuthoritative,
    /// An empty or zero server value keeps the locally known value.
    PreservePlannedIfServerEmpty,
    /// Set once at creation; server differences are reported as drift only.
    Immutable,
}

/// Describes a single field of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name, unique within a descriptor. Also the JSON key on the wire.
    pub name: String,
    /// The kind of value.
    pub kind: FieldKind,
    /// How server values are merged.
    #[serde(default)]
    pub merge_policy: MergePolicy,
    /// The server may return this field masked.
    #[serde(default)]
    pub sensitive: bool,
    /// The field must be set when creating the resource.
    #[serde(default)]
    pub required: bool,
    /// The field is set by the server and never sent in request bodies.
    #[serde(default)]
    pub computed: bool,
    /// If non-empty, the only values accepted in configuration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
    /// Human-readable description of the field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldSpec {
    /// Create a server-authoritative optional field.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            merge_policy: MergePolicy::default(),
            sensitive: false,
            required: false,
            computed: false,
            allowed_values: Vec::new(),
            description: None,
        }
    }

    /// Create a string field.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    /// Create an integer field.
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    /// Create a boolean field.
    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    /// Create a list-of-strings field.
    pub fn string_list(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::StringList)
    }

    /// Create a map-of-strings field.
    pub fn string_map(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::StringMap)
    }

    /// Mark the field as required on create.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark the field as computed by the server.
    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Mark the field as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Set the merge policy.
    pub fn with_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    /// Shorthand for [`MergePolicy::Immutable`].
    pub fn immutable(self) -> Self {
        self.with_policy(MergePolicy::Immutable)
    }

    /// Shorthand for [`MergePolicy::PreservePlannedIfServerEmpty`].
    pub fn preserve_planned(self) -> Self {
        self.with_policy(MergePolicy::PreservePlannedIfServerEmpty)
    }

    /// Restrict the field to an enumerated set of values.
    pub fn with_allowed_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether the field can only be set at creation.
    pub fn is_immutable(&self) -> bool {
        self.merge_policy == MergePolicy::Immutable
    }
}

/// Static description of one resource kind and where it lives in the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Resource kind name, e.g. `service`.
    pub kind: String,
    /// Collection path relative to the API endpoint. Child resources embed
    /// [`PARENT_PLACEHOLDER`].
    pub collection_path: String,
    /// Field holding the parent ID, for child resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_field: Option<String>,
    /// Field holding the resource's own ID.
    pub id_field: String,
    /// Key the API wraps single-resource responses in, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope: Option<String>,
    /// Fields in declaration order.
    pub fields: Vec<FieldSpec>,
}

impl ResourceDescriptor {
    /// Create a descriptor with an `id` field convention and no fields yet.
    pub fn new(kind: impl Into<String>, collection_path: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            collection_path: collection_path.into(),
            parent_field: None,
            id_field: "id".to_string(),
            envelope: None,
            fields: Vec::new(),
        }
    }

    /// Declare the field that carries the parent ID.
    pub fn with_parent(mut self, field: impl Into<String>) -> Self {
        self.parent_field = Some(field.into());
        self
    }

    /// Override the ID field name.
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Declare the response envelope key.
    pub fn with_envelope(mut self, key: impl Into<String>) -> Self {
        self.envelope = Some(key.into());
        self
    }

    /// Append a field. A field with the same name replaces the earlier one in place.
    pub fn with_field(mut self, field: FieldSpec) -> Self {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether the resource is nested under a parent.
    pub fn is_child(&self) -> bool {
        self.parent_field.is_some()
    }

    /// Operation label used as error context, e.g. `create service`.
    pub fn operation(&self, verb: &str) -> String {
        format!("{} {}", verb, self.kind)
    }

    /// Render the collection path for the given parent.
    pub fn collection_path_for(&self, parent: Option<i64>) -> Result<String, ProviderError> {
        if !self.collection_path.contains(PARENT_PLACEHOLDER) {
            return Ok(self.collection_path.clone());
        }
        match parent {
            Some(parent) => Ok(self
                .collection_path
                .replace(PARENT_PLACEHOLDER, &parent.to_string())),
            None => Err(ProviderError::Validation(format!(
                "{} requires '{}' to be set",
                self.kind,
                self.parent_field.as_deref().unwrap_or("parent")
            ))),
        }
    }

    /// Render the path of a single resource.
    pub fn item_path_for(&self, parent: Option<i64>, id: i64) -> Result<String, ProviderError> {
        let collection = self.collection_path_for(parent)?;
        Ok(format!("{}/{}", collection.trim_end_matches('/'), id))
    }
}

/// All resource kinds a provider manages, keyed by kind name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DescriptorRegistry {
    resources: BTreeMap<String, ResourceDescriptor>,
}

impl DescriptorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor under its kind name.
    pub fn with_resource(mut self, descriptor: ResourceDescriptor) -> Self {
        self.resources.insert(descriptor.kind.clone(), descriptor);
        self
    }

    /// Look up the descriptor for a resource kind.
    pub fn get(&self, kind: &str) -> Result<&ResourceDescriptor, ProviderError> {
        self.resources
            .get(kind)
            .ok_or_else(|| ProviderError::UnknownResource(kind.to_string()))
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> Vec<String> {
        self.resources.keys().cloned().collect()
    }

    /// Iterate over registered descriptors.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.resources.values()
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// An error that prevents the operation from completing.
    Error,
    /// A warning that doesn't prevent the operation but should be surfaced.
    Warning,
}

/// A diagnostic message returned to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity of the diagnostic.
    pub severity: DiagnosticSeverity,
    /// A short summary of the issue.
    pub summary: String,
    /// A detailed description of the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The attribute path where the issue occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Add detail to this diagnostic.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the attribute path for this diagnostic.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Whether this diagnostic is an error.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}
