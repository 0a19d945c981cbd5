//! Typed field values and resource state.
//!
//! Wire payloads are loosely typed: a map may arrive as an object, as a list of
//! `{key, value}` entries or as `null`; integers sometimes arrive as strings.
//! [`FieldValue::decode`] normalizes every accepted shape into one canonical
//! variant per [`FieldKind`] so the reconciler never sees wire ambiguity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::reconcile::MASKED_SENTINEL;
use crate::schema::{FieldKind, MergePolicy, ResourceDescriptor};

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A string.
    String(String),
    /// An integer.
    Integer(i64),
    /// A boolean.
    Bool(bool),
    /// A list of strings.
    StringList(Vec<String>),
    /// A map of strings.
    StringMap(BTreeMap<String, String>),
}

impl FieldValue {
    /// Decode a JSON value as the given kind. `null` decodes to `None`.
    pub fn decode(kind: FieldKind, value: &Value) -> Result<Option<Self>, String> {
        if value.is_null() {
            return Ok(None);
        }
        let decoded = match kind {
            FieldKind::String => Self::String(decode_string(value)?),
            FieldKind::Integer => Self::Integer(decode_integer(value)?),
            FieldKind::Bool => Self::Bool(decode_bool(value)?),
            FieldKind::StringList => Self::StringList(decode_list(value)?),
            FieldKind::StringMap => Self::StringMap(decode_map(value)?),
        };
        Ok(Some(decoded))
    }

    /// The kind this value belongs to.
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::String(_) => FieldKind::String,
            Self::Integer(_) => FieldKind::Integer,
            Self::Bool(_) => FieldKind::Bool,
            Self::StringList(_) => FieldKind::StringList,
            Self::StringMap(_) => FieldKind::StringMap,
        }
    }

    /// Whether this is the empty or zero value of its kind.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::String(s) => s.is_empty(),
            Self::Integer(i) => *i == 0,
            Self::Bool(b) => !*b,
            Self::StringList(items) => items.is_empty(),
            Self::StringMap(entries) => entries.is_empty(),
        }
    }

    /// Encode as JSON.
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Integer(i) => Value::from(*i),
            Self::Bool(b) => Value::Bool(*b),
            Self::StringList(items) => Value::from(items.clone()),
            Self::StringMap(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
        }
    }

    /// The string, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The integer, if this is an integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// The map, if this is a map value.
    pub fn as_map(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::StringMap(entries) => Some(entries),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn decode_string(value: &Value) -> Result<String, String> {
    scalar_to_string(value).ok_or_else(|| format!("expected string, got {}", json_type_name(value)))
}

fn decode_integer(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                        Ok(f as i64)
                    },
                    _ => Err(format!("expected integer, got {}", n)),
                }
            }
        },
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("expected integer, got \"{}\"", s)),
        other => Err(format!("expected integer, got {}", json_type_name(other))),
    }
}

fn decode_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s == "true" => Ok(true),
        Value::String(s) if s == "false" => Ok(false),
        other => Err(format!("expected bool, got {}", json_type_name(other))),
    }
}

fn decode_list(value: &Value) -> Result<Vec<String>, String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(|item| {
                scalar_to_string(item).ok_or_else(|| {
                    format!("expected list of strings, found {}", json_type_name(item))
                })
            })
            .collect(),
        Value::String(s) => Ok(vec![s.clone()]),
        other => Err(format!("expected list of strings, got {}", json_type_name(other))),
    }
}

fn decode_map(value: &Value) -> Result<BTreeMap<String, String>, String> {
    match value {
        Value::Object(obj) => Ok(map_from_object(obj)),
        Value::Array(entries) => {
            let mut map = BTreeMap::new();
            for entry in entries {
                let (key, val) = decode_map_entry(entry)?;
                map.insert(key, val);
            }
            Ok(map)
        },
        other => Err(format!("expected map of strings, got {}", json_type_name(other))),
    }
}

fn map_from_object(obj: &Map<String, Value>) -> BTreeMap<String, String> {
    obj.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = scalar_to_string(v).unwrap_or_else(|| v.to_string());
            (k.clone(), value)
        })
        .collect()
}

/// Accepts `{"key": k, "value": v}`, `{"name": k, "value": v}` and `"k=v"`.
fn decode_map_entry(entry: &Value) -> Result<(String, String), String> {
    match entry {
        Value::Object(obj) => {
            let key = obj
                .get("key")
                .or_else(|| obj.get("name"))
                .and_then(scalar_to_string)
                .ok_or_else(|| "map entry is missing 'key' or 'name'".to_string())?;
            let value = obj
                .get("value")
                .and_then(scalar_to_string)
                .unwrap_or_default();
            Ok((key, value))
        },
        Value::String(s) => match s.split_once('=') {
            Some((key, value)) => Ok((key.to_string(), value.to_string())),
            None => Err(format!("map entry \"{}\" is not of the form key=value", s)),
        },
        other => Err(format!("unsupported map entry {}", json_type_name(other))),
    }
}

/// Field values of one resource instance. An absent field is unset (null).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceState {
    values: BTreeMap<String, FieldValue>,
}

impl ResourceState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the descriptor's fields out of a JSON object. Unknown keys are
    /// ignored and `null` is treated as an empty state. A sensitive field
    /// sent as the masked sentinel is kept as that string marker, whatever its
    /// kind, and left for the reconciler to resolve.
    pub fn from_json(descriptor: &ResourceDescriptor, value: &Value) -> Result<Self, ProviderError> {
        let obj = match value {
            Value::Object(obj) => obj,
            Value::Null => return Ok(Self::new()),
            other => {
                return Err(ProviderError::Decode(format!(
                    "{} state must be an object, got {}",
                    descriptor.kind,
                    json_type_name(other)
                )))
            },
        };

        let mut state = Self::new();
        for field in &descriptor.fields {
            let Some(raw) = obj.get(&field.name) else {
                continue;
            };
            // A whole sensitive value may be masked whatever its kind.
            if field.sensitive && raw.as_str() == Some(MASKED_SENTINEL) {
                state
                    .values
                    .insert(field.name.clone(), FieldValue::String(MASKED_SENTINEL.to_string()));
                continue;
            }
            let decoded = FieldValue::decode(field.kind, raw)
                .map_err(|reason| ProviderError::Decode(format!("{}: {}", field.name, reason)))?;
            if let Some(value) = decoded {
                state.values.insert(field.name.clone(), value);
            }
        }
        Ok(state)
    }

    /// Decode a raw response body, unwrapping the descriptor's envelope if
    /// present. An empty body decodes to an empty state.
    pub fn from_response(descriptor: &ResourceDescriptor, body: &[u8]) -> Result<Self, ProviderError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::new());
        }
        let value: Value = serde_json::from_slice(body)?;
        let inner = match (&descriptor.envelope, &value) {
            (Some(key), Value::Object(obj)) => obj.get(key).unwrap_or(&value),
            _ => &value,
        };
        Self::from_json(descriptor, inner)
    }

    /// Look up a field.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    /// Look up an integer field.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(FieldValue::as_i64)
    }

    /// Set a field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Builder form of [`ResourceState::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Unset a field, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.values.remove(name)
    }

    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over set fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.values.iter()
    }

    /// Encode every descriptor field; unset fields become `null`.
    pub fn to_json(&self, descriptor: &ResourceDescriptor) -> Value {
        let obj: Map<String, Value> = descriptor
            .fields
            .iter()
            .map(|field| {
                let value = self.get(&field.name).map(FieldValue::to_json).unwrap_or(Value::Null);
                (field.name.clone(), value)
            })
            .collect();
        Value::Object(obj)
    }

    /// Build an API request body. Computed fields, the parent field (which is
    /// routed through the path) and unset fields are left out; immutable fields
    /// are only sent when `include_immutable` is set.
    pub fn request_body(&self, descriptor: &ResourceDescriptor, include_immutable: bool) -> Value {
        let obj: Map<String, Value> = descriptor
            .fields
            .iter()
            .filter(|field| !field.computed)
            .filter(|field| descriptor.parent_field.as_deref() != Some(field.name.as_str()))
            .filter(|field| include_immutable || field.merge_policy != MergePolicy::Immutable)
            .filter_map(|field| {
                self.get(&field.name)
                    .map(|value| (field.name.clone(), value.to_json()))
            })
            .collect();
        Value::Object(obj)
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for ResourceState {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// An imported resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// The resource type.
    pub resource_type: String,
    /// The imported state.
    pub state: Value,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;
    use serde_json::json;

    fn descriptor() -> ResourceDescriptor {
        ResourceDescriptor::new("service", "/projects/{parent}/services")
            .with_parent("project_id")
            .with_envelope("data")
            .with_field(FieldSpec::integer("id").computed())
            .with_field(FieldSpec::integer("project_id").immutable())
            .with_field(FieldSpec::string("type").immutable())
            .with_field(FieldSpec::string("memory").preserve_planned())
            .with_field(FieldSpec::bool("auto_deploy"))
            .with_field(FieldSpec::string_list("domains"))
            .with_field(FieldSpec::string_map("env").sensitive())
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(
            FieldValue::decode(FieldKind::String, &json!("x")).unwrap(),
            Some(FieldValue::from("x"))
        );
        assert_eq!(
            FieldValue::decode(FieldKind::String, &json!(3)).unwrap(),
            Some(FieldValue::from("3"))
        );
        assert_eq!(
            FieldValue::decode(FieldKind::Integer, &json!("42")).unwrap(),
            Some(FieldValue::Integer(42))
        );
        assert_eq!(
            FieldValue::decode(FieldKind::Integer, &json!(42.0)).unwrap(),
            Some(FieldValue::Integer(42))
        );
        assert!(FieldValue::decode(FieldKind::Integer, &json!(42.5)).is_err());
        assert_eq!(
            FieldValue::decode(FieldKind::Bool, &json!("true")).unwrap(),
            Some(FieldValue::Bool(true))
        );
        assert!(FieldValue::decode(FieldKind::Bool, &json!(1)).is_err());
        assert_eq!(FieldValue::decode(FieldKind::String, &Value::Null).unwrap(), None);
    }

    #[test]
    fn test_decode_map_normalizes_shapes() {
        let expected: BTreeMap<String, String> =
            [("A".to_string(), "1".to_string()), ("B".to_string(), "x".to_string())]
                .into_iter()
                .collect();

        let shapes = [
            json!({"A": 1, "B": "x"}),
            json!([{"key": "A", "value": "1"}, {"name": "B", "value": "x"}]),
            json!(["A=1", "B=x"]),
        ];
        for shape in shapes {
            let decoded = FieldValue::decode(FieldKind::StringMap, &shape).unwrap();
            assert_eq!(decoded, Some(FieldValue::StringMap(expected.clone())), "{shape}");
        }

        assert_eq!(FieldValue::decode(FieldKind::StringMap, &Value::Null).unwrap(), None);
        assert!(FieldValue::decode(FieldKind::StringMap, &json!(["broken"])).is_err());
        assert!(FieldValue::decode(FieldKind::StringMap, &json!("A=1")).is_err());
    }

    #[test]
    fn test_decode_list() {
        assert_eq!(
            FieldValue::decode(FieldKind::StringList, &json!(["a", null, 2])).unwrap(),
            Some(FieldValue::StringList(vec!["a".into(), "2".into()]))
        );
        assert_eq!(
            FieldValue::decode(FieldKind::StringList, &json!("solo")).unwrap(),
            Some(FieldValue::StringList(vec!["solo".into()]))
        );
        assert!(FieldValue::decode(FieldKind::StringList, &json!([{"a": 1}])).is_err());
    }

    #[test]
    fn test_is_empty() {
        assert!(FieldValue::from("").is_empty());
        assert!(FieldValue::Integer(0).is_empty());
        assert!(FieldValue::Bool(false).is_empty());
        assert!(FieldValue::StringList(vec![]).is_empty());
        assert!(!FieldValue::from("512Mi").is_empty());
        assert!(!FieldValue::Integer(-1).is_empty());
    }

    #[test]
    fn test_state_from_json_ignores_unknown_keys() {
        let state = ResourceState::from_json(
            &descriptor(),
            &json!({"id": 5, "memory": "", "unknown": true, "domains": null}),
        )
        .unwrap();

        assert_eq!(state.get_i64("id"), Some(5));
        assert_eq!(state.get("memory"), Some(&FieldValue::from("")));
        assert!(state.get("domains").is_none());
        assert!(state.get("unknown").is_none());
    }

    #[test]
    fn test_state_from_json_reports_field() {
        let err = ResourceState::from_json(&descriptor(), &json!({"auto_deploy": "maybe"}))
            .unwrap_err();
        assert!(err.to_string().contains("auto_deploy"));

        let err = ResourceState::from_json(&descriptor(), &json!([1, 2])).unwrap_err();
        assert!(matches!(err, ProviderError::Decode(_)));
    }

    #[test]
    fn test_state_from_json_keeps_masked_sensitive_marker() {
        let state = ResourceState::from_json(&descriptor(), &json!({"env": MASKED_SENTINEL}))
            .unwrap();
        assert_eq!(state.get("env"), Some(&FieldValue::from(MASKED_SENTINEL)));

        // Non-sensitive fields stay strict.
        let err = ResourceState::from_json(&descriptor(), &json!({"project_id": MASKED_SENTINEL}))
            .unwrap_err();
        assert!(err.to_string().contains("project_id"));
    }

    #[test]
    fn test_from_response_unwraps_envelope() {
        let state =
            ResourceState::from_response(&descriptor(), br#"{"data":{"id":9,"type":"web"}}"#)
                .unwrap();
        assert_eq!(state.get_i64("id"), Some(9));

        let state = ResourceState::from_response(&descriptor(), br#"{"id":10}"#).unwrap();
        assert_eq!(state.get_i64("id"), Some(10));

        assert!(ResourceState::from_response(&descriptor(), b"  ").unwrap().is_empty());
        assert!(ResourceState::from_response(&descriptor(), b"not json").is_err());
    }

    #[test]
    fn test_request_body_filters_fields() {
        let state: ResourceState = [
            ("id", FieldValue::Integer(1)),
            ("project_id", FieldValue::Integer(2)),
            ("type", FieldValue::from("worker")),
            ("memory", FieldValue::from("256Mi")),
        ]
        .into_iter()
        .collect();

        let create = state.request_body(&descriptor(), true);
        assert_eq!(create, json!({"type": "worker", "memory": "256Mi"}));

        let update = state.request_body(&descriptor(), false);
        assert_eq!(update, json!({"memory": "256Mi"}));
    }

    #[test]
    fn test_to_json_includes_nulls() {
        let state = ResourceState::new().with("memory", "1Gi");
        let json = state.to_json(&descriptor());
        assert_eq!(json["memory"], "1Gi");
        assert!(json["type"].is_null());
        assert_eq!(json.as_object().unwrap().len(), descriptor().fields.len());
    }

    #[test]
    fn test_imported_resource() {
        let imported = ImportedResource::new("service", json!({"id": 3}));
        assert_eq!(imported.resource_type, "service");
        assert_eq!(imported.state["id"], 3);
    }
}
