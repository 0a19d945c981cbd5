//! Three-way state reconciliation.
//!
//! [`reconcile`] merges the desired configuration, the previously persisted
//! state and the server's response into the state to persist next. Each field
//! is resolved by its [`MergePolicy`], in declaration order:
//!
//! 1. A sensitive field whose server value is [`MASKED_SENTINEL`] (or a list
//!    holding it) never adopts the server value; it falls back like
//!    `PreservePlannedIfServerEmpty`, whatever its declared policy. Masked map
//!    entries fall back entry by entry.
//! 2. `Immutable`: prior, else desired. A different server value is reported
//!    as drift (a warning), never adopted.
//! 3. `ServerAuthoritative`: the server value whenever the server sent one,
//!    even an empty one.
//! 4. `PreservePlannedIfServerEmpty`: the server value only when it is
//!    non-empty; an empty server value never erases a known value.
//!
//! The fallback source depends on the [`Phase`]: create falls back to the
//! desired state, read to the prior state, update to desired then prior.
//!
//! This module also owns the import identifier format (`"<parent>.<child>"`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ProviderError;
use crate::schema::{Diagnostic, FieldKind, FieldSpec, MergePolicy, ResourceDescriptor};
use crate::types::{FieldValue, ResourceState};

/// The placeholder a server returns instead of a sensitive value.
pub const MASKED_SENTINEL: &str = "********";

/// Which CRUD phase the reconciliation runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// After a create call; there is no prior state.
    Create,
    /// After a read or import; there is no desired state.
    Read,
    /// After an update call.
    Update,
}

/// Where a reconciled value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// The desired configuration.
    Desired,
    /// The previously persisted state.
    Prior,
    /// The server response.
    Server,
    /// No source had a value.
    Unset,
}

/// One reconciled field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledField {
    /// Field name.
    pub name: String,
    /// Value to persist; `None` is null.
    pub value: Option<FieldValue>,
    /// Source of `value`.
    pub provenance: Provenance,
    /// The server reported a different value for an immutable field.
    pub drift_detected: bool,
    /// The server masked some or all of this field.
    pub masked: bool,
}

/// The output of [`reconcile`]: one entry per descriptor field, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledState {
    /// Resource kind.
    pub kind: String,
    /// Reconciled fields in declaration order.
    pub fields: Vec<ReconciledField>,
    /// Non-fatal findings, e.g. drift on immutable fields.
    pub warnings: Vec<Diagnostic>,
}

impl ReconciledState {
    /// Look up a reconciled field.
    pub fn field(&self, name: &str) -> Option<&ReconciledField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The reconciled value of a field.
    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.field(name).and_then(|f| f.value.as_ref())
    }

    /// The provenance of a field.
    pub fn provenance(&self, name: &str) -> Option<Provenance> {
        self.field(name).map(|f| f.provenance)
    }

    /// Names of fields where drift was detected.
    pub fn drifted_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.drift_detected)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// The state to persist next.
    pub fn to_state(&self) -> ResourceState {
        self.fields
            .iter()
            .filter_map(|f| f.value.clone().map(|v| (f.name.clone(), v)))
            .collect()
    }

    /// The state to persist next, as JSON with every field present.
    pub fn to_json(&self) -> Value {
        let obj: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| {
                let value = f.value.as_ref().map(FieldValue::to_json).unwrap_or(Value::Null);
                (f.name.clone(), value)
            })
            .collect();
        Value::Object(obj)
    }
}

/// Merge desired, prior and server views of one resource.
pub fn reconcile(
    descriptor: &ResourceDescriptor,
    desired: Option<&ResourceState>,
    prior: Option<&ResourceState>,
    server: &ResourceState,
    phase: Phase,
) -> ReconciledState {
    let mut warnings = Vec::new();
    let fields = descriptor
        .fields
        .iter()
        .map(|field| {
            let sources = Sources {
                desired,
                prior,
                phase,
            };
            let reconciled = reconcile_field(field, &sources, server.get(&field.name));
            if reconciled.drift_detected {
                let reported = server
                    .get(&field.name)
                    .map(|v| v.to_json().to_string())
                    .unwrap_or_default();
                let kept = reconciled
                    .value
                    .as_ref()
                    .map(|v| v.to_json().to_string())
                    .unwrap_or_default();
                warn!(
                    resource_type = %descriptor.kind,
                    field = %field.name,
                    "immutable field drifted on the server"
                );
                warnings.push(
                    Diagnostic::warning(format!(
                        "{}.{} differs on the server",
                        descriptor.kind, field.name
                    ))
                    .with_detail(format!(
                        "The server reports {} but {} was kept. The field cannot change \
                         after creation, so the difference was made outside of this \
                         configuration.",
                        mask_if_sensitive(field, reported),
                        mask_if_sensitive(field, kept)
                    ))
                    .with_attribute(field.name.clone()),
                );
            }
            reconciled
        })
        .collect();

    ReconciledState {
        kind: descriptor.kind.clone(),
        fields,
        warnings,
    }
}

struct Sources<'a> {
    desired: Option<&'a ResourceState>,
    prior: Option<&'a ResourceState>,
    phase: Phase,
}

impl Sources<'_> {
    /// The locally known value for a field, by phase.
    fn fallback(&self, field: &FieldSpec) -> Option<(FieldValue, Provenance)> {
        let order: &[(Option<&ResourceState>, Provenance)] = match self.phase {
            Phase::Create => &[(self.desired, Provenance::Desired)],
            Phase::Read => &[(self.prior, Provenance::Prior)],
            Phase::Update => &[
                (self.desired, Provenance::Desired),
                (self.prior, Provenance::Prior),
            ],
        };
        order.iter().find_map(|(state, provenance)| {
            state
                .and_then(|s| s.get(&field.name))
                .filter(|value| !(field.sensitive && is_masked(value)))
                .map(|value| (value.clone(), *provenance))
        })
    }

    /// Prior, else desired. Used by immutable fields in every phase.
    fn original(&self, field: &FieldSpec) -> Option<(FieldValue, Provenance)> {
        [
            (self.prior, Provenance::Prior),
            (self.desired, Provenance::Desired),
        ]
        .into_iter()
        .find_map(|(state, provenance)| {
            state
                .and_then(|s| s.get(&field.name))
                .filter(|value| !(field.sensitive && is_masked(value)))
                .map(|value| (value.clone(), provenance))
        })
    }
}

fn reconcile_field(
    field: &FieldSpec,
    sources: &Sources<'_>,
    server: Option<&FieldValue>,
) -> ReconciledField {
    let mut masked = false;
    let mut server = server.cloned();

    if field.sensitive {
        if server.as_ref().is_some_and(is_masked) {
            let (value, provenance) = split(sources.fallback(field));
            return ReconciledField {
                name: field.name.clone(),
                value,
                provenance,
                drift_detected: false,
                masked: true,
            };
        }
        if let Some(FieldValue::StringMap(entries)) = &server {
            if entries.values().any(|v| v == MASKED_SENTINEL) {
                masked = true;
                server = Some(FieldValue::StringMap(unmask_entries(
                    entries,
                    sources.fallback(field),
                )));
            }
        }
    }

    let (value, provenance, drift_detected) = match field.merge_policy {
        MergePolicy::Immutable => match sources.original(field) {
            Some((value, provenance)) => {
                let drift = !masked
                    && server
                        .as_ref()
                        .is_some_and(|reported| materially_differs(field.kind, reported, &value));
                (Some(value), provenance, drift)
            },
            // Nothing was ever submitted, so the server's default is the original value.
            None => match server {
                Some(value) => (Some(value), Provenance::Server, false),
                None => (None, Provenance::Unset, false),
            },
        },
        MergePolicy::ServerAuthoritative => match server {
            Some(value) => (Some(value), Provenance::Server, false),
            None => {
                let (value, provenance) = split(sources.fallback(field));
                (value, provenance, false)
            },
        },
        MergePolicy::PreservePlannedIfServerEmpty => match server {
            Some(value) if !value.is_empty() => (Some(value), Provenance::Server, false),
            empty => match sources.fallback(field) {
                Some((value, provenance)) => (Some(value), provenance, false),
                None => match empty {
                    Some(value) => (Some(value), Provenance::Server, false),
                    None => (None, Provenance::Unset, false),
                },
            },
        },
    };

    ReconciledField {
        name: field.name.clone(),
        value,
        provenance,
        drift_detected,
        masked,
    }
}

fn split(found: Option<(FieldValue, Provenance)>) -> (Option<FieldValue>, Provenance) {
    match found {
        Some((value, provenance)) => (Some(value), provenance),
        None => (None, Provenance::Unset),
    }
}

/// A masked list element cannot be matched to a known element, so the whole
/// list counts as masked.
fn is_masked(value: &FieldValue) -> bool {
    match value {
        FieldValue::String(s) => s == MASKED_SENTINEL,
        FieldValue::StringList(items) => items.iter().any(|item| item == MASKED_SENTINEL),
        _ => false,
    }
}

/// Replace masked map entries with the locally known entry; entries with no
/// known value are dropped.
fn unmask_entries(
    server: &BTreeMap<String, String>,
    known: Option<(FieldValue, Provenance)>,
) -> BTreeMap<String, String> {
    let known = known.and_then(|(value, _)| value.as_map().cloned());
    server
        .iter()
        .filter_map(|(key, value)| {
            if value != MASKED_SENTINEL {
                return Some((key.clone(), value.clone()));
            }
            known
                .as_ref()
                .and_then(|k| k.get(key))
                .filter(|v| v.as_str() != MASKED_SENTINEL)
                .map(|v| (key.clone(), v.clone()))
        })
        .collect()
}

fn materially_differs(kind: FieldKind, reported: &FieldValue, kept: &FieldValue) -> bool {
    match (kind, reported, kept) {
        (FieldKind::StringList, FieldValue::StringList(a), FieldValue::StringList(b)) => {
            let mut a = a.clone();
            let mut b = b.clone();
            a.sort();
            b.sort();
            a != b
        },
        _ => reported != kept,
    }
}

fn mask_if_sensitive(field: &FieldSpec, rendered: String) -> String {
    if field.sensitive {
        "(sensitive value)".to_string()
    } else {
        rendered
    }
}

/// Format a child resource's import identifier.
pub fn format_composite_id(parent: u64, child: u64) -> String {
    format!("{}.{}", parent, child)
}

/// Parse a `"<parentID>.<childID>"` import identifier.
pub fn parse_composite_id(id: &str) -> Result<(u64, u64), ProviderError> {
    let segments: Vec<&str> = id.split('.').collect();
    if segments.len() != 2 {
        return Err(ProviderError::InvalidImportId(format!(
            "expected '<parentID>.<childID>', got {} segment(s) in \"{}\"",
            segments.len(),
            id
        )));
    }
    let parent = parse_segment(segments[0], "parent ID", id)?;
    let child = parse_segment(segments[1], "child ID", id)?;
    Ok((parent, child))
}

/// Parse a top-level resource's single-segment import identifier.
pub fn parse_id(id: &str) -> Result<u64, ProviderError> {
    if id.contains('.') {
        return Err(ProviderError::InvalidImportId(format!(
            "expected a single '<ID>' segment, got {} segment(s) in \"{}\"",
            id.split('.').count(),
            id
        )));
    }
    parse_segment(id, "ID", id)
}

fn parse_segment(segment: &str, position: &str, input: &str) -> Result<u64, ProviderError> {
    if segment.is_empty() {
        return Err(ProviderError::InvalidImportId(format!(
            "{} segment is empty in \"{}\"",
            position, input
        )));
    }
    if !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProviderError::InvalidImportId(format!(
            "{} segment \"{}\" in \"{}\" is not a non-negative integer",
            position, segment, input
        )));
    }
    segment.parse::<u64>().map_err(|err| {
        ProviderError::InvalidImportId(format!(
            "{} segment \"{}\" in \"{}\" is out of range: {}",
            position, segment, input, err
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;

    fn service() -> ResourceDescriptor {
        ResourceDescriptor::new("service", "/projects/{parent}/services")
            .with_parent("project_id")
            .with_field(FieldSpec::integer("id").computed())
            .with_field(FieldSpec::string("type").immutable())
            .with_field(FieldSpec::string("command").preserve_planned())
            .with_field(FieldSpec::string("memory").preserve_planned())
            .with_field(FieldSpec::integer("replicas"))
            .with_field(FieldSpec::string("region").immutable())
            .with_field(FieldSpec::string("build_secret").sensitive())
            .with_field(FieldSpec::string_map("env").sensitive().preserve_planned())
            .with_field(FieldSpec::string_list("domains").immutable())
            .with_field(FieldSpec::string_list("ssh_keys").sensitive())
    }

    fn state(pairs: &[(&str, FieldValue)]) -> ResourceState {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn masked_secret_keeps_prior_value() {
        let prior = state(&[("build_secret", "real-secret".into())]);
        let server = state(&[("build_secret", MASKED_SENTINEL.into())]);

        let out = reconcile(&service(), None, Some(&prior), &server, Phase::Read);
        assert_eq!(out.value("build_secret"), Some(&"real-secret".into()));
        assert_eq!(out.provenance("build_secret"), Some(Provenance::Prior));
        assert!(out.field("build_secret").unwrap().masked);
    }

    #[test]
    fn masked_secret_on_create_keeps_desired_value() {
        let desired = state(&[("build_secret", "hunter2".into())]);
        let server = state(&[("build_secret", MASKED_SENTINEL.into())]);

        let out = reconcile(&service(), Some(&desired), None, &server, Phase::Create);
        assert_eq!(out.value("build_secret"), Some(&"hunter2".into()));
        assert_eq!(out.provenance("build_secret"), Some(Provenance::Desired));
    }

    #[test]
    fn masked_secret_without_known_value_is_null_not_sentinel() {
        let server = state(&[("build_secret", MASKED_SENTINEL.into())]);
        let out = reconcile(&service(), None, None, &server, Phase::Read);
        assert_eq!(out.value("build_secret"), None);
        assert_eq!(out.provenance("build_secret"), Some(Provenance::Unset));
    }

    #[test]
    fn sentinel_in_prior_state_is_never_reused() {
        let prior = state(&[("build_secret", MASKED_SENTINEL.into())]);
        let server = state(&[("build_secret", MASKED_SENTINEL.into())]);
        let out = reconcile(&service(), None, Some(&prior), &server, Phase::Read);
        assert_eq!(out.value("build_secret"), None);
    }

    #[test]
    fn masked_map_entries_fall_back_per_entry() {
        let prior = state(&[(
            "env",
            FieldValue::StringMap(
                [("DB_PASSWORD", "pw"), ("PORT", "8080")]
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
        )]);
        let server = state(&[(
            "env",
            FieldValue::StringMap(
                [("DB_PASSWORD", MASKED_SENTINEL), ("PORT", "9090"), ("NEW", MASKED_SENTINEL)]
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
        )]);

        let out = reconcile(&service(), None, Some(&prior), &server, Phase::Read);
        let env = out.value("env").and_then(FieldValue::as_map).unwrap();
        assert_eq!(env.get("DB_PASSWORD").map(String::as_str), Some("pw"));
        assert_eq!(env.get("PORT").map(String::as_str), Some("9090"));
        assert!(!env.contains_key("NEW"));
        assert!(out.field("env").unwrap().masked);
    }

    #[test]
    fn wholly_masked_map_keeps_prior_map() {
        let descriptor = service();
        let prior = state(&[(
            "env",
            FieldValue::StringMap([("DB_PASSWORD".to_string(), "pw".to_string())].into()),
        )]);
        let server =
            ResourceState::from_json(&descriptor, &serde_json::json!({"env": MASKED_SENTINEL}))
                .unwrap();

        let out = reconcile(&descriptor, None, Some(&prior), &server, Phase::Read);
        let env = out.value("env").and_then(FieldValue::as_map).unwrap();
        assert_eq!(env.get("DB_PASSWORD").map(String::as_str), Some("pw"));
        assert_eq!(out.provenance("env"), Some(Provenance::Prior));
        assert!(out.field("env").unwrap().masked);
    }

    #[test]
    fn masked_list_element_keeps_whole_known_list() {
        let desired = state(&[(
            "ssh_keys",
            FieldValue::StringList(vec!["ssh-ed25519 AAA".to_string(), "ssh-rsa BBB".to_string()]),
        )]);
        let server = state(&[(
            "ssh_keys",
            FieldValue::StringList(vec![MASKED_SENTINEL.to_string(), "ssh-rsa BBB".to_string()]),
        )]);

        let out = reconcile(&service(), Some(&desired), None, &server, Phase::Create);
        assert_eq!(out.value("ssh_keys"), desired.get("ssh_keys"));
        assert_eq!(out.provenance("ssh_keys"), Some(Provenance::Desired));
        assert!(out.field("ssh_keys").unwrap().masked);
    }

    #[test]
    fn masked_list_without_known_value_is_null() {
        let server = state(&[(
            "ssh_keys",
            FieldValue::StringList(vec![MASKED_SENTINEL.to_string()]),
        )]);
        let out = reconcile(&service(), None, None, &server, Phase::Read);
        assert_eq!(out.value("ssh_keys"), None);
    }

    #[test]
    fn empty_server_value_preserves_desired_on_create() {
        let desired = state(&[("memory", "512Mi".into())]);
        let server = state(&[("memory", "".into())]);

        let out = reconcile(&service(), Some(&desired), None, &server, Phase::Create);
        assert_eq!(out.value("memory"), Some(&"512Mi".into()));
        assert_eq!(out.provenance("memory"), Some(Provenance::Desired));
    }

    #[test]
    fn empty_server_value_preserves_prior_on_read() {
        let prior = state(&[("memory", "512Mi".into())]);
        let server = state(&[("memory", "".into())]);

        let out = reconcile(&service(), None, Some(&prior), &server, Phase::Read);
        assert_eq!(out.value("memory"), Some(&"512Mi".into()));
        assert_eq!(out.provenance("memory"), Some(Provenance::Prior));
    }

    #[test]
    fn update_prefers_desired_then_prior_for_blank_server_values() {
        let prior = state(&[("memory", "512Mi".into()), ("command", "old.sh".into())]);
        let desired = state(&[("memory", "1Gi".into())]);
        let server = state(&[("memory", "".into()), ("command", "".into())]);

        let out = reconcile(&service(), Some(&desired), Some(&prior), &server, Phase::Update);
        assert_eq!(out.value("memory"), Some(&"1Gi".into()));
        assert_eq!(out.provenance("memory"), Some(Provenance::Desired));
        assert_eq!(out.value("command"), Some(&"old.sh".into()));
        assert_eq!(out.provenance("command"), Some(Provenance::Prior));
    }

    #[test]
    fn server_value_overrides_when_non_empty() {
        let prior = state(&[("memory", "512Mi".into())]);
        let server = state(&[("memory", "1Gi".into())]);

        let out = reconcile(&service(), None, Some(&prior), &server, Phase::Read);
        assert_eq!(out.value("memory"), Some(&"1Gi".into()));
        assert_eq!(out.provenance("memory"), Some(Provenance::Server));
    }

    #[test]
    fn server_authoritative_accepts_zero() {
        let prior = state(&[("replicas", 3i64.into())]);
        let server = state(&[("replicas", 0i64.into())]);

        let out = reconcile(&service(), None, Some(&prior), &server, Phase::Read);
        assert_eq!(out.value("replicas"), Some(&FieldValue::Integer(0)));
        assert_eq!(out.provenance("replicas"), Some(Provenance::Server));
    }

    #[test]
    fn server_authoritative_falls_back_when_absent() {
        let desired = state(&[("replicas", 2i64.into())]);
        let out = reconcile(
            &service(),
            Some(&desired),
            None,
            &ResourceState::new(),
            Phase::Create,
        );
        assert_eq!(out.value("replicas"), Some(&FieldValue::Integer(2)));
        assert_eq!(out.provenance("replicas"), Some(Provenance::Desired));
    }

    #[test]
    fn immutable_drift_is_a_warning_and_keeps_prior() {
        let prior = state(&[("region", "eu-west".into())]);
        let server = state(&[("region", "us-east".into())]);

        let out = reconcile(&service(), None, Some(&prior), &server, Phase::Read);
        assert_eq!(out.value("region"), Some(&"eu-west".into()));
        assert_eq!(out.provenance("region"), Some(Provenance::Prior));
        assert_eq!(out.drifted_fields(), vec!["region"]);
        assert_eq!(out.warnings.len(), 1);
        assert!(!out.warnings[0].is_error());
        assert_eq!(out.warnings[0].attribute.as_deref(), Some("region"));
    }

    #[test]
    fn immutable_ignores_desired_changes_on_update() {
        let prior = state(&[("type", "worker".into())]);
        let desired = state(&[("type", "web".into())]);
        let server = state(&[("type", "worker".into())]);

        let out = reconcile(&service(), Some(&desired), Some(&prior), &server, Phase::Update);
        assert_eq!(out.value("type"), Some(&"worker".into()));
        assert!(out.drifted_fields().is_empty());
    }

    #[test]
    fn immutable_list_order_is_not_drift() {
        let prior = state(&[(
            "domains",
            FieldValue::StringList(vec!["a.test".into(), "b.test".into()]),
        )]);
        let server = state(&[(
            "domains",
            FieldValue::StringList(vec!["b.test".into(), "a.test".into()]),
        )]);
        let out = reconcile(&service(), None, Some(&prior), &server, Phase::Read);
        assert!(out.drifted_fields().is_empty());
    }

    #[test]
    fn immutable_adopts_server_default_when_never_set() {
        let server = state(&[("region", "us-east".into())]);
        let out = reconcile(
            &service(),
            Some(&ResourceState::new()),
            None,
            &server,
            Phase::Create,
        );
        assert_eq!(out.value("region"), Some(&"us-east".into()));
        assert_eq!(out.provenance("region"), Some(Provenance::Server));
    }

    #[test]
    fn create_with_blank_server_echo() {
        let desired = state(&[
            ("type", "worker".into()),
            ("command", "run.sh".into()),
            ("memory", "256Mi".into()),
        ]);
        let server = state(&[
            ("id", 11i64.into()),
            ("type", "worker".into()),
            ("command", "run.sh".into()),
            ("memory", "".into()),
        ]);

        let out = reconcile(&service(), Some(&desired), None, &server, Phase::Create);
        assert_eq!(out.value("memory"), Some(&"256Mi".into()));
        assert_eq!(out.value("command"), Some(&"run.sh".into()));
        assert_eq!(out.value("id"), Some(&FieldValue::Integer(11)));
        assert!(out.warnings.is_empty());

        let persisted = out.to_state();
        assert_eq!(persisted.get("memory"), Some(&"256Mi".into()));
        let json = out.to_json();
        assert_eq!(json["memory"], "256Mi");
        assert!(json["region"].is_null());
    }

    #[test]
    fn fields_follow_declaration_order() {
        let out = reconcile(&service(), None, None, &ResourceState::new(), Phase::Read);
        let names: Vec<_> = out.fields.iter().map(|f| f.name.as_str()).collect();
        let declared: Vec<_> = service().fields.iter().map(|f| f.name.clone()).collect();
        assert_eq!(names, declared);
    }

    #[test]
    fn composite_id_round_trip() {
        let samples = [0u64, 1, 7, 42, 1_000_000, u32::MAX as u64, u64::MAX];
        for &a in &samples {
            for &b in &samples {
                assert_eq!(parse_composite_id(&format_composite_id(a, b)).unwrap(), (a, b));
            }
        }
    }

    #[test]
    fn composite_id_rejects_malformed_input() {
        let cases = [
            ("", "got 1 segment(s)"),
            ("12", "got 1 segment(s)"),
            ("1.2.3", "got 3 segment(s)"),
            ("abc.2", "parent ID segment \"abc\""),
            ("1.xyz", "child ID segment \"xyz\""),
            ("1.-2", "child ID segment \"-2\""),
            ("+1.2", "parent ID segment \"+1\""),
            (".2", "parent ID segment is empty"),
            ("1.99999999999999999999", "out of range"),
        ];
        for (input, expected) in cases {
            let err = parse_composite_id(input).unwrap_err();
            assert!(matches!(err, ProviderError::InvalidImportId(_)));
            assert!(err.to_string().contains(expected), "{input}: {err}");
        }
    }

    #[test]
    fn single_id_parsing() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert!(parse_id("4.2").unwrap_err().to_string().contains("2 segment(s)"));
        assert!(parse_id("x").is_err());
        assert!(parse_id("").is_err());
    }
}
