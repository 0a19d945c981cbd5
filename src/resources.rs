//! Built-in resource descriptors.
//!
//! `project` is a top-level resource imported by `"<ID>"`. `service` lives
//! under a project and is imported by `"<projectID>.<serviceID>"`.

use crate::schema::{DescriptorRegistry, FieldSpec, ResourceDescriptor};

/// Kind name of the project resource.
pub const PROJECT: &str = "project";

/// Kind name of the service resource.
pub const SERVICE: &str = "service";

/// Response envelope the platform wraps single resources in.
pub const ENVELOPE: &str = "data";

/// Descriptor for a project.
pub fn project() -> ResourceDescriptor {
    ResourceDescriptor::new(PROJECT, "/projects")
        .with_envelope(ENVELOPE)
        .with_field(FieldSpec::integer("id").computed().with_description("Project ID"))
        .with_field(FieldSpec::string("name").required())
        .with_field(FieldSpec::string("description").preserve_planned())
        .with_field(
            FieldSpec::string("region")
                .immutable()
                .with_description("Region the project is created in; defaults on the server"),
        )
        .with_field(FieldSpec::string("created_at").computed())
}

/// Descriptor for a service.
pub fn service() -> ResourceDescriptor {
    ResourceDescriptor::new(SERVICE, "/projects/{parent}/services")
        .with_parent("project_id")
        .with_envelope(ENVELOPE)
        .with_field(FieldSpec::integer("id").computed().with_description("Service ID"))
        .with_field(
            FieldSpec::integer("project_id")
                .required()
                .immutable()
                .with_description("ID of the owning project"),
        )
        .with_field(FieldSpec::string("name").required())
        .with_field(
            FieldSpec::string("type")
                .required()
                .immutable()
                .with_allowed_values(["web", "worker", "cron"]),
        )
        .with_field(FieldSpec::string("repository").immutable())
        .with_field(FieldSpec::string("default_branch").preserve_planned())
        .with_field(FieldSpec::string("command").preserve_planned())
        .with_field(
            FieldSpec::string("schedule")
                .preserve_planned()
                .with_description("Cron expression; only used by cron services"),
        )
        .with_field(FieldSpec::string("memory").preserve_planned())
        .with_field(FieldSpec::string("cpu").preserve_planned())
        .with_field(FieldSpec::integer("replicas"))
        .with_field(FieldSpec::bool("auto_deploy"))
        .with_field(FieldSpec::string("region").immutable())
        .with_field(FieldSpec::string_list("domains"))
        .with_field(
            FieldSpec::string_map("env")
                .sensitive()
                .preserve_planned()
                .with_description("Environment variables; secret values are masked by the API"),
        )
        .with_field(FieldSpec::string("build_secret").sensitive().preserve_planned())
        .with_field(FieldSpec::string("status").computed())
        .with_field(FieldSpec::string("url").computed())
}

/// Registry with every built-in resource.
pub fn registry() -> DescriptorRegistry {
    DescriptorRegistry::new()
        .with_resource(project())
        .with_resource(service())
}
