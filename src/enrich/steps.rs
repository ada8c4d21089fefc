//! Enrichment steps
//!
//! Each step takes the service record by value and returns the next record.
//! Steps run in the order of [`PIPELINE`]; later steps read what earlier ones
//! wrote (command composition reads the links built from `depends_on`).

use super::command::{compose_command, resolve_command};
use super::env::{discovery_vars, identity_vars, peer_address, peer_host, push_entry, push_unique};
use super::{EnrichContext, ServiceRecord};
use crate::compose::service::Labels;
use crate::error::{PeerError, Result};
use serde_yaml::{Mapping, Value};

/// Syslog endpoint every container logs to
pub const SYSLOG_ADDRESS: &str = "udp://rsyslog.priv:514";

/// Soft memory reservation for services that declare no limit
pub const DEFAULT_MEM_RESERVATION: &str = "256m";

/// Label marking a service for the discovery and routing layer
pub const DISCOVERY_LABEL: &str = "peer.discovery";

/// Host directory peer volumes are bound under
pub const VOLUME_ROOT: &str = "/mnt/peer";

/// One enrichment step
pub type Step = fn(ServiceRecord, &EnrichContext<'_>) -> Result<ServiceRecord>;

/// Enrichment steps in execution order
pub const PIPELINE: &[(&str, Step)] = &[
    ("logging", inject_logging),
    ("labels", remove_labels),
    ("resources", default_memory),
    ("image", resolve_image),
    ("links", convert_dependencies),
    ("environment", assemble_environment),
    ("volumes", mount_volumes),
    ("additional_fields", overlay_additional_fields),
    ("command", wrap_command),
];

/// Route container output to the central syslog
pub fn inject_logging(mut record: ServiceRecord, ctx: &EnrichContext<'_>) -> Result<ServiceRecord> {
    let mut options = Mapping::new();
    options.insert("syslog-address".into(), SYSLOG_ADDRESS.into());
    options.insert(
        "tag".into(),
        format!("peer-{}-{}", ctx.params.build_name, record.name).into(),
    );

    let mut logging = Mapping::new();
    logging.insert("driver".into(), "syslog".into());
    logging.insert("options".into(), Value::Mapping(options));

    record.definition.insert("logging", Value::Mapping(logging));
    Ok(record)
}

/// Drop `labels`, keeping them on the record for the discovery check
pub fn remove_labels(mut record: ServiceRecord, _ctx: &EnrichContext<'_>) -> Result<ServiceRecord> {
    if let Some(labels) = record.definition.remove("labels") {
        record.labels = Some(Labels::from_value(&record.name, labels)?);
    }
    Ok(record)
}

/// Reserve memory unless a limit or reservation is already declared
pub fn default_memory(mut record: ServiceRecord, _ctx: &EnrichContext<'_>) -> Result<ServiceRecord> {
    if !record.definition.has("mem_limit") && !record.definition.has("mem_reservation") {
        record
            .definition
            .insert("mem_reservation", DEFAULT_MEM_RESERVATION);
        record.reservation_defaulted = true;
    }
    Ok(record)
}

/// Repository part of an image reference, without its tag
fn image_repository(image: &str) -> &str {
    match image.rsplit_once(':') {
        Some((repository, tag)) if !tag.contains('/') => repository,
        _ => image,
    }
}

/// Point locally built images at the supplied image
pub fn resolve_image(mut record: ServiceRecord, ctx: &EnrichContext<'_>) -> Result<ServiceRecord> {
    if record.definition.remove("build").is_some() {
        tracing::debug!("Replacing build of {} with {}", record.name, ctx.params.image_name);
        record
            .definition
            .insert("image", ctx.params.image_name.as_str());
    }

    let marker = ctx.params.compose_image_marker();
    let references_app_image = record
        .definition
        .image()
        .is_some_and(|image| image_repository(image) == marker);
    if references_app_image {
        tracing::debug!("Service {} references the app image {}", record.name, marker);
        record
            .definition
            .insert("image", ctx.params.image_name.as_str());
    }

    Ok(record)
}

/// Move `depends_on` into `links`
pub fn convert_dependencies(mut record: ServiceRecord, _ctx: &EnrichContext<'_>) -> Result<ServiceRecord> {
    let mut links = record.definition.string_list(&record.name, "links")?;
    let dependencies = record.definition.depends_on(&record.name)?;
    record.definition.remove("depends_on");

    for dependency in dependencies {
        if !links.contains(&dependency) {
            links.push(dependency);
        }
    }

    record.definition.set_string_list("links", links);
    Ok(record)
}

/// Build the service environment
pub fn assemble_environment(mut record: ServiceRecord, ctx: &EnrichContext<'_>) -> Result<ServiceRecord> {
    let mut env = record.definition.environment(&record.name)?;

    let additions = match ctx.config.mapped_env_key(&record.name) {
        Some(key) => ctx.config.env_list(key),
        None if record.role.is_primary() => ctx.config.env_list("env"),
        None => Vec::new(),
    };
    for entry in additions {
        push_entry(&mut env, entry);
    }

    for (key, value) in identity_vars(ctx.params) {
        push_unique(&mut env, key, &value);
    }

    if let Some(key) = &ctx.config.service_address_env {
        push_unique(&mut env, key, &peer_address(ctx.params));
    }
    if let Some(key) = &ctx.config.service_host_env {
        push_unique(&mut env, key, &peer_host(ctx.params));
    }

    let exposed = record
        .labels
        .as_ref()
        .is_some_and(|labels| labels.contains_key(DISCOVERY_LABEL));
    if exposed {
        tracing::debug!("Registering {} with discovery", record.name);
        for (key, value) in discovery_vars(ctx.params, &record.name, record.role) {
            push_unique(&mut env, &key, &value);
        }
    }

    record.definition.set_string_list("environment", env);
    Ok(record)
}

/// Bind configured container paths under the deployment directory
pub fn mount_volumes(mut record: ServiceRecord, ctx: &EnrichContext<'_>) -> Result<ServiceRecord> {
    let mut volumes = match record.definition.remove("volumes") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(volumes)) => volumes,
        Some(_) => {
            return Err(PeerError::invalid_field(
                &record.name,
                "volumes",
                "expected a list",
            ))
        }
    };

    for container_path in ctx.config.volume_paths(&record.name) {
        let separator = if container_path.starts_with('/') { "" } else { "/" };
        let host_path = format!(
            "{}/{}/{}{}{}",
            VOLUME_ROOT, ctx.params.build_name, record.name, separator, container_path
        );
        volumes.push(Value::String(format!("{}:{}", host_path, container_path)));
    }

    record.definition.insert("volumes", Value::Sequence(volumes));
    Ok(record)
}

/// Apply configured field overrides on top of everything computed so far
pub fn overlay_additional_fields(mut record: ServiceRecord, ctx: &EnrichContext<'_>) -> Result<ServiceRecord> {
    if let Some(fields) = ctx.config.additional_fields_for(&record.name) {
        for (field, value) in fields {
            let Some(field) = field.as_str() else {
                tracing::warn!("Ignoring non-string field {:?} for {}", field, record.name);
                continue;
            };
            tracing::debug!("Overriding {} on {}", field, record.name);
            record.definition.insert(field, value.clone());
        }
    }

    settle_memory(ensure_sequences(record)?)
}

/// Drop the defaulted reservation once an override declares a limit
fn settle_memory(mut record: ServiceRecord) -> Result<ServiceRecord> {
    let reservation_is_default = record.reservation_defaulted
        && record.definition.get("mem_reservation") == Some(&Value::from(DEFAULT_MEM_RESERVATION));
    if reservation_is_default && record.definition.has("mem_limit") {
        tracing::debug!("Dropping default reservation of {} for its mem_limit", record.name);
        record.definition.remove("mem_reservation");
        record.reservation_defaulted = false;
    }
    Ok(record)
}

/// Re-establish list-valued `environment`, `links` and `volumes`
fn ensure_sequences(mut record: ServiceRecord) -> Result<ServiceRecord> {
    let environment = record.definition.environment(&record.name)?;
    record.definition.set_string_list("environment", environment);

    for field in ["links", "volumes"] {
        match record.definition.get(field) {
            Some(Value::Sequence(_)) => {}
            None | Some(Value::Null) => {
                record.definition.insert(field, Value::Sequence(Vec::new()));
            }
            Some(_) => {
                return Err(PeerError::invalid_field(&record.name, field, "expected a list"));
            }
        }
    }

    Ok(record)
}

/// Wrap the start command with the injected preparation steps
pub fn wrap_command(mut record: ServiceRecord, ctx: &EnrichContext<'_>) -> Result<ServiceRecord> {
    let command = resolve_command(
        &record.name,
        &record.definition,
        record.role,
        ctx.default_command,
    )?;

    let Some(command) = command else {
        tracing::debug!("No command resolved for {}", record.name);
        return Ok(record);
    };

    let links = record.definition.string_list(&record.name, "links")?;
    let composed = compose_command(&command, record.role, &links)?;
    record.definition.set_string_list("command", composed);
    Ok(record)
}
