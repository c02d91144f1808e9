//! Task definition documents and the ECS SDK model
//!
//! Task definitions travel through the automation as JSON (described
//! revisions, console output). The SDK takes typed builders, so the fields
//! Fargate task definitions use are mapped here in both directions. Keys
//! without a mapping are listed by [`unmapped_keys`] and not registered.

use aws_sdk_ecs::error::BuildError;
use aws_sdk_ecs::operation::register_task_definition::builders::RegisterTaskDefinitionFluentBuilder;
use aws_sdk_ecs::types as ecs;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use super::types::{CapacityProviderStrategyItem, ServiceDescriptor};
use crate::error::{AutomationError, Result};

const TASK_KEYS: &[&str] = &[
    "family",
    "taskRoleArn",
    "executionRoleArn",
    "networkMode",
    "containerDefinitions",
    "volumes",
    "requiresCompatibilities",
    "cpu",
    "memory",
    "runtimePlatform",
    "pidMode",
    "ipcMode",
    "ephemeralStorage",
    "tags",
];

const CONTAINER_KEYS: &[&str] = &[
    "name",
    "image",
    "cpu",
    "memory",
    "memoryReservation",
    "essential",
    "entryPoint",
    "command",
    "workingDirectory",
    "user",
    "environment",
    "secrets",
    "portMappings",
    "mountPoints",
    "volumesFrom",
    "logConfiguration",
    "linuxParameters",
    "dependsOn",
    "readonlyRootFilesystem",
    "stopTimeout",
    "startTimeout",
    "healthCheck",
    "dockerLabels",
];

/// Non-empty keys of a registration document that have no SDK mapping
pub fn unmapped_keys(document: &Value) -> Vec<String> {
    let mut unmapped = extra_keys(document, TASK_KEYS, "");
    for (index, container) in objects(document, "containerDefinitions").enumerate() {
        let prefix = format!("containerDefinitions[{}].", index);
        unmapped.extend(extra_keys(container, CONTAINER_KEYS, &prefix));
    }
    unmapped
}

fn extra_keys(value: &Value, known: &[&str], prefix: &str) -> Vec<String> {
    value
        .as_object()
        .map(|object| {
            object
                .iter()
                .filter(|(key, value)| !known.contains(&key.as_str()) && !is_empty(value))
                .map(|(key, _)| format!("{}{}", prefix, key))
                .collect()
        })
        .unwrap_or_default()
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

fn text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn int(value: &Value, key: &str) -> Option<i32> {
    value
        .get(key)?
        .as_i64()
        .and_then(|n| i32::try_from(n).ok())
}

fn flag(value: &Value, key: &str) -> Option<bool> {
    value.get(key)?.as_bool()
}

fn strings(value: &Value, key: &str) -> Option<Vec<String>> {
    let items = value.get(key)?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
    )
}

fn string_map(value: &Value, key: &str) -> Option<HashMap<String, String>> {
    let fields = value.get(key)?.as_object()?;
    Some(
        fields
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
    )
}

fn object<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.get(key).filter(|v| v.is_object())
}

fn objects<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value.get(key).and_then(Value::as_array).into_iter().flatten()
}

fn list<T>(value: &Value, key: &str, convert: impl Fn(&Value) -> Result<T>) -> Result<Option<Vec<T>>> {
    if value.get(key).and_then(Value::as_array).is_none() {
        return Ok(None);
    }
    objects(value, key).map(convert).collect::<Result<Vec<_>>>().map(Some)
}

fn invalid(err: BuildError) -> AutomationError {
    AutomationError::Validation(err.to_string())
}

/// Fill a `RegisterTaskDefinition` request from a sanitized document
pub fn registration_request(
    request: RegisterTaskDefinitionFluentBuilder,
    document: &Value,
) -> Result<RegisterTaskDefinitionFluentBuilder> {
    let runtime_platform = object(document, "runtimePlatform").map(|platform| {
        ecs::RuntimePlatform::builder()
            .set_cpu_architecture(
                text(platform, "cpuArchitecture").map(|a| ecs::CpuArchitecture::from(a.as_str())),
            )
            .set_operating_system_family(
                text(platform, "operatingSystemFamily").map(|f| ecs::OsFamily::from(f.as_str())),
            )
            .build()
    });

    let ephemeral_storage = object(document, "ephemeralStorage").map(|storage| {
        ecs::EphemeralStorage::builder()
            .set_size_in_gib(int(storage, "sizeInGiB"))
            .build()
    });

    let compatibilities = strings(document, "requiresCompatibilities").map(|items| {
        items
            .iter()
            .map(|c| ecs::Compatibility::from(c.as_str()))
            .collect()
    });

    Ok(request
        .set_family(text(document, "family"))
        .set_task_role_arn(text(document, "taskRoleArn"))
        .set_execution_role_arn(text(document, "executionRoleArn"))
        .set_network_mode(text(document, "networkMode").map(|m| ecs::NetworkMode::from(m.as_str())))
        .set_container_definitions(list(document, "containerDefinitions", container_definition)?)
        .set_volumes(list(document, "volumes", |v| Ok(volume(v)))?)
        .set_requires_compatibilities(compatibilities)
        .set_cpu(text(document, "cpu"))
        .set_memory(text(document, "memory"))
        .set_runtime_platform(runtime_platform)
        .set_pid_mode(text(document, "pidMode").map(|m| ecs::PidMode::from(m.as_str())))
        .set_ipc_mode(text(document, "ipcMode").map(|m| ecs::IpcMode::from(m.as_str())))
        .set_ephemeral_storage(ephemeral_storage)
        .set_tags(list(document, "tags", |t| Ok(tag(t)))?))
}

pub fn container_definition(value: &Value) -> Result<ecs::ContainerDefinition> {
    let log_configuration = object(value, "logConfiguration")
        .map(log_configuration)
        .transpose()?;
    let health_check = object(value, "healthCheck").map(health_check).transpose()?;

    Ok(ecs::ContainerDefinition::builder()
        .set_name(text(value, "name"))
        .set_image(text(value, "image"))
        .set_cpu(int(value, "cpu"))
        .set_memory(int(value, "memory"))
        .set_memory_reservation(int(value, "memoryReservation"))
        .set_essential(flag(value, "essential"))
        .set_entry_point(strings(value, "entryPoint"))
        .set_command(strings(value, "command"))
        .set_working_directory(text(value, "workingDirectory"))
        .set_user(text(value, "user"))
        .set_environment(list(value, "environment", |e| Ok(key_value_pair(e)))?)
        .set_secrets(list(value, "secrets", secret)?)
        .set_port_mappings(list(value, "portMappings", |p| Ok(port_mapping(p)))?)
        .set_mount_points(list(value, "mountPoints", |m| Ok(mount_point(m)))?)
        .set_volumes_from(list(value, "volumesFrom", |v| Ok(volume_from(v)))?)
        .set_log_configuration(log_configuration)
        .set_linux_parameters(object(value, "linuxParameters").map(linux_parameters))
        .set_depends_on(list(value, "dependsOn", container_dependency)?)
        .set_readonly_root_filesystem(flag(value, "readonlyRootFilesystem"))
        .set_stop_timeout(int(value, "stopTimeout"))
        .set_start_timeout(int(value, "startTimeout"))
        .set_health_check(health_check)
        .set_docker_labels(string_map(value, "dockerLabels"))
        .build())
}

fn key_value_pair(value: &Value) -> ecs::KeyValuePair {
    ecs::KeyValuePair::builder()
        .set_name(text(value, "name"))
        .set_value(text(value, "value"))
        .build()
}

fn secret(value: &Value) -> Result<ecs::Secret> {
    ecs::Secret::builder()
        .set_name(text(value, "name"))
        .set_value_from(text(value, "valueFrom"))
        .build()
        .map_err(invalid)
}

fn port_mapping(value: &Value) -> ecs::PortMapping {
    ecs::PortMapping::builder()
        .set_container_port(int(value, "containerPort"))
        .set_host_port(int(value, "hostPort"))
        .set_protocol(text(value, "protocol").map(|p| ecs::TransportProtocol::from(p.as_str())))
        .set_name(text(value, "name"))
        .set_app_protocol(
            text(value, "appProtocol").map(|p| ecs::ApplicationProtocol::from(p.as_str())),
        )
        .build()
}

fn mount_point(value: &Value) -> ecs::MountPoint {
    ecs::MountPoint::builder()
        .set_source_volume(text(value, "sourceVolume"))
        .set_container_path(text(value, "containerPath"))
        .set_read_only(flag(value, "readOnly"))
        .build()
}

fn volume_from(value: &Value) -> ecs::VolumeFrom {
    ecs::VolumeFrom::builder()
        .set_source_container(text(value, "sourceContainer"))
        .set_read_only(flag(value, "readOnly"))
        .build()
}

fn log_configuration(value: &Value) -> Result<ecs::LogConfiguration> {
    ecs::LogConfiguration::builder()
        .set_log_driver(text(value, "logDriver").map(|d| ecs::LogDriver::from(d.as_str())))
        .set_options(string_map(value, "options"))
        .build()
        .map_err(invalid)
}

fn linux_parameters(value: &Value) -> ecs::LinuxParameters {
    let capabilities = object(value, "capabilities").map(|caps| {
        ecs::KernelCapabilities::builder()
            .set_add(strings(caps, "add"))
            .set_drop(strings(caps, "drop"))
            .build()
    });

    ecs::LinuxParameters::builder()
        .set_capabilities(capabilities)
        .set_init_process_enabled(flag(value, "initProcessEnabled"))
        .build()
}

fn container_dependency(value: &Value) -> Result<ecs::ContainerDependency> {
    ecs::ContainerDependency::builder()
        .set_container_name(text(value, "containerName"))
        .set_condition(text(value, "condition").map(|c| ecs::ContainerCondition::from(c.as_str())))
        .build()
        .map_err(invalid)
}

fn health_check(value: &Value) -> Result<ecs::HealthCheck> {
    ecs::HealthCheck::builder()
        .set_command(strings(value, "command"))
        .set_interval(int(value, "interval"))
        .set_timeout(int(value, "timeout"))
        .set_retries(int(value, "retries"))
        .set_start_period(int(value, "startPeriod"))
        .build()
        .map_err(invalid)
}

fn volume(value: &Value) -> ecs::Volume {
    let host = object(value, "host").map(|host| {
        ecs::HostVolumeProperties::builder()
            .set_source_path(text(host, "sourcePath"))
            .build()
    });

    ecs::Volume::builder()
        .set_name(text(value, "name"))
        .set_host(host)
        .build()
}

fn tag(value: &Value) -> ecs::Tag {
    ecs::Tag::builder()
        .set_key(text(value, "key"))
        .set_value(text(value, "value"))
        .build()
}

fn put<V: Into<Value>>(doc: &mut Map<String, Value>, key: &str, value: Option<V>) {
    if let Some(value) = value {
        doc.insert(key.to_string(), value.into());
    }
}

fn put_list(doc: &mut Map<String, Value>, key: &str, items: Vec<Value>) {
    if !items.is_empty() {
        doc.insert(key.to_string(), Value::Array(items));
    }
}

fn string_values(items: &[String]) -> Vec<Value> {
    items.iter().map(|s| Value::String(s.clone())).collect()
}

/// Described task definition as a JSON document
pub fn task_definition_document(definition: &ecs::TaskDefinition) -> Value {
    let mut doc = Map::new();
    put(&mut doc, "taskDefinitionArn", definition.task_definition_arn());
    put(&mut doc, "family", definition.family());
    put(&mut doc, "taskRoleArn", definition.task_role_arn());
    put(&mut doc, "executionRoleArn", definition.execution_role_arn());
    put(&mut doc, "networkMode", definition.network_mode().map(|m| m.as_str()));
    doc.insert(
        "containerDefinitions".to_string(),
        Value::Array(
            definition
                .container_definitions()
                .iter()
                .map(container_document)
                .collect(),
        ),
    );
    doc.insert("revision".to_string(), json!(definition.revision()));
    put_list(
        &mut doc,
        "volumes",
        definition.volumes().iter().map(volume_document).collect(),
    );
    put(&mut doc, "status", definition.status().map(|s| s.as_str()));
    put_list(
        &mut doc,
        "compatibilities",
        definition
            .compatibilities()
            .iter()
            .map(|c| json!(c.as_str()))
            .collect(),
    );
    put_list(
        &mut doc,
        "requiresCompatibilities",
        definition
            .requires_compatibilities()
            .iter()
            .map(|c| json!(c.as_str()))
            .collect(),
    );
    put(&mut doc, "cpu", definition.cpu());
    put(&mut doc, "memory", definition.memory());
    if let Some(platform) = definition.runtime_platform() {
        let mut platform_doc = Map::new();
        put(&mut platform_doc, "cpuArchitecture", platform.cpu_architecture().map(|a| a.as_str()));
        put(
            &mut platform_doc,
            "operatingSystemFamily",
            platform.operating_system_family().map(|f| f.as_str()),
        );
        doc.insert("runtimePlatform".to_string(), Value::Object(platform_doc));
    }
    put(&mut doc, "pidMode", definition.pid_mode().map(|m| m.as_str()));
    put(&mut doc, "ipcMode", definition.ipc_mode().map(|m| m.as_str()));
    if let Some(storage) = definition.ephemeral_storage() {
        doc.insert(
            "ephemeralStorage".to_string(),
            json!({ "sizeInGiB": storage.size_in_gib() }),
        );
    }
    put(&mut doc, "registeredAt", definition.registered_at().map(|at| at.secs()));
    put(&mut doc, "registeredBy", definition.registered_by());
    Value::Object(doc)
}

fn container_document(container: &ecs::ContainerDefinition) -> Value {
    let mut doc = Map::new();
    put(&mut doc, "name", container.name());
    put(&mut doc, "image", container.image());
    doc.insert("cpu".to_string(), json!(container.cpu()));
    put(&mut doc, "memory", container.memory());
    put(&mut doc, "memoryReservation", container.memory_reservation());
    put(&mut doc, "essential", container.essential());
    put_list(&mut doc, "entryPoint", string_values(container.entry_point()));
    put_list(&mut doc, "command", string_values(container.command()));
    put(&mut doc, "workingDirectory", container.working_directory());
    put(&mut doc, "user", container.user());
    put_list(
        &mut doc,
        "environment",
        container
            .environment()
            .iter()
            .map(|e| json!({ "name": e.name(), "value": e.value() }))
            .collect(),
    );
    put_list(
        &mut doc,
        "secrets",
        container
            .secrets()
            .iter()
            .map(|s| json!({ "name": s.name(), "valueFrom": s.value_from() }))
            .collect(),
    );
    put_list(
        &mut doc,
        "portMappings",
        container
            .port_mappings()
            .iter()
            .map(port_mapping_document)
            .collect(),
    );
    put_list(
        &mut doc,
        "mountPoints",
        container
            .mount_points()
            .iter()
            .map(|m| {
                let mut mount = Map::new();
                put(&mut mount, "sourceVolume", m.source_volume());
                put(&mut mount, "containerPath", m.container_path());
                put(&mut mount, "readOnly", m.read_only());
                Value::Object(mount)
            })
            .collect(),
    );
    put_list(
        &mut doc,
        "volumesFrom",
        container
            .volumes_from()
            .iter()
            .map(|v| {
                let mut from = Map::new();
                put(&mut from, "sourceContainer", v.source_container());
                put(&mut from, "readOnly", v.read_only());
                Value::Object(from)
            })
            .collect(),
    );
    if let Some(log) = container.log_configuration() {
        let mut log_doc = Map::new();
        log_doc.insert("logDriver".to_string(), json!(log.log_driver().as_str()));
        if let Some(options) = log.options() {
            log_doc.insert("options".to_string(), json!(options));
        }
        doc.insert("logConfiguration".to_string(), Value::Object(log_doc));
    }
    if let Some(linux) = container.linux_parameters() {
        let mut linux_doc = Map::new();
        if let Some(caps) = linux.capabilities() {
            let mut caps_doc = Map::new();
            put_list(&mut caps_doc, "add", string_values(caps.add()));
            put_list(&mut caps_doc, "drop", string_values(caps.drop()));
            linux_doc.insert("capabilities".to_string(), Value::Object(caps_doc));
        }
        put(&mut linux_doc, "initProcessEnabled", linux.init_process_enabled());
        doc.insert("linuxParameters".to_string(), Value::Object(linux_doc));
    }
    put_list(
        &mut doc,
        "dependsOn",
        container
            .depends_on()
            .iter()
            .map(|d| json!({ "containerName": d.container_name(), "condition": d.condition().as_str() }))
            .collect(),
    );
    put(&mut doc, "readonlyRootFilesystem", container.readonly_root_filesystem());
    put(&mut doc, "stopTimeout", container.stop_timeout());
    put(&mut doc, "startTimeout", container.start_timeout());
    if let Some(check) = container.health_check() {
        let mut check_doc = Map::new();
        check_doc.insert("command".to_string(), Value::Array(string_values(check.command())));
        put(&mut check_doc, "interval", check.interval());
        put(&mut check_doc, "timeout", check.timeout());
        put(&mut check_doc, "retries", check.retries());
        put(&mut check_doc, "startPeriod", check.start_period());
        doc.insert("healthCheck".to_string(), Value::Object(check_doc));
    }
    if let Some(labels) = container.docker_labels() {
        doc.insert("dockerLabels".to_string(), json!(labels));
    }
    Value::Object(doc)
}

fn port_mapping_document(mapping: &ecs::PortMapping) -> Value {
    let mut doc = Map::new();
    put(&mut doc, "containerPort", mapping.container_port());
    put(&mut doc, "hostPort", mapping.host_port());
    put(&mut doc, "protocol", mapping.protocol().map(|p| p.as_str()));
    put(&mut doc, "name", mapping.name());
    put(&mut doc, "appProtocol", mapping.app_protocol().map(|p| p.as_str()));
    Value::Object(doc)
}

fn volume_document(volume: &ecs::Volume) -> Value {
    let mut doc = Map::new();
    put(&mut doc, "name", volume.name());
    if let Some(host) = volume.host() {
        let mut host_doc = Map::new();
        put(&mut host_doc, "sourcePath", host.source_path());
        doc.insert("host".to_string(), Value::Object(host_doc));
    }
    Value::Object(doc)
}

/// Placement-relevant view of a described service
pub fn service_descriptor(service: &ecs::Service) -> ServiceDescriptor {
    ServiceDescriptor {
        service_arn: service.service_arn().unwrap_or_default().to_string(),
        service_name: service.service_name().unwrap_or_default().to_string(),
        cluster_arn: service.cluster_arn().unwrap_or_default().to_string(),
        task_definition: service.task_definition().unwrap_or_default().to_string(),
        launch_type: service.launch_type().map(|l| l.as_str().to_string()),
        capacity_provider_strategy: service
            .capacity_provider_strategy()
            .iter()
            .map(|item| CapacityProviderStrategyItem {
                capacity_provider: item.capacity_provider().to_string(),
                weight: i64::from(item.weight()),
                base: i64::from(item.base()),
            })
            .collect(),
    }
}
