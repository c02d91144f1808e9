//! ECS task definition documents
//!
//! Fields the automation reads or writes are typed; everything else rides
//! along in `extra` so a described definition can be resubmitted without
//! losing settings (serde_json's `preserve_order` keeps the key order).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AutomationError, Result};

/// Server-assigned fields the control plane rejects on registration
pub const ADMIN_FIELDS: [&str; 7] = [
    "taskDefinitionArn",
    "revision",
    "status",
    "requiresAttributes",
    "compatibilities",
    "registeredAt",
    "registeredBy",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_definition_arn: Option<String>,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub container_definitions: Vec<ContainerDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_attributes: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibilities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_by: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One container inside a task definition
///
/// `logConfiguration: null` deserializes to `None` and is never written
/// back, since the control plane rejects an explicit null there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDefinition {
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<KeyValuePair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_configuration: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Environment entry; names are not guaranteed unique
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValuePair {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl KeyValuePair {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl TaskDefinition {
    pub fn from_json(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn container(&self, name: &str) -> Option<&ContainerDefinition> {
        self.container_definitions.iter().find(|c| c.name == name)
    }

    pub fn container_mut(&mut self, name: &str) -> Option<&mut ContainerDefinition> {
        self.container_definitions.iter_mut().find(|c| c.name == name)
    }

    /// The application container (first in the list)
    pub fn primary_container(&self) -> Option<&ContainerDefinition> {
        self.container_definitions.first()
    }

    /// Copy with every server-assigned field removed
    pub fn sanitized(&self) -> TaskDefinition {
        let mut copy = self.clone();
        copy.task_definition_arn = None;
        copy.revision = None;
        copy.status = None;
        copy.requires_attributes = None;
        copy.compatibilities = None;
        copy.registered_at = None;
        copy.registered_by = None;
        for field in ADMIN_FIELDS {
            copy.extra.remove(field);
        }
        copy
    }

    /// Sanitize and validate for `RegisterTaskDefinition`
    pub fn into_registrable(self) -> Result<RegistrableTaskDefinition> {
        let sanitized = self.sanitized();

        if sanitized.family.is_empty() {
            return Err(AutomationError::Validation(
                "task definition has no family".to_string(),
            ));
        }
        if sanitized.container_definitions.is_empty() {
            return Err(AutomationError::Validation(format!(
                "task definition {} has no container definitions",
                sanitized.family
            )));
        }
        if let Some(unnamed) = sanitized
            .container_definitions
            .iter()
            .position(|c| c.name.is_empty() || c.image.is_empty())
        {
            return Err(AutomationError::Validation(format!(
                "container #{} of {} is missing a name or image",
                unnamed, sanitized.family
            )));
        }

        Ok(RegistrableTaskDefinition(sanitized))
    }
}

impl ContainerDefinition {
    /// Overwrite every entry named `name`; append one if none exists
    ///
    /// Returns the number of entries overwritten.
    pub fn set_environment(&mut self, name: &str, value: &str) -> usize {
        let mut overwritten = 0;
        for entry in self.environment.iter_mut().filter(|e| e.name == name) {
            entry.value = value.to_string();
            overwritten += 1;
        }
        if overwritten == 0 {
            self.environment.push(KeyValuePair::new(name, value));
        }
        overwritten
    }

    /// Effective value of an environment variable (last entry wins)
    pub fn environment_value(&self, name: &str) -> Option<&str> {
        self.environment
            .iter()
            .rev()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }
}

/// A sanitized, validated definition; the only input registration accepts
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrableTaskDefinition(TaskDefinition);

impl RegistrableTaskDefinition {
    pub fn family(&self) -> &str {
        &self.0.family
    }

    pub fn definition(&self) -> &TaskDefinition {
        &self.0
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(&self.0)?)
    }
}
