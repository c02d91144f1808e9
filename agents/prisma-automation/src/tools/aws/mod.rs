//! AWS control planes
//!
//! Secrets Manager and ECS are reached through two narrow traits so the
//! agents never depend on how the calls are made. [`AwsControlPlane`] is the
//! SDK-backed production implementation.

pub mod ecs_document;
pub mod sdk;
pub mod task_definition;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use sdk::AwsControlPlane;
pub use task_definition::{
    ContainerDefinition, KeyValuePair, RegistrableTaskDefinition, TaskDefinition, ADMIN_FIELDS,
};
pub use types::{CapacityProviderStrategyItem, ServiceDescriptor};

/// Key-value secret vault
#[async_trait]
pub trait SecretVault: Send + Sync {
    /// `SecretString` of the current version
    async fn get_secret_string(&self, name: &str) -> Result<String>;

    /// Store a new version of an existing secret; `NotFound` if absent
    async fn put_secret_value(&self, name: &str, value: &str) -> Result<()>;

    /// Create a secret with an initial value
    async fn create_secret(&self, name: &str, value: &str, description: &str) -> Result<()>;
}

/// Container orchestration control plane
#[async_trait]
pub trait ContainerOrchestrator: Send + Sync {
    async fn list_clusters(&self) -> Result<Vec<String>>;

    async fn list_services(&self, cluster: &str) -> Result<Vec<String>>;

    async fn describe_service(&self, cluster: &str, service: &str) -> Result<ServiceDescriptor>;

    async fn describe_task_definition(&self, task_definition: &str) -> Result<TaskDefinition>;

    /// Register and return the new revision's ARN
    async fn register_task_definition(&self, task_definition: &RegistrableTaskDefinition)
        -> Result<String>;

    /// Point the service at a task definition revision
    async fn update_service(&self, cluster: &str, service: &str, task_definition: &str)
        -> Result<Value>;
}
