//! AWS SDK clients for Secrets Manager and ECS
//!
//! Credentials come from the default provider chain (environment, profile,
//! task or instance role); only the region is taken from configuration.
//! Missing resources arrive as typed service errors and are mapped to
//! [`AutomationError::NotFound`].

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ecs::error::{DisplayErrorContext, SdkError};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::ecs_document;
use super::task_definition::{RegistrableTaskDefinition, TaskDefinition};
use super::types::ServiceDescriptor;
use super::{ContainerOrchestrator, SecretVault};
use crate::error::{AutomationError, Result};

/// Secrets Manager and ECS clients sharing one SDK configuration
#[derive(Debug, Clone)]
pub struct AwsControlPlane {
    secrets: aws_sdk_secretsmanager::Client,
    ecs: aws_sdk_ecs::Client,
}

impl AwsControlPlane {
    /// Load the shared SDK configuration for `region`
    pub async fn new(region: &str) -> Self {
        debug!(region = %region, "Initializing AWS clients");

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Self {
            secrets: aws_sdk_secretsmanager::Client::new(&config),
            ecs: aws_sdk_ecs::Client::new(&config),
        }
    }
}

/// Convert an SDK failure, treating the operation's not-found variants as
/// [`AutomationError::NotFound`]
fn sdk_error<E, R>(operation: &str, err: SdkError<E, R>, not_found: impl FnOnce(&E) -> bool) -> AutomationError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let missing = err.as_service_error().is_some_and(not_found);
    let message = DisplayErrorContext(&err).to_string();

    if missing {
        AutomationError::NotFound(format!("{}: {}", operation, message))
    } else {
        AutomationError::Aws {
            operation: operation.to_string(),
            message,
        }
    }
}

#[async_trait]
impl SecretVault for AwsControlPlane {
    async fn get_secret_string(&self, name: &str) -> Result<String> {
        let output = self
            .secrets
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .map_err(|e| sdk_error("GetSecretValue", e, |e| e.is_resource_not_found_exception()))?;

        output
            .secret_string()
            .map(str::to_string)
            .ok_or_else(|| AutomationError::Validation(format!("secret {} has no SecretString", name)))
    }

    async fn put_secret_value(&self, name: &str, value: &str) -> Result<()> {
        self.secrets
            .put_secret_value()
            .secret_id(name)
            .secret_string(value)
            .send()
            .await
            .map_err(|e| sdk_error("PutSecretValue", e, |e| e.is_resource_not_found_exception()))?;
        Ok(())
    }

    async fn create_secret(&self, name: &str, value: &str, description: &str) -> Result<()> {
        self.secrets
            .create_secret()
            .name(name)
            .secret_string(value)
            .description(description)
            .send()
            .await
            .map_err(|e| sdk_error("CreateSecret", e, |_| false))?;
        Ok(())
    }
}

#[async_trait]
impl ContainerOrchestrator for AwsControlPlane {
    async fn list_clusters(&self) -> Result<Vec<String>> {
        let mut pages = self.ecs.list_clusters().into_paginator().items().send();
        let mut clusters = Vec::new();
        while let Some(arn) = pages.next().await {
            clusters.push(arn.map_err(|e| sdk_error("ListClusters", e, |_| false))?);
        }
        Ok(clusters)
    }

    async fn list_services(&self, cluster: &str) -> Result<Vec<String>> {
        let mut pages = self
            .ecs
            .list_services()
            .cluster(cluster)
            .into_paginator()
            .items()
            .send();
        let mut services = Vec::new();
        while let Some(arn) = pages.next().await {
            services.push(
                arn.map_err(|e| sdk_error("ListServices", e, |e| e.is_cluster_not_found_exception()))?,
            );
        }
        Ok(services)
    }

    async fn describe_service(&self, cluster: &str, service: &str) -> Result<ServiceDescriptor> {
        let output = self
            .ecs
            .describe_services()
            .cluster(cluster)
            .services(service)
            .send()
            .await
            .map_err(|e| sdk_error("DescribeServices", e, |e| e.is_cluster_not_found_exception()))?;

        match output.services().first() {
            Some(found) => Ok(ecs_document::service_descriptor(found)),
            None => {
                let reason = output
                    .failures()
                    .first()
                    .and_then(|failure| failure.reason())
                    .unwrap_or("MISSING");
                Err(AutomationError::NotFound(format!(
                    "service {} in cluster {} ({})",
                    service, cluster, reason
                )))
            }
        }
    }

    async fn describe_task_definition(&self, task_definition: &str) -> Result<TaskDefinition> {
        let output = self
            .ecs
            .describe_task_definition()
            .task_definition(task_definition)
            .send()
            .await
            .map_err(|e| sdk_error("DescribeTaskDefinition", e, |_| false))?;

        match output.task_definition() {
            Some(described) => TaskDefinition::from_json(ecs_document::task_definition_document(described)),
            None => Err(AutomationError::NotFound(format!(
                "task definition {}",
                task_definition
            ))),
        }
    }

    async fn register_task_definition(
        &self,
        task_definition: &RegistrableTaskDefinition,
    ) -> Result<String> {
        let document = task_definition.to_json()?;

        let unmapped = ecs_document::unmapped_keys(&document);
        if !unmapped.is_empty() {
            warn!(
                family = %task_definition.family(),
                fields = ?unmapped,
                "Task definition fields not carried over to the new revision"
            );
        }

        let request = ecs_document::registration_request(self.ecs.register_task_definition(), &document)?;
        let output = request
            .send()
            .await
            .map_err(|e| sdk_error("RegisterTaskDefinition", e, |_| false))?;

        output
            .task_definition()
            .and_then(|registered| registered.task_definition_arn())
            .map(str::to_string)
            .ok_or_else(|| {
                AutomationError::Validation(format!(
                    "registration of {} returned no ARN",
                    task_definition.family()
                ))
            })
    }

    async fn update_service(&self, cluster: &str, service: &str, task_definition: &str) -> Result<Value> {
        let output = self
            .ecs
            .update_service()
            .cluster(cluster)
            .service(service)
            .task_definition(task_definition)
            .send()
            .await
            .map_err(|e| {
                sdk_error("UpdateService", e, |e| {
                    e.is_service_not_found_exception() || e.is_cluster_not_found_exception()
                })
            })?;

        Ok(output
            .service()
            .map(|updated| {
                json!({
                    "serviceArn": updated.service_arn(),
                    "taskDefinition": updated.task_definition(),
                    "status": updated.status(),
                })
            })
            .unwrap_or(Value::Null))
    }
}
