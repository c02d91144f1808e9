//! Fleet Inventory Walker
//!
//! Clusters, then services per cluster, then each service's description and
//! current task definition. Lookups that fail are logged and come back
//! empty so the walk moves on to the next item.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::tools::aws::{ContainerOrchestrator, ServiceDescriptor, TaskDefinition};

pub struct FleetInventoryWalker<'a> {
    orchestrator: &'a dyn ContainerOrchestrator,
}

impl<'a> FleetInventoryWalker<'a> {
    pub fn new(orchestrator: &'a dyn ContainerOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Cluster ARNs; a failure here ends the pass
    pub async fn clusters(&self) -> Result<Vec<String>> {
        let clusters = self.orchestrator.list_clusters().await?;
        info!(count = clusters.len(), "ECS clusters listed");
        Ok(clusters)
    }

    pub async fn services(&self, cluster: &str) -> Vec<String> {
        info!(cluster = %short_name(cluster), "Accessing cluster");
        match self.orchestrator.list_services(cluster).await {
            Ok(services) => {
                debug!(cluster = %cluster, count = services.len(), "Services listed");
                services
            }
            Err(e) => {
                warn!(cluster = %cluster, error = %e, "Could not list services");
                Vec::new()
            }
        }
    }

    pub async fn describe(&self, cluster: &str, service: &str) -> Option<ServiceDescriptor> {
        match self.orchestrator.describe_service(cluster, service).await {
            Ok(descriptor) => Some(descriptor),
            Err(e) if e.is_not_found() => {
                info!(service = %service, "The requested service was not found");
                None
            }
            Err(e) => {
                warn!(service = %service, error = %e, "Could not describe service");
                None
            }
        }
    }

    pub async fn task_definition(&self, task_definition: &str) -> Option<TaskDefinition> {
        match self.orchestrator.describe_task_definition(task_definition).await {
            Ok(described) => Some(described),
            Err(e) if e.is_not_found() => {
                info!(task_definition = %task_definition, "The requested task definition was not found");
                None
            }
            Err(e) => {
                warn!(task_definition = %task_definition, error = %e, "Could not describe task definition");
                None
            }
        }
    }
}

/// Last path segment of an ECS ARN (`.../cluster/prod` -> `prod`)
pub fn short_name(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}
