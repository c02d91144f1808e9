//! Defender deployment pass
//!
//! One linear pass: authenticate, learn the latest version and the current
//! defender release, then read, classify, transform and deploy each Fargate
//! service in turn. The `FargateParams` accumulator lives for one cluster.

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::classifier::classify;
use super::deploy::{Applied, DeploymentApplier};
use super::inventory::{short_name, FleetInventoryWalker};
use super::transformer::{TaskDefinitionTransformer, TaskState};
use super::types::{
    DefenderRelease, DefenderStatus, DeploymentAction, DeploymentReport, ServiceOutcome,
    DEFENDER_CONTAINER_NAME, INSTALL_BUNDLE_VAR,
};
use crate::config::{FargateParams, WalkScope};
use crate::error::{AutomationError, Result};
use crate::tools::aws::{ContainerOrchestrator, ServiceDescriptor, TaskDefinition};
use crate::tools::prisma::PrismaClient;

/// Template the console transforms to reveal the current defender release
const DEFAULT_TEMPLATE: &str = include_str!("../../../assets/default_taskdef.json");

pub struct DefenderDeploymentAgent {
    client: PrismaClient,
    orchestrator: Arc<dyn ContainerOrchestrator>,
}

impl DefenderDeploymentAgent {
    pub fn new(client: PrismaClient, orchestrator: Arc<dyn ContainerOrchestrator>) -> Self {
        Self {
            client,
            orchestrator,
        }
    }

    /// Run one pass over the fleet
    pub async fn run(&self) -> Result<DeploymentReport> {
        let config = self.client.config();
        info!(scope = ?config.walk_scope, debug_mode = config.debug_mode, "Starting defender deployment pass");

        self.client.authenticate().await?;

        let latest_version = self
            .client
            .latest_version()
            .await?
            .ok_or_else(|| AutomationError::NotFound("latest defender version".to_string()))?;

        let release = self.current_release(&latest_version).await?;
        let mut report = DeploymentReport::new(&latest_version);

        let walker = FleetInventoryWalker::new(self.orchestrator.as_ref());
        for cluster in walker.clusters().await? {
            report.clusters_visited += 1;
            let mut params = config.fargate_params();

            for service_arn in walker.services(&cluster).await {
                let Some(descriptor) = walker.describe(&cluster, &service_arn).await else {
                    report.record(ServiceOutcome::new(
                        short_name(&cluster),
                        short_name(&service_arn),
                        None,
                        DeploymentAction::Failed("service could not be described".to_string()),
                    ));
                    continue;
                };

                if !descriptor.is_fargate() {
                    report.record(ServiceOutcome::new(
                        short_name(&cluster),
                        descriptor.name(),
                        None,
                        DeploymentAction::SkippedNotFargate,
                    ));
                    continue;
                }

                info!(service = %service_arn, "Service is Fargate, checking defended status");
                let outcome = self
                    .process_service(&cluster, &descriptor, &mut params, release.as_ref(), &latest_version)
                    .await?;
                report.record(outcome);

                if config.walk_scope == WalkScope::FirstFargateService {
                    break;
                }
            }

            if config.walk_scope == WalkScope::FirstFargateService {
                break;
            }
        }

        let report = report.finish();
        info!(
            clusters = report.clusters_visited,
            services = report.services.len(),
            failures = report.failures(),
            "Defender deployment pass finished"
        );
        Ok(report)
    }

    /// Read, classify, transform and deploy one Fargate service
    async fn process_service(
        &self,
        cluster: &str,
        descriptor: &ServiceDescriptor,
        params: &mut FargateParams,
        release: Option<&DefenderRelease>,
        latest_version: &str,
    ) -> Result<ServiceOutcome> {
        let cluster_name = short_name(cluster);
        let service_name = descriptor.name();

        let walker = FleetInventoryWalker::new(self.orchestrator.as_ref());
        let Some(task_definition) = walker.task_definition(&descriptor.task_definition).await else {
            return Ok(ServiceOutcome::new(
                cluster_name,
                service_name,
                None,
                DeploymentAction::Failed("task definition could not be described".to_string()),
            ));
        };

        let status = classify(&task_definition, latest_version).status;
        let state = TaskState::from_status(status, &task_definition);

        let transformer = TaskDefinitionTransformer::new(&self.client);
        let state = transformer.advance(state, params, release).await?;

        let applier = DeploymentApplier::new(self.orchestrator.as_ref(), self.client.config().debug_mode);
        let (state, applied) = applier.commit(cluster, &descriptor.service_arn, state).await;

        let outcome = ServiceOutcome::new(cluster_name, service_name, Some(status), DeploymentAction::AlreadyDefended);
        Ok(match (state, applied) {
            (TaskState::Registered(arn), Some(Applied::Deployed(_))) => {
                let action = match status {
                    DefenderStatus::Outdated => DeploymentAction::Upgraded,
                    _ => DeploymentAction::Protected,
                };
                ServiceOutcome { action, ..outcome }.with_arn(Some(arn))
            }
            (TaskState::Registered(arn), _) => ServiceOutcome {
                action: DeploymentAction::Failed("service update failed".to_string()),
                ..outcome
            }
            .with_arn(Some(arn)),
            (TaskState::Discarded(reason), _) => ServiceOutcome {
                action: DeploymentAction::Failed(reason),
                ..outcome
            },
            (TaskState::PendingRegistration(_), _) => ServiceOutcome {
                action: DeploymentAction::DryRun,
                ..outcome
            },
            _ => {
                info!(service = %service_name, "Task definition is defended and defender is updated");
                outcome
            }
        })
    }

    /// Current defender image and install bundle
    ///
    /// `None` when the console could not transform the template; outdated
    /// services then fail for this pass while undefended ones still deploy.
    pub async fn current_release(&self, latest_version: &str) -> Result<Option<DefenderRelease>> {
        let config = self.client.config();
        let template = load_template(config.template_path.as_deref()).await?;

        let Some(protected) = self
            .client
            .generate_protected_task(&config.fargate_params(), &template.sanitized())
            .await?
        else {
            warn!("Could not generate the defender template; outdated defenders will not be upgraded");
            return Ok(None);
        };

        let release = release_from(&protected, latest_version);
        match &release {
            Some(release) => info!(image = %release.image, "Set updated fargate image and bundle for expired defenders"),
            None => warn!("Generated template has no defender container with an install bundle"),
        }
        Ok(release)
    }
}

/// Image and bundle of the defender container in a protected definition
fn release_from(protected: &TaskDefinition, latest_version: &str) -> Option<DefenderRelease> {
    let agent = protected.container(DEFENDER_CONTAINER_NAME)?;
    let bundle = agent.environment_value(INSTALL_BUNDLE_VAR)?;
    Some(DefenderRelease {
        image: agent.image.clone(),
        bundle: bundle.to_string(),
        version: latest_version.to_string(),
    })
}

/// Template task definition: the embedded default, or a file override
pub async fn load_template(path: Option<&Path>) -> Result<TaskDefinition> {
    let document = match path {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => DEFAULT_TEMPLATE.to_string(),
    };
    TaskDefinition::from_json(serde_json::from_str(&document)?)
}
