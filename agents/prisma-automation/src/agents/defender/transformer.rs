//! Task Definition Transformer
//!
//! Drives one service's task definition through
//!
//! ```text
//! Unprotected --protect--> PendingRegistration --register--> Registered
//! Outdated    --upgrade--> PendingRegistration --register--> Registered
//! Protected   (terminal)
//! ```
//!
//! Every transition works on a copy; the described definition is never
//! touched. Registration is left to the [`DeploymentApplier`].
//!
//! [`DeploymentApplier`]: super::deploy::DeploymentApplier

use tracing::{debug, info, warn};

use super::types::{DefenderRelease, DefenderStatus, DEFENDER_CONTAINER_NAME, INSTALL_BUNDLE_VAR};
use crate::config::FargateParams;
use crate::error::{AutomationError, Result};
use crate::tools::aws::{RegistrableTaskDefinition, TaskDefinition};
use crate::tools::prisma::PrismaClient;

/// Where a service's task definition is in the deployment pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Unprotected(TaskDefinition),
    Outdated(TaskDefinition),
    /// Defender present and current; nothing to do
    Protected,
    PendingRegistration(RegistrableTaskDefinition),
    Registered(String),
    /// Dropped for this pass; the next pass reclassifies the service
    Discarded(String),
}

impl TaskState {
    pub fn from_status(status: DefenderStatus, task_definition: &TaskDefinition) -> Self {
        match status {
            DefenderStatus::Undefended => TaskState::Unprotected(task_definition.clone()),
            DefenderStatus::Outdated => TaskState::Outdated(task_definition.clone()),
            DefenderStatus::Defended => TaskState::Protected,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Protected | TaskState::Registered(_) | TaskState::Discarded(_)
        )
    }
}

pub struct TaskDefinitionTransformer<'a> {
    client: &'a PrismaClient,
}

impl<'a> TaskDefinitionTransformer<'a> {
    pub fn new(client: &'a PrismaClient) -> Self {
        Self { client }
    }

    /// Run the transition out of `Unprotected` or `Outdated`
    ///
    /// Other states are returned unchanged. Only fatal errors (retry cap,
    /// failed login) propagate; every other failure discards the state.
    pub async fn advance(
        &self,
        state: TaskState,
        params: &mut FargateParams,
        release: Option<&DefenderRelease>,
    ) -> Result<TaskState> {
        let next = match state {
            TaskState::Unprotected(task_definition) => self.protect(params, &task_definition).await,
            TaskState::Outdated(task_definition) => match release {
                Some(release) => upgrade(&task_definition, release).map(Some),
                None => Err(AutomationError::NotFound(
                    "current defender image and bundle".to_string(),
                )),
            },
            other => return Ok(other),
        };

        match next {
            Ok(Some(registrable)) => Ok(TaskState::PendingRegistration(registrable)),
            Ok(None) => Ok(TaskState::Discarded(
                "protected task definition could not be generated".to_string(),
            )),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, "Task definition transformation failed");
                Ok(TaskState::Discarded(e.to_string()))
            }
        }
    }

    /// Inject the defender through the console's fargate.json transformation
    ///
    /// `params` is the cluster's accumulator: a registry credential found
    /// here is kept for the cluster's later services.
    pub async fn protect(
        &self,
        params: &mut FargateParams,
        task_definition: &TaskDefinition,
    ) -> Result<Option<RegistrableTaskDefinition>> {
        let primary = task_definition.primary_container().ok_or_else(|| {
            AutomationError::Validation(format!(
                "task definition {} has no containers",
                task_definition.family
            ))
        })?;

        let extract_entrypoint = primary.entry_point.is_none();
        params.extract_entrypoint = extract_entrypoint;
        debug!(image = %primary.image, extract_entrypoint, "Preparing fargate transformation");

        if extract_entrypoint {
            self.resolve_registry_credential(params, &primary.image).await?;
        }

        let sanitized = task_definition.sanitized();
        let Some(protected) = self.client.generate_protected_task(params, &sanitized).await? else {
            return Ok(None);
        };

        if protected.container(DEFENDER_CONTAINER_NAME).is_none() {
            return Err(AutomationError::Validation(format!(
                "protected definition for {} has no {} container",
                task_definition.family, DEFENDER_CONTAINER_NAME
            )));
        }

        // Null log configurations were dropped when the response was parsed
        protected.into_registrable().map(Some)
    }

    async fn resolve_registry_credential(&self, params: &mut FargateParams, image: &str) -> Result<()> {
        if params.has_registry_credential() {
            debug!(credential = %params.registry_credential_id, "Reusing registry credential");
            return Ok(());
        }

        if self.client.image_in_registry(image).await? == Some(true) {
            debug!(image = %image, "Image already scanned by the console registry");
            return Ok(());
        }

        if let Some(credential) = registry_credential_from_image(image) {
            info!(image = %image, credential = %credential, "Derived registry credential from image host");
            params.registry_credential_id = credential;
        }
        Ok(())
    }
}

/// Swap in the current defender image and install bundle
///
/// Local patch only: no console call.
pub fn upgrade(
    task_definition: &TaskDefinition,
    release: &DefenderRelease,
) -> Result<RegistrableTaskDefinition> {
    let mut patched = task_definition.clone();
    let agent = patched.container_mut(DEFENDER_CONTAINER_NAME).ok_or_else(|| {
        AutomationError::Validation(format!(
            "task definition {} has no {} container",
            task_definition.family, DEFENDER_CONTAINER_NAME
        ))
    })?;

    agent.set_environment(INSTALL_BUNDLE_VAR, &release.bundle);
    agent.image = release.image.clone();

    info!(family = %task_definition.family, image = %release.image, "Defender container patched");
    patched.into_registrable()
}

/// Registry credential id implied by an image's host
///
/// `123456789.dkr.ecr.us-east-1.amazonaws.com/app:1` -> `123456789`.
/// Images without a registry host (Docker Hub short names) have none.
pub fn registry_credential_from_image(image: &str) -> Option<String> {
    let (host, _) = image.split_once('/')?;
    let prefix = host.split('.').next().unwrap_or(host);
    if prefix.is_empty() {
        None
    } else {
        Some(prefix.to_string())
    }
}
