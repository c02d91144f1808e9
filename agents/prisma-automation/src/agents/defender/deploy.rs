//! Deployment Applier
//!
//! Registers a prepared task definition and points the service at the new
//! revision. Failures are logged and returned as `None`; the service keeps
//! its current revision because ECS only swaps on a successful update.

use serde_json::Value;
use tracing::{error, info};

use super::transformer::TaskState;
use crate::tools::aws::{ContainerOrchestrator, RegistrableTaskDefinition};

pub struct DeploymentApplier<'a> {
    orchestrator: &'a dyn ContainerOrchestrator,
    dry_run: bool,
}

/// Outcome of committing one prepared definition
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// Registered and the service updated
    Deployed(String),
    /// Registered, but the service still runs the old revision
    Registered(String),
    RegistrationFailed,
    DryRun,
}

impl<'a> DeploymentApplier<'a> {
    pub fn new(orchestrator: &'a dyn ContainerOrchestrator, dry_run: bool) -> Self {
        Self {
            orchestrator,
            dry_run,
        }
    }

    /// New revision ARN, or `None` when the control plane rejected it
    pub async fn register(&self, task_definition: &RegistrableTaskDefinition) -> Option<String> {
        match self.orchestrator.register_task_definition(task_definition).await {
            Ok(arn) => {
                info!(family = %task_definition.family(), arn = %arn, "Task definition registered");
                Some(arn)
            }
            Err(e) => {
                error!(family = %task_definition.family(), error = %e, "Error registering task definition");
                None
            }
        }
    }

    pub async fn update_service(&self, cluster: &str, service: &str, task_definition_arn: &str) -> Option<Value> {
        match self
            .orchestrator
            .update_service(cluster, service, task_definition_arn)
            .await
        {
            Ok(ack) => {
                info!(cluster = %cluster, service = %service, arn = %task_definition_arn, "Service updated");
                Some(ack)
            }
            Err(e) => {
                error!(cluster = %cluster, service = %service, error = %e, "Error updating service");
                None
            }
        }
    }

    /// Register, then update the service with the new ARN
    pub async fn apply(&self, cluster: &str, service: &str, task_definition: &RegistrableTaskDefinition) -> Applied {
        if self.dry_run {
            info!(
                cluster = %cluster,
                service = %service,
                family = %task_definition.family(),
                "API CREATE_REQUEST \u{2717}: not registering the task definition"
            );
            return Applied::DryRun;
        }

        let Some(arn) = self.register(task_definition).await else {
            return Applied::RegistrationFailed;
        };

        match self.update_service(cluster, service, &arn).await {
            Some(_) => Applied::Deployed(arn),
            None => Applied::Registered(arn),
        }
    }

    /// Commit a `PendingRegistration` state; other states pass through
    pub async fn commit(&self, cluster: &str, service: &str, state: TaskState) -> (TaskState, Option<Applied>) {
        let TaskState::PendingRegistration(task_definition) = state else {
            return (state, None);
        };

        let applied = self.apply(cluster, service, &task_definition).await;
        let next = match &applied {
            Applied::Deployed(arn) | Applied::Registered(arn) => TaskState::Registered(arn.clone()),
            Applied::RegistrationFailed => {
                TaskState::Discarded("task definition registration failed".to_string())
            }
            Applied::DryRun => TaskState::PendingRegistration(task_definition),
        };
        (next, Some(applied))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{app_task_definition, fargate_service, FakeOrchestrator};
    use crate::tools::aws::{TaskDefinition, ADMIN_FIELDS};

    fn prepared() -> RegistrableTaskDefinition {
        TaskDefinition::from_json(app_task_definition("arn:td/web:4", "web", "nginx:1.25"))
            .unwrap()
            .into_registrable()
            .unwrap()
    }

    #[tokio::test]
    async fn test_apply_registers_then_updates() {
        let orchestrator = FakeOrchestrator::default();
        let applier = DeploymentApplier::new(&orchestrator, false);

        let applied = applier.apply("prod", "web", &prepared()).await;

        let arn = match applied {
            Applied::Deployed(arn) => arn,
            other => panic!("expected deployment, got {other:?}"),
        };
        let updates = orchestrator.updates();
        assert_eq!(updates, vec![("prod".to_string(), "web".to_string(), arn)]);

        let registered = &orchestrator.registered()[0];
        for field in ADMIN_FIELDS {
            assert!(registered.get(field).is_none(), "{field} was submitted");
        }
        // Unknown fields survive the round trip
        assert_eq!(registered["networkMode"], "awsvpc");
        assert_eq!(registered["cpu"], "256");
    }

    #[tokio::test]
    async fn test_rejected_registration_never_updates() {
        let orchestrator = FakeOrchestrator {
            reject_registration: true,
            ..Default::default()
        };
        let applier = DeploymentApplier::new(&orchestrator, false);

        let (state, applied) = applier
            .commit("prod", "web", TaskState::PendingRegistration(prepared()))
            .await;

        assert_eq!(applied, Some(Applied::RegistrationFailed));
        assert!(matches!(state, TaskState::Discarded(_)));
        assert!(orchestrator.updates().is_empty());
    }

    #[tokio::test]
    async fn test_failed_update_keeps_new_revision() {
        let orchestrator = FakeOrchestrator {
            reject_update: true,
            ..Default::default()
        };
        let applier = DeploymentApplier::new(&orchestrator, false);

        let (state, applied) = applier
            .commit("prod", "web", TaskState::PendingRegistration(prepared()))
            .await;

        let arn = "arn:aws:ecs:us-east-2:123456789:task-definition/web:101".to_string();
        assert_eq!(applied, Some(Applied::Registered(arn.clone())));
        assert!(matches!(state, TaskState::Registered(ref registered) if *registered == arn));
        assert_eq!(orchestrator.registered().len(), 1);
        assert!(orchestrator.updates().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let orchestrator = FakeOrchestrator::default().with_service(
            "prod",
            fargate_service("prod", "web", "arn:td/web:4"),
            app_task_definition("arn:td/web:4", "web", "nginx:1.25"),
        );
        let applier = DeploymentApplier::new(&orchestrator, true);

        let applied = applier.apply("prod", "web", &prepared()).await;

        assert_eq!(applied, Applied::DryRun);
        assert!(orchestrator.registered().is_empty());
        assert!(orchestrator.updates().is_empty());
    }
}
