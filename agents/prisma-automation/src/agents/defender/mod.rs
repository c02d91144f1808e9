//! Fargate Defender Deployment Agent
//!
//! Finds ECS Fargate services that run without the Prisma Cloud defender, or
//! with an outdated one, and redeploys them with a protected task
//! definition.
//!
//! ## Pipeline (per service)
//!
//! 1. [`inventory`]: describe the service and its current task definition
//! 2. [`classifier`]: undefended / outdated / defended
//! 3. [`transformer`]: console transformation or local image/bundle patch
//! 4. [`deploy`]: register the new revision and update the service
//!
//! ## Example Usage
//!
//! ```ignore
//! use prisma_automation::agents::defender::DefenderDeploymentAgent;
//!
//! let agent = DefenderDeploymentAgent::new(client, Arc::new(AwsControlPlane::new("us-east-2").await));
//! let report = agent.run().await?;
//! println!("{} services visited", report.services.len());
//! ```

pub mod classifier;
pub mod deploy;
pub mod inventory;
pub mod orchestrator;
pub mod transformer;
pub mod types;

pub use classifier::{classify, version_tag, Classification};
pub use deploy::{Applied, DeploymentApplier};
pub use inventory::FleetInventoryWalker;
pub use orchestrator::{load_template, DefenderDeploymentAgent};
pub use transformer::{TaskDefinitionTransformer, TaskState};
pub use types::{
    DefenderRelease, DefenderStatus, DeploymentAction, DeploymentReport, ServiceOutcome,
    DEFENDER_CONTAINER_NAME, INSTALL_BUNDLE_VAR, VERSION_TAG_WIDTH,
};
